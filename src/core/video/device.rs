//! 计算设备选择 - accelerator first, CPU last

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeDevice {
    Cuda { device_id: i32 },
    CoreMl,
    Cpu,
}

impl ComputeDevice {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cuda { device_id } => write!(f, "cuda:{}", device_id),
            ComputeDevice::CoreMl => f.write_str("coreml"),
            ComputeDevice::Cpu => f.write_str("cpu"),
        }
    }
}

/// What the host offers. Tests substitute their own.
pub trait DeviceDetector {
    fn cuda_device(&self) -> Option<i32>;
    fn coreml_available(&self) -> bool;
}

/// Best-effort detection of the running machine
pub struct SystemDetector;

impl DeviceDetector for SystemDetector {
    fn cuda_device(&self) -> Option<i32> {
        if let Ok(visible) = env::var("CUDA_VISIBLE_DEVICES") {
            let first = visible.split(',').next().unwrap_or("").trim();
            if first.is_empty() || first == "-1" {
                debug!("CUDA hidden by CUDA_VISIBLE_DEVICES={:?}", visible);
                return None;
            }
        }
        // visible devices are renumbered from zero
        if Path::new("/dev/nvidiactl").exists() || Path::new("/dev/nvidia0").exists() {
            Some(0)
        } else {
            None
        }
    }

    fn coreml_available(&self) -> bool {
        cfg!(target_os = "macos")
    }
}

/// Deterministic fallback order: CUDA → CoreML → CPU
pub fn select_device(detector: &dyn DeviceDetector, prefer_accelerator: bool) -> ComputeDevice {
    let device = if !prefer_accelerator {
        ComputeDevice::Cpu
    } else if let Some(device_id) = detector.cuda_device() {
        ComputeDevice::Cuda { device_id }
    } else if detector.coreml_available() {
        ComputeDevice::CoreMl
    } else {
        ComputeDevice::Cpu
    };
    info!("🖥️ Compute device: {}", device);
    device
}
