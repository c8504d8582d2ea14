//! CLIP image embeddings via ONNX Runtime

use super::ImageEmbedder;
use crate::core::video::device::ComputeDevice;
use crate::core::video::error::PipelineError;
use image::imageops::FilterType;
use image::DynamicImage;
use log::{debug, error, info};
use ndarray::{Array2, Array4};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::Session;
use ort::value::{TensorRef, Value};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

// CLIP preprocessing constants
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

// Full CLIP exports also want text inputs: [BOS, "a", "photo", "of", "a", "photo", EOS]
const DUMMY_TOKENS: [i64; 7] = [49406, 320, 2368, 539, 320, 2368, 49407];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    pub model_path: PathBuf,
    /// Input image size (224 for ViT-B/32)
    pub image_size: u32,
    /// Name of the output holding image embeddings
    pub output_name: String,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/embeddings/clip_vit_b32.onnx"),
            image_size: 224,
            output_name: "image_embeds".to_string(),
        }
    }
}

pub struct ClipEmbedder {
    // Session::run needs &mut
    session: Mutex<Session>,
    config: ClipConfig,
}

impl ClipEmbedder {
    pub fn load(config: ClipConfig, device: ComputeDevice) -> Result<Self, PipelineError> {
        info!(
            "🔧 Loading CLIP model from {:?} on {}",
            config.model_path, device
        );
        if !config.model_path.exists() {
            return Err(PipelineError::ModelLoadFailed(format!(
                "CLIP model not found at {:?}",
                config.model_path
            )));
        }

        let providers: Vec<ExecutionProviderDispatch> = match device {
            ComputeDevice::Cuda { device_id } => vec![
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ],
            ComputeDevice::CoreMl => vec![
                CoreMLExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
            ComputeDevice::Cpu => vec![CPUExecutionProvider::default().build()],
        };

        let session = Session::builder()
            .map_err(|e| PipelineError::ModelLoadFailed(e.to_string()))?
            .with_execution_providers(providers)
            .map_err(|e| PipelineError::ModelLoadFailed(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e| {
                error!("❌ Failed to load CLIP model: {}", e);
                PipelineError::ModelLoadFailed(format!(
                    "failed to load ONNX model from {:?}: {}",
                    config.model_path, e
                ))
            })?;

        info!("✅ CLIP model loaded");
        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.config.image_size as usize;
        let rgb = image
            .resize_exact(self.config.image_size, self.config.image_size, FilterType::Triangle)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (f32::from(pixel[c]) / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
        tensor
    }
}

impl ImageEmbedder for ClipEmbedder {
    fn name(&self) -> &str {
        "clip"
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
        let input = self.preprocess(image);
        let pixel_values = TensorRef::from_array_view(input.view())
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        let input_ids = Array2::<i64>::from_shape_vec((1, DUMMY_TOKENS.len()), DUMMY_TOKENS.to_vec())
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;
        let attention_mask = Array2::<i64>::ones((1, DUMMY_TOKENS.len()));
        let input_ids =
            Value::from_array(input_ids).map_err(|e| PipelineError::Embedding(e.to_string()))?;
        let attention_mask = Value::from_array(attention_mask)
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Embedding(format!("session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![
                "pixel_values" => pixel_values,
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        let output = outputs.get(self.config.output_name.as_str()).ok_or_else(|| {
            PipelineError::Embedding(format!("missing output {}", self.config.output_name))
        })?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        debug!("CLIP embedding dim {}", data.len());
        Ok(data.to_vec())
    }
}
