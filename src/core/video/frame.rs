use super::error::PipelineError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 帧 - one still image of the working set
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position in extraction order, stable for the whole run
    pub index: usize,
    pub path: PathBuf,
    pub timestamp: Duration,
}

impl Frame {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Stable identifier used to key captions
    pub fn figure_name(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("frame_{:05}", self.index))
    }

    pub fn to_ref(&self) -> FrameRef {
        FrameRef {
            index: self.index,
            file_name: self.file_name(),
        }
    }
}

/// Manifest keys for `frames`, unique within the slice.
///
/// The file stem when no other frame shares it, else the full file name
/// (unique within one directory), with the index appended as a last resort.
pub fn figure_names(frames: &[Frame]) -> Vec<String> {
    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for frame in frames {
        *stem_counts.entry(frame.figure_name()).or_default() += 1;
    }

    let mut taken = HashSet::with_capacity(frames.len());
    frames
        .iter()
        .map(|frame| {
            let stem = frame.figure_name();
            let mut name = if stem_counts.get(&stem).copied().unwrap_or(0) > 1 {
                frame.file_name()
            } else {
                stem
            };
            while taken.contains(&name) {
                name = format!("{}_{}", name, frame.index);
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Lightweight frame reference for decision logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRef {
    pub index: usize,
    pub file_name: String,
}

pub fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

/// Frame files of a directory in lexicographic (= temporal) order
pub fn list_frame_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_frame_file(p))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// 帧工作集 - ordered working set owned by one pipeline run.
///
/// Frames are only ever removed; a removed frame is deleted from disk and
/// never comes back.
#[derive(Debug)]
pub struct FrameStore {
    dir: PathBuf,
    frames: Vec<Frame>,
}

impl FrameStore {
    pub fn load(dir: &Path, interval: Duration) -> Result<Self, PipelineError> {
        let frames = list_frame_files(dir)?
            .into_iter()
            .enumerate()
            .map(|(index, path)| {
                let timestamp = u32::try_from(index)
                    .ok()
                    .and_then(|n| interval.checked_mul(n))
                    .ok_or_else(|| {
                        PipelineError::InvalidOptions(format!(
                            "timestamp of frame {} overflows with interval {:?}",
                            index, interval
                        ))
                    })?;
                Ok(Frame {
                    index,
                    path,
                    timestamp,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        debug!("📂 Loaded {} frames from {:?}", frames.len(), dir);
        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
        })
    }

    /// Copy the frames of `raw_dir` into `work_dir` and load them from there,
    /// leaving the raw extraction untouched.
    pub fn load_copy(
        raw_dir: &Path,
        work_dir: &Path,
        interval: Duration,
    ) -> Result<Self, PipelineError> {
        fs::create_dir_all(work_dir)?;
        for src in list_frame_files(raw_dir)? {
            if let Some(name) = src.file_name() {
                fs::copy(&src, work_dir.join(name))?;
            }
        }
        Self::load(work_dir, interval)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.iter().find(|f| f.index == index)
    }

    /// Drop frames from the working set and delete their files.
    ///
    /// Returns the deletion failures; the frames leave the working set either way.
    pub fn remove(&mut self, indices: &[usize]) -> Vec<String> {
        let mut errors = Vec::new();
        if indices.is_empty() {
            return errors;
        }

        let (removed, kept): (Vec<Frame>, Vec<Frame>) = self
            .frames
            .drain(..)
            .partition(|f| indices.contains(&f.index));
        self.frames = kept;

        for frame in removed {
            match fs::remove_file(&frame.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("⚠️ Failed to delete {:?}: {}", frame.path, e);
                    errors.push(format!("failed to delete {}: {}", frame.file_name(), e));
                }
            }
        }
        errors
    }

    /// Move every surviving frame into `dest`, keeping file names.
    pub fn relocate(&mut self, dest: &Path) -> Result<(), PipelineError> {
        fs::create_dir_all(dest)?;
        for frame in &mut self.frames {
            let target = dest.join(frame.file_name());
            if fs::rename(&frame.path, &target).is_err() {
                // rename fails across filesystems
                fs::copy(&frame.path, &target)?;
                fs::remove_file(&frame.path)?;
            }
            frame.path = target;
        }
        self.dir = dest.to_path_buf();
        Ok(())
    }
}
