//! 图像嵌入 - similarity model and per-run embedding cache

#[cfg(feature = "clip")]
pub mod clip;
pub mod thumbnail;

#[cfg(feature = "clip")]
pub use clip::{ClipConfig, ClipEmbedder};
pub use thumbnail::ThumbnailEmbedder;

use super::device::ComputeDevice;
use super::error::PipelineError;
use super::frame::Frame;
use image::DynamicImage;
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub type Embedding = Arc<[f32]>;

/// Maps an image to a fixed-length vector
pub trait ImageEmbedder: Send + Sync {
    fn name(&self) -> &str;
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError>;
}

/// Loaded embedding backend plus the device it runs on.
///
/// Read-only after construction, shared across runs.
pub struct SimilarityModel {
    backend: Box<dyn ImageEmbedder>,
    device: ComputeDevice,
}

impl SimilarityModel {
    pub fn new(backend: Box<dyn ImageEmbedder>, device: ComputeDevice) -> Self {
        info!(
            "🧠 SimilarityModel ready: backend={}, device={}",
            backend.name(),
            device
        );
        Self { backend, device }
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn embed_image(&self, image: &DynamicImage) -> Result<Embedding, PipelineError> {
        let mut vector = self.backend.embed(image)?;
        if vector.is_empty() {
            return Err(PipelineError::Embedding(format!(
                "{} returned an empty vector",
                self.backend.name()
            )));
        }
        normalize_vector(&mut vector);
        Ok(Arc::from(vector))
    }

    pub fn embed_path(&self, path: &Path) -> Result<Embedding, PipelineError> {
        let image = image::open(path)?;
        self.embed_image(&image)
    }
}

/// L2 normalisation in place
pub fn normalize_vector(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na < 1e-12 || nb < 1e-12 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

/// 每次运行的嵌入缓存 - keyed by frame index, each frame embedded at most once
#[derive(Default)]
pub struct EmbeddingCache {
    entries: HashMap<usize, Embedding>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed every frame not cached yet, in parallel. Returns the failures.
    pub fn prefetch(
        &mut self,
        model: &SimilarityModel,
        frames: &[Frame],
    ) -> Vec<(usize, PipelineError)> {
        let missing: Vec<&Frame> = frames
            .iter()
            .filter(|f| !self.entries.contains_key(&f.index))
            .collect();
        if missing.is_empty() {
            return Vec::new();
        }

        debug!(
            "🧮 Embedding {} frames ({} cached)",
            missing.len(),
            frames.len() - missing.len()
        );

        let results: Vec<(usize, Result<Embedding, PipelineError>)> = missing
            .par_iter()
            .map(|f| (f.index, model.embed_path(&f.path)))
            .collect();

        let mut failures = Vec::new();
        for (index, result) in results {
            match result {
                Ok(embedding) => {
                    self.entries.insert(index, embedding);
                }
                Err(e) => failures.push((index, e)),
            }
        }
        failures
    }

    pub fn get(&self, index: usize) -> Option<Embedding> {
        self.entries.get(&index).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
