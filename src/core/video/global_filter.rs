use super::decision::{Stage, StageReport};
use super::embedding::{cosine_similarity, Embedding, EmbeddingCache, SimilarityModel};
use super::error::PipelineError;
use super::frame::{Frame, FrameStore};
use log::info;
use rayon::prelude::*;
use std::collections::HashMap;

/// 全局语义去重 - stage 3.
///
/// Catches scenes that come back later (a slide shown again after questions).
/// Similarities against the kept set are computed in parallel; the decision
/// is taken serially so the earliest kept frame always wins.
pub struct GlobalEmbeddingFilter {
    threshold: f32,
    window: Option<usize>,
}

impl GlobalEmbeddingFilter {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            window: None,
        }
    }

    /// Only compare against the most recent `window` kept frames
    pub fn with_window(mut self, window: Option<usize>) -> Self {
        self.window = window;
        self
    }

    pub fn apply(
        &self,
        store: &mut FrameStore,
        model: &SimilarityModel,
        cache: &mut EmbeddingCache,
    ) -> Result<StageReport, PipelineError> {
        let frames = store.frames().to_vec();
        let mut report = StageReport::new(Stage::GlobalDeep, frames.len());

        let mut failures: HashMap<usize, PipelineError> =
            cache.prefetch(model, &frames).into_iter().collect();

        let mut kept: Vec<(&Frame, Embedding)> = Vec::with_capacity(frames.len());
        for frame in &frames {
            if let Some(err) = failures.remove(&frame.index) {
                report.drop_failed(frame, err)?;
                continue;
            }
            let Some(embedding) = cache.get(frame.index) else {
                report.drop_failed(
                    frame,
                    PipelineError::Embedding("embedding missing from cache".to_string()),
                )?;
                continue;
            };

            let candidates = match self.window {
                Some(window) => &kept[kept.len().saturating_sub(window)..],
                None => &kept[..],
            };
            let similarities: Vec<f32> = candidates
                .par_iter()
                .map(|(_, other)| cosine_similarity(&embedding, other))
                .collect();

            match similarities.iter().position(|s| *s >= self.threshold) {
                Some(pos) => {
                    let similarity = similarities[pos];
                    report.drop_frame(
                        frame,
                        format!(
                            "similarity {:.3} >= {} to earlier frame",
                            similarity, self.threshold
                        ),
                        Some(candidates[pos].0),
                        Some(similarity),
                    );
                }
                None => {
                    let best = similarities.iter().copied().reduce(f32::max);
                    report.keep(frame, "no earlier duplicate", best);
                    kept.push((frame, embedding));
                }
            }
        }

        let report = report.commit(store);
        info!(
            "🧹 [global_deep] removed {} of {} frames (threshold {})",
            report.removed, report.frames_before, self.threshold
        );
        Ok(report)
    }
}
