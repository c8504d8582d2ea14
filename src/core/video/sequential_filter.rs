use super::decision::{Stage, StageReport};
use super::embedding::{cosine_similarity, Embedding, EmbeddingCache, SimilarityModel};
use super::error::PipelineError;
use super::frame::{Frame, FrameStore};
use log::info;
use std::collections::HashMap;

/// 相邻帧语义去重 - stage 2.
///
/// Each frame is compared only with the last frame kept before it, which
/// collapses slow pans and paused slides in one linear pass.
pub struct SequentialEmbeddingFilter {
    threshold: f32,
}

impl SequentialEmbeddingFilter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn apply(
        &self,
        store: &mut FrameStore,
        model: &SimilarityModel,
        cache: &mut EmbeddingCache,
    ) -> Result<StageReport, PipelineError> {
        let frames = store.frames().to_vec();
        let mut report = StageReport::new(Stage::SeqDeep, frames.len());

        let mut failures: HashMap<usize, PipelineError> =
            cache.prefetch(model, &frames).into_iter().collect();

        let mut last_kept: Option<(&Frame, Embedding)> = None;
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

            let Some((previous, previous_embedding)) = last_kept.clone() else {
                report.keep(frame, "first frame", None);
                last_kept = Some((frame, embedding));
                continue;
            };

            let similarity = cosine_similarity(&embedding, &previous_embedding);
            if similarity >= self.threshold {
                report.drop_frame(
                    frame,
                    format!(
                        "similarity {:.3} >= {} to last kept frame",
                        similarity, self.threshold
                    ),
                    Some(previous),
                    Some(similarity),
                );
            } else {
                report.keep(frame, "differs from last kept frame", Some(similarity));
                last_kept = Some((frame, embedding));
            }
        }

        let report = report.commit(store);
        info!(
            "🧹 [seq_deep] removed {} of {} frames (threshold {})",
            report.removed, report.frames_before, self.threshold
        );
        Ok(report)
    }
}
