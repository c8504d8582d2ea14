use super::decision::{Stage, StageReport};
use super::error::PipelineError;
use super::frame::FrameStore;
use super::ocr::{count_words, OcrSettings, TextRecognizer};
use log::info;
use rayon::prelude::*;

/// 文字密度过滤 - stage 4.
///
/// Keeps frames that carry at least `min_words` recognized words.
pub struct TextDensityFilter {
    min_words: usize,
    settings: OcrSettings,
}

impl TextDensityFilter {
    pub fn new(min_words: usize, settings: OcrSettings) -> Self {
        Self {
            min_words,
            settings,
        }
    }

    fn worker_count() -> usize {
        // OCR engines are memory hungry, cap the pool
        num_cpus::get().min(4)
    }

    pub fn apply(
        &self,
        store: &mut FrameStore,
        ocr: &dyn TextRecognizer,
    ) -> Result<StageReport, PipelineError> {
        let frames = store.frames().to_vec();
        let mut report = StageReport::new(Stage::TextOcr, frames.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(Self::worker_count())
            .build()
            .map_err(|e| PipelineError::ModelLoadFailed(format!("OCR worker pool: {}", e)))?;

        let texts: Vec<Result<String, PipelineError>> = pool.install(|| {
            frames
                .par_iter()
                .map(|f| ocr.recognize(&f.path, &self.settings))
                .collect()
        });

        for (frame, text) in frames.iter().zip(texts) {
            let words = match text {
                Ok(text) => count_words(&text),
                Err(e) => {
                    report.drop_failed(frame, e)?;
                    continue;
                }
            };
            if words >= self.min_words {
                report.keep(frame, format!("{} words", words), Some(words as f32));
            } else {
                report.drop_frame(
                    frame,
                    format!("{} words < {}", words, self.min_words),
                    None,
                    Some(words as f32),
                );
            }
        }

        let report = report.commit(store);
        info!(
            "🧹 [text_ocr] removed {} of {} frames (min words {}, engine {})",
            report.removed,
            report.frames_before,
            self.min_words,
            ocr.name()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::test_support::{write_frames, FakeOcr};
    use std::time::Duration;

    #[test]
    fn test_min_words_boundary() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[0, 1, 2]);
        let mut store = FrameStore::load(dir.path(), Duration::ZERO).unwrap();
        let ocr = FakeOcr::new(|id| match id {
            0 => 5,
            1 => 4,
            _ => 12,
        });

        let report = TextDensityFilter::new(5, OcrSettings::default())
            .apply(&mut store, &ocr)
            .unwrap();

        let survivors: Vec<usize> = store.frames().iter().map(|f| f.index).collect();
        assert_eq!(survivors, vec![0, 2]);
        assert_eq!(report.removed, 1);
        let dropped = report.log.iter().find(|e| !e.kept).unwrap();
        assert_eq!(dropped.score, Some(4.0));
        assert!(dropped.comparison_target.is_none());
    }

    #[test]
    fn test_zero_min_words_keeps_blank_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[0, 1]);
        let mut store = FrameStore::load(dir.path(), Duration::ZERO).unwrap();

        let report = TextDensityFilter::new(0, OcrSettings::default())
            .apply(&mut store, &FakeOcr::new(|_| 0))
            .unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ocr_failure_drops_only_that_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[0, 1, 2]);
        let mut store = FrameStore::load(dir.path(), Duration::ZERO).unwrap();
        let ocr = FakeOcr::new(|_| 20).failing_on(&[1]);

        let report = TextDensityFilter::new(5, OcrSettings::default())
            .apply(&mut store, &ocr)
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(1).is_none());
    }
}
