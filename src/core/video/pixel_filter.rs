use super::decision::{Stage, StageReport};
use super::error::PipelineError;
use super::frame::{Frame, FrameStore};
use super::phash::{hamming_distance, PerceptualHasher};
use log::info;
use rayon::prelude::*;

/// 像素级去重 - stage 1.
///
/// Every frame is compared with all earlier frames still kept; the first one
/// within `threshold` bits removes it, so the lowest index always survives.
pub struct PixelHashFilter {
    threshold: u32,
    hasher: PerceptualHasher,
}

impl PixelHashFilter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            hasher: PerceptualHasher::new(),
        }
    }

    pub fn apply(&self, store: &mut FrameStore) -> Result<StageReport, PipelineError> {
        let frames = store.frames().to_vec();
        let mut report = StageReport::new(Stage::Pixel, frames.len());

        let hashes: Vec<Result<u64, PipelineError>> = frames
            .par_iter()
            .map(|f| self.hasher.hash_path(&f.path))
            .collect();

        let mut kept: Vec<(&Frame, u64)> = Vec::with_capacity(frames.len());
        for (frame, hash) in frames.iter().zip(hashes) {
            let hash = match hash {
                Ok(h) => h,
                Err(e) => {
                    report.drop_failed(frame, e)?;
                    continue;
                }
            };

            let duplicate_of = kept
                .iter()
                .map(|(other, other_hash)| (*other, hamming_distance(hash, *other_hash)))
                .find(|(_, distance)| *distance <= self.threshold);

            match duplicate_of {
                Some((original, distance)) => report.drop_frame(
                    frame,
                    format!("phash distance {} <= {}", distance, self.threshold),
                    Some(original),
                    Some(distance as f32),
                ),
                None => {
                    report.keep(frame, "no pixel-level duplicate", None);
                    kept.push((frame, hash));
                }
            }
        }

        let report = report.commit(store);
        info!(
            "🧹 [pixel] removed {} of {} frames (threshold {})",
            report.removed, report.frames_before, self.threshold
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::test_support::write_frames;
    use std::time::Duration;

    fn load(dir: &std::path::Path) -> FrameStore {
        FrameStore::load(dir, Duration::from_secs(8)).unwrap()
    }

    #[test]
    fn test_identical_frames_keep_earliest() {
        let dir = tempfile::tempdir().unwrap();
        // frames 0 and 3 are byte-identical, as are 1 and 4
        write_frames(dir.path(), &[10, 11, 12, 10, 11]);
        let mut store = load(dir.path());

        let report = PixelHashFilter::new(3).apply(&mut store).unwrap();

        assert_eq!(report.removed, 2);
        let survivors: Vec<usize> = store.frames().iter().map(|f| f.index).collect();
        assert_eq!(survivors, vec![0, 1, 2]);

        let dropped = report.log.iter().find(|e| e.frame.index == 3).unwrap();
        assert!(!dropped.kept);
        assert_eq!(dropped.comparison_target.as_ref().unwrap().index, 0);
        assert_eq!(dropped.score, Some(0.0));
        assert!(!dir.path().join("frame_00003.png").exists());
    }

    #[test]
    fn test_zero_threshold_is_noop_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[1, 2, 3, 4, 5, 6]);
        let mut store = load(dir.path());

        let report = PixelHashFilter::new(0).apply(&mut store).unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(store.len(), 6);
        assert!(report.log.iter().all(|e| e.kept));
    }

    #[test]
    fn test_zero_threshold_still_removes_identical() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[7, 7]);
        let mut store = load(dir.path());

        let report = PixelHashFilter::new(0).apply(&mut store).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(store.frames()[0].index, 0);
    }

    #[test]
    fn test_removed_frame_is_not_a_comparison_target() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[3, 3, 3]);
        let mut store = load(dir.path());

        let report = PixelHashFilter::new(3).apply(&mut store).unwrap();
        assert_eq!(report.removed, 2);
        for entry in report.log.iter().filter(|e| !e.kept) {
            assert_eq!(entry.comparison_target.as_ref().unwrap().index, 0);
        }
    }

    #[test]
    fn test_corrupt_frame_is_dropped_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[1, 2]);
        std::fs::write(dir.path().join("frame_00002.png"), b"garbage").unwrap();
        let mut store = load(dir.path());

        let report = PixelHashFilter::new(3).apply(&mut store).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(store.len(), 2);
        assert!(report.log.iter().any(|e| !e.kept && e.reason.starts_with("unprocessable")));
    }

    #[test]
    fn test_never_grows() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[1, 2, 1, 3, 2, 4]);
        let mut store = load(dir.path());
        let before = store.len();

        let report = PixelHashFilter::new(10).apply(&mut store).unwrap();
        assert!(store.len() <= before);
        assert_eq!(report.kept_count(), store.len());
    }
}
