//! DCT 感知哈希 (pHash)
//!
//! 32x32 luma → 2-D DCT-II → top-left 8x8 low frequencies → one bit per
//! coefficient above the median. Two frames are near-identical when the
//! Hamming distance of their hashes is small.

use super::error::PipelineError;
use image::imageops::FilterType;
use image::DynamicImage;
use rustdct::{Dct2, DctPlanner, TransformType2And3};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

pub const HASH_BITS: u32 = 64;
const HASH_SIZE: usize = 8;
const SAMPLE_SIZE: usize = HASH_SIZE * 4;

pub struct PerceptualHasher {
    dct: Arc<dyn TransformType2And3<f32>>,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let mut planner = DctPlanner::new();
        Self {
            dct: planner.plan_dct2(SAMPLE_SIZE),
        }
    }

    pub fn hash_path(&self, path: &Path) -> Result<u64, PipelineError> {
        let img = image::open(path)?;
        Ok(self.hash_image(&img))
    }

    pub fn hash_image(&self, img: &DynamicImage) -> u64 {
        let gray = img.to_luma8();
        let small = image::imageops::resize(
            &gray,
            SAMPLE_SIZE as u32,
            SAMPLE_SIZE as u32,
            FilterType::Triangle,
        );

        let mut coeffs: Vec<f32> = small.pixels().map(|p| p[0] as f32).collect();
        self.dct_2d(&mut coeffs);

        let mut low = [0f32; HASH_SIZE * HASH_SIZE];
        for y in 0..HASH_SIZE {
            for x in 0..HASH_SIZE {
                low[y * HASH_SIZE + x] = coeffs[y * SAMPLE_SIZE + x];
            }
        }

        let mut sorted = low;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = sorted.len() / 2;
        let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

        let mut hash: u64 = 0;
        for (i, &val) in low.iter().enumerate() {
            if val > median {
                hash |= 1 << i;
            }
        }
        hash
    }

    /// Separable 2-D DCT: rows, then columns
    fn dct_2d(&self, buf: &mut [f32]) {
        let n = SAMPLE_SIZE;
        for row in buf.chunks_exact_mut(n) {
            self.dct.process_dct2(row);
        }

        let mut column = vec![0f32; n];
        for x in 0..n {
            for y in 0..n {
                column[y] = buf[y * n + x];
            }
            self.dct.process_dct2(&mut column);
            for y in 0..n {
                buf[y * n + x] = column[y];
            }
        }
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
