//! Shared fixtures for the video pipeline tests.
//!
//! Test frames are noise images carrying an id in the red channel of pixel
//! (0, 0); the fakes below read that id back to decide what to return.

use super::caption::CaptionModel;
use super::embedding::ImageEmbedder;
use super::error::PipelineError;
use super::ocr::{OcrSettings, TextRecognizer};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SIDE: u32 = 64;

/// Deterministic noise image; equal seeds give byte-identical images
pub fn noise_image(seed: u64, id: u8) -> DynamicImage {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 24) as u8
    };
    let mut img = RgbImage::new(SIDE, SIDE);
    for px in img.pixels_mut() {
        *px = Rgb([next(), next(), next()]);
    }
    img.put_pixel(0, 0, Rgb([id, 0, 0]));
    DynamicImage::ImageRgb8(img)
}

/// Writes `frame_00000.png`, `frame_00001.png`, ... one per id
pub fn write_frames(dir: &Path, ids: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    for (pos, id) in ids.iter().enumerate() {
        noise_image(*id as u64, *id)
            .save(dir.join(format!("frame_{:05}.png", pos)))
            .unwrap();
    }
}

pub fn image_id(image: &DynamicImage) -> u8 {
    image.get_pixel(0, 0)[0]
}

fn path_id(path: &Path) -> Result<u8, PipelineError> {
    Ok(image_id(&image::open(path)?))
}

pub fn one_hot(dim: usize, k: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[k % dim] = 1.0;
    v
}

type VectorFn = Box<dyn Fn(u8) -> Vec<f32> + Send + Sync>;

pub struct FakeEmbedder {
    vectors: VectorFn,
    calls: Arc<AtomicUsize>,
}

impl FakeEmbedder {
    pub fn new(vectors: impl Fn(u8) -> Vec<f32> + Send + Sync + 'static) -> Self {
        Self {
            vectors: Box::new(vectors),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl ImageEmbedder for FakeEmbedder {
    fn name(&self) -> &str {
        "fake"
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.vectors)(image_id(image)))
    }
}

type WordsFn = Box<dyn Fn(u8) -> usize + Send + Sync>;

pub struct FakeOcr {
    words: WordsFn,
    failing: HashSet<u8>,
    languages: HashSet<String>,
}

impl FakeOcr {
    pub fn new(words: impl Fn(u8) -> usize + Send + Sync + 'static) -> Self {
        Self {
            words: Box::new(words),
            failing: HashSet::new(),
            languages: HashSet::from(["eng".to_string()]),
        }
    }

    pub fn failing_on(mut self, ids: &[u8]) -> Self {
        self.failing.extend(ids.iter().copied());
        self
    }
}

impl TextRecognizer for FakeOcr {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    fn prepare(&self, settings: &OcrSettings) -> Result<(), PipelineError> {
        if self.languages.contains(&settings.lang) {
            Ok(())
        } else {
            Err(PipelineError::ModelLoadFailed(format!(
                "no language data for '{}'",
                settings.lang
            )))
        }
    }

    fn recognize(&self, frame: &Path, _settings: &OcrSettings) -> Result<String, PipelineError> {
        let id = path_id(frame)?;
        if self.failing.contains(&id) {
            return Err(PipelineError::Ocr(format!("engine crashed on frame {}", id)));
        }
        Ok(vec!["word"; (self.words)(id)].join(" "))
    }
}

pub struct FakeCaptionModel {
    failing: HashSet<u8>,
    calls: Arc<AtomicUsize>,
}

impl FakeCaptionModel {
    pub fn failing_on(ids: &[u8]) -> Self {
        Self {
            failing: ids.iter().copied().collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl CaptionModel for FakeCaptionModel {
    fn name(&self) -> &str {
        "fake-captioner"
    }

    fn caption(&self, image: &Path, _prompt: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = path_id(image)?;
        if self.failing.contains(&id) {
            return Err(PipelineError::Caption(format!("model refused frame {}", id)));
        }
        Ok(format!("Frame {} shows a chart <chart>", id))
    }
}
