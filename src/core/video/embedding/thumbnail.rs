use super::ImageEmbedder;
use crate::core::video::error::PipelineError;
use image::imageops::FilterType;
use image::DynamicImage;

/// 缩略图嵌入 - CPU-only embedding without model weights.
///
/// Downsamples to `size`×`size` RGB plus a 64-bin luma histogram, each part
/// mean-centred, so cosine similarity behaves like a correlation score
/// instead of sitting near 1.0 for every natural image.
pub struct ThumbnailEmbedder {
    size: u32,
}

impl ThumbnailEmbedder {
    pub fn new() -> Self {
        Self::with_size(16)
    }

    pub fn with_size(size: u32) -> Self {
        Self { size: size.max(2) }
    }

    fn histogram(luma: &[u8]) -> [f32; 64] {
        let mut hist = [0f32; 64];
        for &val in luma {
            hist[(val >> 2) as usize] += 1.0;
        }
        let total = luma.len().max(1) as f32;
        for bin in hist.iter_mut() {
            *bin /= total;
        }
        hist
    }

    fn centre(values: &mut [f32]) {
        if values.is_empty() {
            return;
        }
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        for v in values.iter_mut() {
            *v -= mean;
        }
    }
}

impl Default for ThumbnailEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageEmbedder for ThumbnailEmbedder {
    fn name(&self) -> &str {
        "thumbnail"
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::Embedding("empty image".to_string()));
        }

        let small = image
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_rgb8();

        let mut pixels: Vec<f32> = small.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Self::centre(&mut pixels);

        let luma = image.to_luma8();
        let mut hist = Self::histogram(luma.as_raw()).to_vec();
        Self::centre(&mut hist);

        pixels.extend(hist);
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::embedding::cosine_similarity;
    use crate::core::video::test_support::noise_image;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_dimension() {
        let embedder = ThumbnailEmbedder::with_size(8);
        let v = embedder.embed(&noise_image(1, 1)).unwrap();
        assert_eq!(v.len(), 8 * 8 * 3 + 64);
    }

    #[test]
    fn test_same_image_is_identical() {
        let embedder = ThumbnailEmbedder::new();
        let a = embedder.embed(&noise_image(5, 5)).unwrap();
        let b = embedder.embed(&noise_image(5, 5)).unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_inverted_image_is_dissimilar() {
        let embedder = ThumbnailEmbedder::new();
        let mut light = RgbImage::new(32, 32);
        let mut dark = RgbImage::new(32, 32);
        for (x, y, px) in light.enumerate_pixels_mut() {
            let v = if x < 16 { 240 } else { 20 };
            *px = Rgb([v, v, v]);
            dark.put_pixel(x, y, Rgb([255 - v, 255 - v, 255 - v]));
        }
        let a = embedder.embed(&DynamicImage::ImageRgb8(light)).unwrap();
        let b = embedder.embed(&DynamicImage::ImageRgb8(dark)).unwrap();
        assert!(cosine_similarity(&a, &b) < 0.5);
    }
}
