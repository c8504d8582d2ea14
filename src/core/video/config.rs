use super::error::PipelineError;
use super::phash::HASH_BITS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for `extract_interval`, keeps frame timestamps within `Duration`
pub const MAX_EXTRACT_INTERVAL_SECS: f64 = u32::MAX as f64;

pub const DEFAULT_CAPTION_PROMPT: &str = "Describe this image in one sentence. \
Prioritize any visible numbers, text, or titles. \
If the image contains a chart, append the tag <chart>; \
if it contains a table, append the tag <table>.";

/// Per-run options. Every field is optional in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Seconds between extracted frames
    pub extract_interval: f64,
    /// Hamming-distance budget for stage 1 (0-64)
    pub pixel_threshold: u32,
    /// Cosine similarity against the last kept frame (stage 2)
    pub sequential_deep_threshold: f32,
    /// Cosine similarity against any earlier kept frame (stage 3)
    pub global_deep_threshold: f32,
    /// Frames with fewer OCR words are dropped (stage 4)
    pub min_words: usize,
    pub caption_prompt: String,
    pub ocr_lang: String,
    pub ocr_accelerator: bool,
    /// Compare stage 3 candidates only with the last N kept frames.
    /// `None` keeps the exact all-pairs behaviour.
    pub global_compare_window: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            extract_interval: 8.0,
            pixel_threshold: 3,
            sequential_deep_threshold: 0.8,
            global_deep_threshold: 0.85,
            min_words: 5,
            caption_prompt: DEFAULT_CAPTION_PROMPT.to_string(),
            ocr_lang: "eng".to_string(),
            ocr_accelerator: false,
            global_compare_window: None,
        }
    }
}

impl PipelineOptions {
    /// Lecture slides: only text-heavy frames are worth keeping
    pub fn for_slides() -> Self {
        Self {
            min_words: 20,
            ..Default::default()
        }
    }

    /// Camera footage: more motion, less text
    pub fn for_footage() -> Self {
        Self {
            extract_interval: 4.0,
            pixel_threshold: 5,
            sequential_deep_threshold: 0.9,
            global_deep_threshold: 0.92,
            min_words: 5,
            ..Default::default()
        }
    }

    /// Parse from JSON5 (comments and trailing commas allowed)
    pub fn from_json5_str(text: &str) -> Result<Self, PipelineError> {
        let options: Self =
            json5::from_str(text).map_err(|e| PipelineError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn interval(&self) -> Result<Duration, PipelineError> {
        Duration::try_from_secs_f64(self.extract_interval).map_err(|e| {
            PipelineError::InvalidOptions(format!(
                "extract_interval {} is not a valid duration: {}",
                self.extract_interval, e
            ))
        })
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.extract_interval > 0.0 && self.extract_interval <= MAX_EXTRACT_INTERVAL_SECS) {
            return Err(PipelineError::InvalidOptions(format!(
                "extract_interval must be within (0, {}], got {}",
                MAX_EXTRACT_INTERVAL_SECS, self.extract_interval
            )));
        }
        if self.pixel_threshold > HASH_BITS {
            return Err(PipelineError::InvalidOptions(format!(
                "pixel_threshold must be within 0..={}, got {}",
                HASH_BITS, self.pixel_threshold
            )));
        }
        for (name, value) in [
            ("sequential_deep_threshold", self.sequential_deep_threshold),
            ("global_deep_threshold", self.global_deep_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::InvalidOptions(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.ocr_lang.trim().is_empty() {
            return Err(PipelineError::InvalidOptions("ocr_lang is empty".to_string()));
        }
        if self.global_compare_window == Some(0) {
            return Err(PipelineError::InvalidOptions(
                "global_compare_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
