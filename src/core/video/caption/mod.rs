//! 图片描述 - one caption per surviving frame plus a manifest

pub mod http;

pub use http::{HttpCaptionConfig, HttpCaptionModel};

use super::error::PipelineError;
use super::frame::{figure_names, Frame};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "captions.json";

static TAG_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)<\s*(chart|table)\s*/?>"));

/// External vision-caption model: image + prompt → text
pub trait CaptionModel: Send + Sync {
    fn name(&self) -> &str;
    fn caption(&self, image: &Path, prompt: &str) -> Result<String, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionTag {
    Chart,
    Table,
}

pub fn parse_tags(raw: &str) -> BTreeSet<CaptionTag> {
    let mut tags = BTreeSet::new();
    if let Ok(re) = TAG_RE.as_ref() {
        for cap in re.captures_iter(raw) {
            match cap[1].to_ascii_lowercase().as_str() {
                "chart" => {
                    tags.insert(CaptionTag::Chart);
                }
                "table" => {
                    tags.insert(CaptionTag::Table);
                }
                _ => {}
            }
        }
    }
    tags
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub figure_name: String,
    /// Trimmed model output, tag markers included; empty when captioning failed
    pub caption: String,
    pub tags: BTreeSet<CaptionTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptionRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ManifestEntry {
    caption: String,
    tags: BTreeSet<CaptionTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptionOutput {
    pub records: Vec<CaptionRecord>,
    pub manifest_path: PathBuf,
    pub captions_generated: usize,
    pub errors: Vec<String>,
}

pub struct Captioner<'a> {
    model: &'a dyn CaptionModel,
    prompt: &'a str,
}

impl<'a> Captioner<'a> {
    pub fn new(model: &'a dyn CaptionModel, prompt: &'a str) -> Self {
        Self { model, prompt }
    }

    /// Caption every frame once, in order. A failed frame still gets a record.
    pub fn caption_frames(&self, frames: &[Frame]) -> (Vec<CaptionRecord>, Vec<String>) {
        let mut records = Vec::with_capacity(frames.len());
        let mut errors = Vec::new();

        for (frame, figure_name) in frames.iter().zip(figure_names(frames)) {
            match self.model.caption(&frame.path, self.prompt) {
                Ok(raw) => {
                    let caption = raw.trim().to_string();
                    let tags = parse_tags(&caption);
                    info!("📝 {}: {}", figure_name, caption);
                    records.push(CaptionRecord {
                        figure_name,
                        caption,
                        tags,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("⚠️ Caption failed for {}: {}", figure_name, e);
                    errors.push(format!("caption: {}: {}", frame.file_name(), e));
                    records.push(CaptionRecord {
                        figure_name,
                        caption: String::new(),
                        tags: BTreeSet::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        (records, errors)
    }

    /// Caption and write the manifest to `manifest_path`
    pub fn run(&self, frames: &[Frame], manifest_path: &Path) -> Result<CaptionOutput, PipelineError> {
        let (records, errors) = self.caption_frames(frames);
        write_manifest(&records, manifest_path).map_err(|e| {
            error!("❌ Failed to write caption manifest: {}", e);
            e
        })?;

        let captions_generated = records.iter().filter(|r| r.succeeded()).count();
        info!(
            "✅ Captions: {}/{} generated, manifest at {:?}",
            captions_generated,
            records.len(),
            manifest_path
        );
        Ok(CaptionOutput {
            records,
            manifest_path: manifest_path.to_path_buf(),
            captions_generated,
            errors,
        })
    }
}

pub fn write_manifest(records: &[CaptionRecord], path: &Path) -> Result<(), PipelineError> {
    let manifest: BTreeMap<&str, ManifestEntry> = records
        .iter()
        .map(|r| {
            (
                r.figure_name.as_str(),
                ManifestEntry {
                    caption: r.caption.clone(),
                    tags: r.tags.clone(),
                    error: r.error.clone(),
                },
            )
        })
        .collect();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<CaptionRecord>, PipelineError> {
    let text = fs::read_to_string(path)?;
    let manifest: BTreeMap<String, ManifestEntry> = serde_json::from_str(&text)?;
    Ok(manifest
        .into_iter()
        .map(|(figure_name, entry)| CaptionRecord {
            figure_name,
            caption: entry.caption,
            tags: entry.tags,
            error: entry.error,
        })
        .collect())
}
