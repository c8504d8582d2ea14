//! Per-stage decision logging

use super::error::PipelineError;
use super::frame::{Frame, FrameRef, FrameStore};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 过滤阶段，顺序固定
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pixel,
    SeqDeep,
    GlobalDeep,
    TextOcr,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Pixel, Stage::SeqDeep, Stage::GlobalDeep, Stage::TextOcr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pixel => "pixel",
            Stage::SeqDeep => "seq_deep",
            Stage::GlobalDeep => "global_deep",
            Stage::TextOcr => "text_ocr",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub frame: FrameRef,
    pub kept: bool,
    pub stage: Stage,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_target: Option<FrameRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Outcome of one filtering stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub frames_before: usize,
    pub removed: usize,
    pub log: Vec<DecisionLogEntry>,
    pub errors: Vec<String>,
    #[serde(skip)]
    pending: Vec<usize>,
}

impl StageReport {
    pub fn new(stage: Stage, frames_before: usize) -> Self {
        Self {
            stage,
            frames_before,
            removed: 0,
            log: Vec::with_capacity(frames_before),
            errors: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn keep(&mut self, frame: &Frame, reason: impl Into<String>, score: Option<f32>) {
        self.log.push(DecisionLogEntry {
            frame: frame.to_ref(),
            kept: true,
            stage: self.stage,
            reason: reason.into(),
            comparison_target: None,
            score,
        });
    }

    pub fn drop_frame(
        &mut self,
        frame: &Frame,
        reason: impl Into<String>,
        target: Option<&Frame>,
        score: Option<f32>,
    ) {
        let reason = reason.into();
        debug!("🗑️ [{}] drop {} ({})", self.stage, frame.file_name(), reason);
        self.log.push(DecisionLogEntry {
            frame: frame.to_ref(),
            kept: false,
            stage: self.stage,
            reason,
            comparison_target: target.map(Frame::to_ref),
            score,
        });
        self.pending.push(frame.index);
    }

    /// Drop a frame the stage could not process. Fatal errors are handed back.
    pub fn drop_failed(&mut self, frame: &Frame, err: PipelineError) -> Result<(), PipelineError> {
        if !err.is_frame_local() {
            return Err(err);
        }
        warn!("⚠️ [{}] {} failed: {}", self.stage, frame.file_name(), err);
        self.errors
            .push(format!("{}: {}: {}", self.stage, frame.file_name(), err));
        self.drop_frame(frame, format!("unprocessable: {}", err), None, None);
        Ok(())
    }

    /// Apply the collected removals to the store (serially, in one place).
    pub fn commit(mut self, store: &mut FrameStore) -> Self {
        let before = store.len();
        let errors = store.remove(&self.pending);
        self.removed = before - store.len();
        self.errors.extend(errors);
        self.pending.clear();
        self
    }

    pub fn kept_count(&self) -> usize {
        self.frames_before - self.removed
    }
}
