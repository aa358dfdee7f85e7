use crate::recorder::{CaptureSummary, StopReason};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureSource {
    Root,
    Window { id: u32, direct: bool },
    Display { index: usize },
}

/// What a capture run left behind in its frame directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub source: CaptureSource,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub elapsed_secs: f64,
    pub stop_reason: StopReason,
}

impl RunMetadata {
    pub fn new(source: CaptureSource, summary: &CaptureSummary) -> Self {
        let (width, height, stride) = summary
            .header
            .map(|h| (h.width, h.height, h.stride))
            .unwrap_or_default();

        Self {
            source,
            frames: summary.frames,
            width,
            height,
            stride,
            elapsed_secs: summary.elapsed.as_secs_f64(),
            stop_reason: summary.stop_reason.clone(),
        }
    }

    pub fn save(&self, frames_dir: &Path) -> Result<()> {
        let metadata_path = metadata_path(frames_dir);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&metadata_path, json)
            .with_context(|| format!("Failed to write metadata to {:?}", metadata_path))?;
        Ok(())
    }

    pub fn load(frames_dir: &Path) -> Result<Self> {
        let metadata_path = metadata_path(frames_dir);
        let json = fs::read_to_string(&metadata_path)
            .with_context(|| format!("Failed to read metadata from {:?}", metadata_path))?;
        let metadata: Self = serde_json::from_str(&json)?;
        Ok(metadata)
    }
}

/// Get the metadata file path for a frame directory
pub fn metadata_path(frames_dir: &Path) -> PathBuf {
    frames_dir.join("capture.json")
}
