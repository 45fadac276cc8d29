//! # reclip - short-form video repurposing toolkit
//!
//! `reclip` turns long videos and image posts into short vertical clips.
//!
//! ## Features
//!
//! - Convert word-timed transcripts into SRT captions ([`captions`])
//! - Lay out up to nine images on a fixed canvas ([`grid`])
//! - Split a source video into parts stacked over background footage
//! - Composite image grids over a background
//! - Keep an append-only log of produced clips and their upload state
//!
//! Encoding is delegated to an external `ffmpeg` binary.
//!
//! ## Example
//!
//! ```
//! use reclip::grid::layout;
//!
//! let placements = layout(3, 400, 800).unwrap();
//! let coords: Vec<(u32, u32)> = placements.iter().map(|p| (p.x, p.y)).collect();
//! assert_eq!(coords, vec![(0, 0), (200, 0), (100, 400)]);
//! ```
//!
//! ## Progress Reporting
//!
//! Rendering clip parts reports progress through a callback:
//!
//! ```no_run
//! use reclip::clip::{self, ClipJob};
//! use reclip::media::MediaTool;
//! use reclip::ProgressPhase;
//! # fn run(job: &ClipJob) -> anyhow::Result<()> {
//! let tool = MediaTool::default();
//! let mut rng = rand::thread_rng();
//! clip::run(&tool, job, &mut rng, |progress| {
//!     if progress.phase == ProgressPhase::RenderingParts {
//!         println!("{}/{}", progress.completed, progress.total);
//!     }
//! })?;
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod captions;
pub mod clip;
pub mod filtergraph;
pub mod grid;
pub mod logging;
pub mod media;
pub mod records;
pub mod reddit;

/// Represents the current phase of a clip job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Reading durations of the source and backgrounds
    ProbingMedia,
    /// Rendering parts with the media tool
    RenderingParts,
    /// All parts rendered
    Complete,
}

/// Progress information for clip jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Number of items completed in the current phase
    pub completed: usize,
    /// Total number of items in the current phase (0 if unknown)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn probing_media() -> Self {
        Self {
            phase: ProgressPhase::ProbingMedia,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Probing media durations...".to_string(),
        }
    }

    pub fn rendering_parts(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::RenderingParts,
            completed,
            total,
            percentage,
            message: format!("Rendering part {} of {}", completed, total),
        }
    }

    pub fn complete(total_parts: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_parts,
            total: total_parts,
            percentage: 100.0,
            message: format!("Rendered {} parts", total_parts),
        }
    }
}

fn default_clip_length() -> f64 {
    90.0
}
fn default_overlap() -> f64 {
    5.0
}
fn default_caption_max_len() -> usize {
    captions::DEFAULT_MAX_LEN
}
fn default_canvas_width() -> u32 {
    1080
}
fn default_canvas_height() -> u32 {
    1920
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_quality() -> String {
    "-r 30 -vsync 2 -c:v libx264 -crf 32 -preset ultrafast".to_string()
}
fn default_subtitle_style() -> String {
    "Fontname=Consolas,BackColour=&H80000000,Spacing=0.2,Outline=0,Shadow=0.75".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}
fn default_http_timeout_secs() -> u64 {
    20
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Longest part in seconds, overlap included
    #[serde(default = "default_clip_length")]
    pub clip_length: f64,
    /// Seconds repeated at the start of the next part
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    #[serde(default = "default_caption_max_len")]
    pub caption_max_len: usize,
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,
    /// Media tool binary
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    /// Encoder arguments appended to every render
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_subtitle_style")]
    pub subtitle_style: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            clip_length: default_clip_length(),
            overlap: default_overlap(),
            caption_max_len: default_caption_max_len(),
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            ffmpeg: default_ffmpeg(),
            quality: default_quality(),
            subtitle_style: default_subtitle_style(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig =
            serde_json::from_str(&text).with_context(|| format!("parsing config json {}", path.display()))?;
        config.validate().with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Resolve configuration: explicit path, app data dir, current dir, then built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(mut d) = dirs::data_dir() {
            d.push("reclip");
            d.push("reclip.json");
            tried.push(d);
        }
        tried.push(PathBuf::from("reclip.json"));

        for p in &tried {
            if p.exists() {
                return Self::from_file(p);
            }
        }

        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.overlap < 0.0 || self.clip_length <= self.overlap {
            return Err(anyhow!(
                "clip_length ({}) must be greater than overlap ({}) and overlap must not be negative",
                self.clip_length,
                self.overlap
            ));
        }
        if self.caption_max_len == 0 {
            return Err(anyhow!("caption_max_len must be positive"));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(anyhow!(
                "canvas must be non-empty, got {}x{}",
                self.canvas_width,
                self.canvas_height
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"clip_length": 60, "ffmpeg": "/opt/ffmpeg"}"#).unwrap();
        assert_eq!(cfg.clip_length, 60.0);
        assert_eq!(cfg.ffmpeg, "/opt/ffmpeg");
        assert_eq!(cfg.overlap, 5.0);
        assert_eq!(cfg.caption_max_len, 200);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = AppConfig {
            clip_length: 5.0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = AppConfig {
            canvas_height: 0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = AppConfig {
            overlap: -1.0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reclip.json");
        fs::write(&path, r#"{"caption_max_len": 42}"#).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap().caption_max_len, 42);

        fs::write(&path, r#"{"caption_max_len": 0}"#).unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
        assert!(AppConfig::load(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_progress_percentage() {
        let p = Progress::rendering_parts(1, 4);
        assert_eq!(p.phase, ProgressPhase::RenderingParts);
        assert_eq!(p.percentage, 25.0);
        assert_eq!(Progress::rendering_parts(0, 0).percentage, 0.0);
    }
}
