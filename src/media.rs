//! The external media tool.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as ProcCommand;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// The external media tool (ffmpeg or a compatible binary).
#[derive(Debug, Clone)]
pub struct MediaTool {
    binary: String,
}

impl Default for MediaTool {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl MediaTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Duration of a media file in seconds, read from the tool's banner.
    pub fn probe_duration(&self, input: &Path) -> Result<f64> {
        // Without an output file the tool exits non-zero; only the banner matters.
        let output = ProcCommand::new(&self.binary)
            .arg("-hide_banner")
            .arg("-i")
            .arg(input)
            .output()
            .with_context(|| format!("running {} on {}", self.binary, input.display()))?;

        let banner = String::from_utf8_lossy(&output.stderr);
        parse_duration(&banner).ok_or_else(|| anyhow!("no duration reported for {}", input.display()))
    }

    /// Runs the tool with `args` followed by `output`.
    ///
    /// Fails when the tool exits non-zero or leaves no file at `output`.
    pub fn render(&self, args: &[String], output: &Path) -> Result<()> {
        debug!(binary = %self.binary, output = %output.display(), "rendering");

        let result = ProcCommand::new(&self.binary)
            .args(["-loglevel", "error", "-y"])
            .args(args)
            .arg(output)
            .output()
            .with_context(|| format!("running {} for {}", self.binary, output.display()))?;

        if !result.status.success() {
            return Err(anyhow!(
                "{} failed for {}: {}",
                self.binary,
                output.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        if !output.exists() {
            return Err(anyhow!("{} exited cleanly but did not write {}", self.binary, output.display()));
        }
        Ok(())
    }
}

/// Extracts `Duration: HH:MM:SS.ss` from the tool's banner.
pub fn parse_duration(banner: &str) -> Option<f64> {
    let raw = banner.split("Duration: ").nth(1)?.split(',').next()?.trim();
    parse_timestamp(raw)
}

/// Parses `HH:MM:SS.sss`, `MM:SS.sss` or plain seconds.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    s.split(':').rev().enumerate().try_fold(0.0, |acc, (i, v)| {
        let value = v.trim().parse::<f64>().ok()?;
        Some(acc + value * 60f64.powi(i as i32))
    })
}

/// Splits a quality preset such as `-r 30 -c:v libx264` into arguments.
pub fn quality_args(quality: &str) -> Vec<String> {
    quality.split_whitespace().map(str::to_string).collect()
}

/// Removes a scratch file when dropped.
pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// A unique path in the system temp directory.
    pub fn unique(prefix: &str, extension: &str) -> Self {
        let stamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let name = format!("{}_{}_{}.{}", prefix, std::process::id(), stamp, extension);
        Self::new(std::env::temp_dir().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':\n  \
        Duration: 00:01:23.45, start: 0.000000, bitrate: 1205 kb/s\n  \
        Stream #0:0: Video: h264, yuv420p, 1280x720, 30 fps";

    #[test]
    fn test_parse_duration() {
        let secs = parse_duration(BANNER).unwrap();
        assert!((secs - 83.45).abs() < 1e-9);
        assert_eq!(parse_duration("Duration: N/A, bitrate: N/A"), None);
        assert_eq!(parse_duration("no banner"), None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1:00:00"), Some(3600.0));
        assert_eq!(parse_timestamp("02:30"), Some(150.0));
        assert_eq!(parse_timestamp("7.5"), Some(7.5));
        assert_eq!(parse_timestamp("x:10"), None);
    }

    #[test]
    fn test_quality_args() {
        assert_eq!(quality_args(" -r 30  -crf 32 "), vec!["-r", "30", "-crf", "32"]);
    }

    #[test]
    fn test_temp_file_guard_removes_file() {
        let guard = TempFileGuard::unique("reclip_test", "srt");
        fs::write(guard.path(), "1\n").unwrap();
        let path = guard.path().to_path_buf();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_render_reports_missing_tool() {
        let tool = MediaTool::new("reclip-no-such-binary");
        let out = std::env::temp_dir().join("reclip_never_written.mp4");
        assert!(tool.render(&[], &out).is_err());
        assert!(tool.probe_duration(Path::new("in.mp4")).is_err());
    }
}
