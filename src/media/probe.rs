use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{ReelError, Result};

use super::Resolution;

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    check_tool("ffmpeg")
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    check_tool("ffprobe")
}

fn check_tool(name: &str) -> Result<()> {
    let output = Command::new(name).arg("-version").output().map_err(|e| {
        ReelError::Ffmpeg(format!(
            "{name} not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(ReelError::Ffmpeg(format!("{name} check failed")));
    }

    debug!("{} is available", name);
    Ok(())
}

fn run_ffprobe(input: &Path, args: &[&str]) -> Result<String> {
    if !input.exists() {
        return Err(ReelError::FileNotFound(input.display().to_string()));
    }

    let output = Command::new("ffprobe")
        .args(["-v", "error"])
        .args(args)
        .arg(input)
        .output()
        .map_err(|e| ReelError::Ffmpeg(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReelError::Ffmpeg(format!(
            "FFprobe failed on {}: {}",
            input.display(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Container duration in seconds.
pub fn probe_duration(input: &Path) -> Result<f64> {
    let duration_str = run_ffprobe(
        input,
        &[
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ],
    )?;

    let duration: f64 = duration_str.parse().map_err(|e| {
        ReelError::Ffmpeg(format!("Failed to parse duration '{}': {e}", duration_str))
    })?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(ReelError::InvalidInput(format!(
            "{} reports a non-positive duration ({duration})",
            input.display()
        )));
    }

    Ok(duration)
}

/// Size of the first video stream.
pub fn probe_resolution(input: &Path) -> Result<Resolution> {
    let info = run_ffprobe(
        input,
        &[
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ],
    )?;

    parse_resolution(&info).ok_or_else(|| {
        ReelError::Ffmpeg(format!(
            "Failed to parse resolution '{}' of {}",
            info,
            input.display()
        ))
    })
}

/// Whether the file carries at least one audio stream.
pub fn probe_has_audio(input: &Path) -> Result<bool> {
    let streams = run_ffprobe(
        input,
        &[
            "-select_streams",
            "a",
            "-show_entries",
            "stream=index",
            "-of",
            "csv=p=0",
        ],
    )?;
    Ok(!streams.is_empty())
}

fn parse_resolution(info: &str) -> Option<Resolution> {
    let line = info.lines().next()?;
    let (w, h) = line.trim().trim_end_matches('x').split_once('x')?;
    Some(Resolution::new(w.parse().ok()?, h.parse().ok()?))
}
