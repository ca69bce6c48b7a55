//! File-backed media assets and the interfaces the rest of the crate renders through.
//!
//! Components never talk to ffmpeg or an image decoder directly. They take an
//! [`ImageSource`], [`AudioSource`] or [`VideoTimeline`], so the stepping and
//! timing logic can be exercised with in-memory fakes.

pub mod ffmpeg;
pub mod images;
pub mod probe;

pub use ffmpeg::{FfmpegAudio, FfmpegTimeline};
pub use images::ImageCrate;
pub use probe::{
    check_ffmpeg, check_ffprobe, probe_duration, probe_has_audio, probe_resolution,
};

use crate::audio::AudioBuffer;
use crate::error::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FULL_HD: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FULL_HD
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

/// A read-only file on disk. Duration is known for audio/video, resolution for image/video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub duration: Option<f64>,
    pub resolution: Option<Resolution>,
}

impl MediaAsset {
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: MediaKind::Image,
            duration: None,
            resolution: None,
        }
    }

    pub fn audio(path: impl Into<PathBuf>, duration: f64) -> Self {
        Self {
            path: path.into(),
            kind: MediaKind::Audio,
            duration: Some(duration),
            resolution: None,
        }
    }

    pub fn video(path: impl Into<PathBuf>, duration: f64, resolution: Option<Resolution>) -> Self {
        Self {
            path: path.into(),
            kind: MediaKind::Video,
            duration: Some(duration),
            resolution,
        }
    }

    /// File name for log messages.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Decodes still images.
pub trait ImageSource {
    fn load(&self, path: &Path) -> Result<RgbImage>;
}

/// Probes and decodes audio files.
pub trait AudioSource {
    fn duration(&self, path: &Path) -> Result<f64>;
    fn decode(&self, path: &Path, sample_rate: u32, channels: u16) -> Result<AudioBuffer>;
}

/// Fade-from-black at the head and fade-to-black at the tail, applied to both video and audio.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fades {
    pub fade_in: f64,
    pub fade_out: f64,
}

impl Fades {
    pub fn new(fade_in: f64, fade_out: f64) -> Self {
        Self { fade_in, fade_out }
    }

    pub fn is_none(&self) -> bool {
        self.fade_in <= 0.0 && self.fade_out <= 0.0
    }
}

/// Where a rendered segment takes its sound from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    File(PathBuf),
    Silence,
}

/// Output description for a segment rendered from raw frames.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub output: PathBuf,
    pub duration: f64,
    pub audio: AudioInput,
    pub subtitles: Option<PathBuf>,
    pub fades: Fades,
}

/// Receives RGB frames at the configured resolution, in presentation order.
pub trait FrameSink {
    fn push(&mut self, frame: &RgbImage) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Encodes timeline pieces to intermediate files and joins them.
///
/// Every file produced through this trait is at the configured resolution,
/// frame rate and audio format, and always carries exactly one audio stream.
pub trait VideoTimeline {
    /// Open an encoder fed with raw frames.
    fn frame_sink(&self, spec: &SegmentSpec) -> Result<Box<dyn FrameSink>>;

    /// Reframe an externally produced video to the target size and frame rate.
    fn normalize_video(&self, input: &Path, output: &Path, duration: f64, fades: Fades)
        -> Result<()>;

    /// Solid-colour card with silent audio and symmetric fades.
    fn solid_card(&self, output: &Path, duration: f64, fade: f64) -> Result<()>;

    /// Whether `path` carries at least one audio stream.
    fn has_audio(&self, path: &Path) -> Result<bool>;

    /// Mux a silent track into `path` if a transform left it without audio.
    fn reattach_audio(&self, path: &Path, duration: f64) -> Result<()>;

    /// Join pieces in order and encode the final deliverable.
    fn concat_encode(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_aspect() {
        assert!((Resolution::FULL_HD.aspect() - 16.0 / 9.0).abs() < 1e-9);
        assert_eq!(Resolution::new(1280, 720).to_string(), "1280x720");
    }

    #[test]
    fn test_media_asset_name() {
        let asset = MediaAsset::image("/books/covers/dune.jpg");
        assert_eq!(asset.name(), "dune.jpg");
        assert_eq!(asset.kind, MediaKind::Image);
        assert!(asset.duration.is_none());
    }

    #[test]
    fn test_fades_is_none() {
        assert!(Fades::default().is_none());
        assert!(!Fades::new(0.5, 0.0).is_none());
    }
}
