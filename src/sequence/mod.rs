//! Image pool → timed Ken Burns clips.
//!
//! [`plan_sequence`] is pure: it decides which image plays when, with which
//! motion and fades. [`SequenceRenderer`] turns a plan into frames.

pub mod cursor;
pub mod kenburns;
pub mod render;

pub use cursor::{ClipSlot, SequencerCursor};
pub use kenburns::{ease_in_out_cubic, CropRect, KenBurns, ZoomRange};
pub use render::{SequenceRenderer, SequenceStats};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::error::{ReelError, Result};
use crate::media::MediaAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zoom {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pan {
    None,
    Left,
    Right,
    Up,
    Down,
}

const PAN_ROTATION: [Pan; 4] = [Pan::None, Pan::Left, Pan::Right, Pan::None];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanEffect {
    pub zoom: Zoom,
    pub pan: Pan,
}

impl PanEffect {
    /// Zoom alternates in/out; pan cycles none, left, right, none.
    pub fn for_index(index: usize) -> Self {
        Self {
            zoom: if index % 2 == 0 { Zoom::In } else { Zoom::Out },
            pan: PAN_ROTATION[index % PAN_ROTATION.len()],
        }
    }
}

/// One image on the slideshow timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedClip {
    pub source: MediaAsset,
    pub start_offset: f64,
    pub duration: f64,
    pub pan_effect: Option<PanEffect>,
    pub fade_in: f64,
    pub fade_out: f64,
}

impl TimedClip {
    pub fn end(&self) -> f64 {
        self.start_offset + self.duration
    }
}

/// Seconds each image should hold, clamped to the configured window.
pub fn per_image_duration(total_duration: f64, pool_len: usize, config: &RenderConfig) -> f64 {
    let raw = total_duration / pool_len.max(1) as f64;
    raw.clamp(config.min_image_duration, config.max_image_duration)
}

/// Cross-fade length: the configured fade, but never more than 30% of an image's hold.
pub fn clip_fade(fade_duration: f64, per_image: f64) -> f64 {
    fade_duration.min(0.3 * per_image)
}

/// Plan clips covering exactly `total_duration`, reusing images round-robin as needed.
pub fn plan_sequence(
    images: &[PathBuf],
    total_duration: f64,
    config: &RenderConfig,
) -> Result<Vec<TimedClip>> {
    if images.is_empty() {
        return Err(ReelError::InvalidInput(
            "Image pool is empty, cannot build a slideshow".to_string(),
        ));
    }
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(ReelError::InvalidInput(format!(
            "Slideshow duration must be positive, got {total_duration}"
        )));
    }

    let pool = if images.len() > config.max_pool_size {
        warn!(
            "Image pool has {} images, using the first {}",
            images.len(),
            config.max_pool_size
        );
        &images[..config.max_pool_size]
    } else {
        images
    };

    let per_image = per_image_duration(total_duration, pool.len(), config);
    let fade = clip_fade(config.image_fade, per_image);

    debug!(
        "Planning {:.2}s slideshow from {} images: {:.2}s per image, {:.2}s fades",
        total_duration,
        pool.len(),
        per_image,
        fade
    );

    let mut cursor = SequencerCursor::new();
    let mut clips: Vec<TimedClip> = std::iter::from_fn(|| cursor.step(pool.len(), per_image, total_duration))
        .map(|slot| TimedClip {
            source: MediaAsset::image(&pool[slot.image_index]),
            start_offset: slot.start,
            duration: slot.duration,
            pan_effect: Some(PanEffect::for_index(slot.index)),
            fade_in: if slot.index > 0 { fade } else { 0.0 },
            fade_out: fade,
        })
        .collect();

    if let Some(last) = clips.last_mut() {
        last.fade_out = 0.0;
    }

    if clips.len() > pool.len() {
        debug!(
            "Pool of {} images reused round-robin across {} clips",
            pool.len(),
            clips.len()
        );
    }

    Ok(clips)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("img_{i:03}.jpg"))).collect()
    }

    fn total(clips: &[TimedClip]) -> f64 {
        clips.iter().map(|c| c.duration).sum()
    }

    #[test]
    fn test_three_images_fifteen_seconds() {
        let clips = plan_sequence(&pool(3), 15.0, &RenderConfig::default()).unwrap();
        assert_eq!(clips.len(), 3);
        assert!((total(&clips) - 15.0).abs() < 1e-9);
        assert!(clips.iter().all(|c| (c.duration - 5.0).abs() < 1e-9));
    }

    #[test]
    fn test_clamps_up_and_uses_fewer_images() {
        // 20 images over 40s would be 2s each; clamped to 4s.
        let clips = plan_sequence(&pool(20), 40.0, &RenderConfig::default()).unwrap();
        assert_eq!(clips.len(), 10);
        assert!(clips.iter().all(|c| (c.duration - 4.0).abs() < 1e-9));
    }

    #[test]
    fn test_clamps_down_and_cycles() {
        // 2 images over 30s would be 15s each; clamped to 6s.
        let clips = plan_sequence(&pool(2), 30.0, &RenderConfig::default()).unwrap();
        assert_eq!(clips.len(), 5);
        assert_eq!(clips[0].source.path, clips[2].source.path);
        assert_ne!(clips[0].source.path, clips[1].source.path);
        assert!((total(&clips) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_clips_are_contiguous() {
        let clips = plan_sequence(&pool(7), 97.3, &RenderConfig::default()).unwrap();
        assert_eq!(clips[0].start_offset, 0.0);
        for pair in clips.windows(2) {
            assert!((pair[0].end() - pair[1].start_offset).abs() < 1e-9);
        }
        assert!((total(&clips) - 97.3).abs() < 1e-9);
    }

    #[test]
    fn test_fades_skip_outer_edges() {
        let clips = plan_sequence(&pool(4), 20.0, &RenderConfig::default()).unwrap();
        assert_eq!(clips[0].fade_in, 0.0);
        assert!(clips[0].fade_out > 0.0);
        assert!(clips[1].fade_in > 0.0);
        assert_eq!(clips.last().unwrap().fade_out, 0.0);
        // min(1.5, 0.3 * 5.0)
        assert!((clips[1].fade_in - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_fade_capped_by_hold_time() {
        assert!((clip_fade(1.5, 4.0) - 1.2).abs() < 1e-9);
        assert_eq!(clip_fade(1.0, 6.0), 1.0);
    }

    #[test]
    fn test_effects_alternate() {
        let clips = plan_sequence(&pool(4), 24.0, &RenderConfig::default()).unwrap();
        let effects: Vec<PanEffect> = clips.iter().map(|c| c.pan_effect.unwrap()).collect();
        assert_eq!(effects[0], PanEffect { zoom: Zoom::In, pan: Pan::None });
        assert_eq!(effects[1], PanEffect { zoom: Zoom::Out, pan: Pan::Left });
        assert_eq!(effects[2], PanEffect { zoom: Zoom::In, pan: Pan::Right });
        assert_eq!(effects[3], PanEffect { zoom: Zoom::Out, pan: Pan::None });
    }

    #[test]
    fn test_pool_truncated_to_limit() {
        let config = RenderConfig {
            max_pool_size: 5,
            ..Default::default()
        };
        let clips = plan_sequence(&pool(8), 60.0, &config).unwrap();
        assert!(clips
            .iter()
            .all(|c| c.source.path != PathBuf::from("img_005.jpg")));
    }

    #[test]
    fn test_empty_pool_is_error() {
        assert!(plan_sequence(&[], 10.0, &RenderConfig::default()).is_err());
    }

    #[test]
    fn test_non_positive_duration_is_error() {
        assert!(plan_sequence(&pool(3), 0.0, &RenderConfig::default()).is_err());
        assert!(plan_sequence(&pool(3), f64::NAN, &RenderConfig::default()).is_err());
    }
}
