use std::path::Path;

use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::error::Result;
use crate::media::{FrameSink, ImageSource, Resolution};

use super::kenburns::{apply_fade, black_frame, fade_factor, is_portrait, letterbox, KenBurns, ZoomRange};
use super::TimedClip;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceStats {
    pub clips: usize,
    pub frames: usize,
    /// Clips that fell back to a black or static frame.
    pub degraded: usize,
}

enum Framing {
    Motion(KenBurns),
    Still(RgbImage),
}

impl Framing {
    fn fallback(&self, target: Resolution) -> RgbImage {
        match self {
            Framing::Motion(kb) => letterbox(kb.source(), target),
            Framing::Still(img) => img.clone(),
        }
    }
}

/// First and one-past-last frame index of a span on the slideshow timeline.
///
/// Rounding both edges against the same grid keeps adjacent clips gapless.
pub fn frame_range(start: f64, end: f64, fps: u32) -> std::ops::Range<usize> {
    let fps = fps as f64;
    let first = (start * fps).round().max(0.0) as usize;
    let last = (end * fps).round().max(0.0) as usize;
    first..last.max(first)
}

/// Draws planned clips into a [`FrameSink`].
pub struct SequenceRenderer<'a> {
    images: &'a dyn ImageSource,
    config: &'a RenderConfig,
    show_progress: bool,
}

impl<'a> SequenceRenderer<'a> {
    pub fn new(images: &'a dyn ImageSource, config: &'a RenderConfig) -> Self {
        Self {
            images,
            config,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn zoom(&self) -> ZoomRange {
        ZoomRange::new(self.config.zoom_min, self.config.zoom_max)
    }

    fn progress_bar(&self, frames: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(frames as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    /// Decode and frame one clip's image. Never fails: unusable images degrade to still frames.
    fn prepare(&self, clip: &TimedClip) -> (Framing, bool) {
        let target = self.config.resolution;
        let path = &clip.source.path;

        let image = match self.images.load(path) {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    "Could not decode {}, rendering black frames instead: {}",
                    path.display(),
                    e
                );
                return (Framing::Still(black_frame(target)), true);
            }
        };

        if is_portrait(image.dimensions(), target) {
            debug!("{} is portrait, letterboxing", clip.source.name());
            return (Framing::Still(letterbox(&image, target)), false);
        }

        let Some(effect) = clip.pan_effect else {
            return (Framing::Still(letterbox(&image, target)), false);
        };

        match KenBurns::validate(image.dimensions(), effect, target, self.zoom()) {
            Ok(()) => (
                Framing::Motion(KenBurns::new(image, effect, target, self.zoom())),
                false,
            ),
            Err(e) => {
                warn!(
                    "Zoom/pan not possible for {}, using a static frame: {}",
                    clip.source.name(),
                    e
                );
                (Framing::Still(letterbox(&image, target)), true)
            }
        }
    }

    /// Render every clip in order. Only sink errors are fatal.
    pub fn render(&self, clips: &[TimedClip], sink: &mut dyn FrameSink) -> Result<SequenceStats> {
        let fps = self.config.fps;
        let target = self.config.resolution;
        let mut stats = SequenceStats::default();

        let total_frames = clips
            .last()
            .map(|c| frame_range(0.0, c.end(), fps).len())
            .unwrap_or(0);
        let pb = self.progress_bar(total_frames);
        pb.set_message("Rendering slideshow");

        for clip in clips {
            let range = frame_range(clip.start_offset, clip.end(), fps);
            let frames = range.len();
            if frames == 0 {
                debug!("Clip {} shorter than one frame, skipped", clip.source.name());
                continue;
            }

            let (mut framing, mut degraded) = self.prepare(clip);
            let clip_seconds = frames as f64 / fps as f64;

            for k in 0..frames {
                let progress = if frames > 1 {
                    k as f64 / (frames - 1) as f64
                } else {
                    0.0
                };

                let attempt = match &framing {
                    Framing::Motion(kb) => kb.frame(progress),
                    Framing::Still(img) => Ok(img.clone()),
                };
                let mut frame = match attempt {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(
                            "Frame {} of {} failed, holding a static frame: {}",
                            k,
                            clip.source.name(),
                            e
                        );
                        let still = framing.fallback(target);
                        framing = Framing::Still(still.clone());
                        degraded = true;
                        still
                    }
                };

                let factor = fade_factor(k, fps, clip_seconds, clip.fade_in, clip.fade_out);
                apply_fade(&mut frame, factor);
                sink.push(&frame)?;
                pb.inc(1);
            }

            stats.clips += 1;
            stats.frames += frames;
            if degraded {
                stats.degraded += 1;
            }
        }

        pb.finish_and_clear();
        debug!(
            "Slideshow rendered: {} clips, {} frames, {} degraded",
            stats.clips, stats.frames, stats.degraded
        );
        Ok(stats)
    }

    /// Hold one letterboxed image for `duration` seconds. A missing or broken image renders black.
    pub fn render_still(&self, image: &Path, duration: f64, sink: &mut dyn FrameSink) -> Result<usize> {
        let target = self.config.resolution;
        let frame = match self.images.load(image) {
            Ok(img) => letterbox(&img, target),
            Err(e) => {
                warn!(
                    "Could not decode {}, holding a black frame: {}",
                    image.display(),
                    e
                );
                black_frame(target)
            }
        };

        let frames = frame_range(0.0, duration, self.config.fps).len();
        for _ in 0..frames {
            sink.push(&frame)?;
        }
        Ok(frames)
    }
}
