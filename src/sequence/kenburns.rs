//! Crop-and-scale geometry for slow zoom/pan over a still.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{ReelError, Result};
use crate::media::Resolution;

use super::{Pan, PanEffect, Zoom};

/// Ease-in-out cubic on `[0, 1]`.
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Scale factor at `progress` through a clip.
    pub fn scale_at(&self, zoom: Zoom, progress: f64) -> f64 {
        let e = ease_in_out_cubic(progress);
        let span = self.max - self.min;
        match zoom {
            Zoom::In => self.min + span * e,
            Zoom::Out => self.max - span * e,
        }
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::new(1.0, 1.15)
    }
}

/// Pixel rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest rectangle of `aspect` that fits in `width`×`height`.
fn base_window(width: f64, height: f64, aspect: f64) -> (f64, f64) {
    if width / height >= aspect {
        (height * aspect, height)
    } else {
        (width, width / aspect)
    }
}

/// Crop window for a frame at `scale`, panned by `progress`.
pub fn crop_rect(
    source: (u32, u32),
    aspect: f64,
    scale: f64,
    pan: Pan,
    progress: f64,
) -> Result<CropRect> {
    let (sw, sh) = (source.0 as f64, source.1 as f64);
    if source.0 == 0 || source.1 == 0 || !aspect.is_finite() || aspect <= 0.0 {
        return Err(ReelError::Geometry(format!(
            "Cannot crop a {}x{} image to aspect {aspect}",
            source.0, source.1
        )));
    }
    if !scale.is_finite() || scale < 1.0 {
        return Err(ReelError::Geometry(format!("Invalid zoom scale {scale}")));
    }

    let (base_w, base_h) = base_window(sw, sh, aspect);
    let w = (base_w / scale).round().max(1.0);
    let h = (base_h / scale).round().max(1.0);

    let e = ease_in_out_cubic(progress);
    let (fx, fy) = match pan {
        Pan::None => (0.5, 0.5),
        Pan::Left => (1.0 - e, 0.5),
        Pan::Right => (e, 0.5),
        Pan::Up => (0.5, 1.0 - e),
        Pan::Down => (0.5, e),
    };

    let x = ((sw - w).max(0.0) * fx).round();
    let y = ((sh - h).max(0.0) * fy).round();

    let rect = CropRect {
        x: x as u32,
        y: y as u32,
        width: w as u32,
        height: h as u32,
    };

    if rect.x + rect.width > source.0 || rect.y + rect.height > source.1 {
        return Err(ReelError::Geometry(format!(
            "Crop {:?} falls outside {}x{} source",
            rect, source.0, source.1
        )));
    }
    Ok(rect)
}

/// True when the image is narrower than the target frame and should be letterboxed.
pub fn is_portrait(dimensions: (u32, u32), target: Resolution) -> bool {
    dimensions.1 == 0 || (dimensions.0 as f64 / dimensions.1 as f64) < target.aspect()
}

/// Fit the whole image inside the frame, centred on black.
pub fn letterbox(image: &RgbImage, target: Resolution) -> RgbImage {
    let mut canvas = RgbImage::new(target.width, target.height);
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return canvas;
    }

    let scale = (target.width as f64 / w as f64).min(target.height as f64 / h as f64);
    let fit_w = ((w as f64 * scale).round() as u32).clamp(1, target.width);
    let fit_h = ((h as f64 * scale).round() as u32).clamp(1, target.height);
    let fitted = imageops::resize(image, fit_w, fit_h, FilterType::Triangle);

    let x = (target.width - fit_w) / 2;
    let y = (target.height - fit_h) / 2;
    imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);
    canvas
}

pub fn black_frame(target: Resolution) -> RgbImage {
    RgbImage::new(target.width, target.height)
}

/// Scale every channel toward black. `factor` of 1.0 leaves the frame untouched.
pub fn apply_fade(frame: &mut RgbImage, factor: f64) {
    if factor >= 1.0 {
        return;
    }
    let factor = factor.max(0.0);
    for channel in frame.iter_mut() {
        *channel = (*channel as f64 * factor).round() as u8;
    }
}

/// Brightness for frame `index` of `frames` given head and tail fade lengths in seconds.
pub fn fade_factor(index: usize, fps: u32, duration: f64, fade_in: f64, fade_out: f64) -> f64 {
    let start = index as f64 / fps as f64;
    let end = (index + 1) as f64 / fps as f64;

    let mut factor: f64 = 1.0;
    if fade_in > 0.0 {
        factor = factor.min(start / fade_in);
    }
    if fade_out > 0.0 {
        factor = factor.min((duration - end) / fade_out);
    }
    factor.clamp(0.0, 1.0)
}

/// A still prepared for zoom/pan rendering at a fixed output size.
pub struct KenBurns {
    source: RgbImage,
    effect: PanEffect,
    target: Resolution,
    zoom: ZoomRange,
}

impl KenBurns {
    /// Check that every frame of the motion has a valid crop for an image of `dimensions`.
    pub fn validate(
        dimensions: (u32, u32),
        effect: PanEffect,
        target: Resolution,
        zoom: ZoomRange,
    ) -> Result<()> {
        if zoom.min < 1.0 || zoom.max < zoom.min {
            return Err(ReelError::Geometry(format!(
                "Zoom range {}..{} is not usable",
                zoom.min, zoom.max
            )));
        }
        for progress in [0.0, 0.5, 1.0] {
            let scale = zoom.scale_at(effect.zoom, progress);
            crop_rect(dimensions, target.aspect(), scale, effect.pan, progress)?;
        }
        Ok(())
    }

    /// Oversized sources are shrunk so the deepest zoom still has one source pixel per output pixel.
    pub fn new(source: RgbImage, effect: PanEffect, target: Resolution, zoom: ZoomRange) -> Self {
        let (w, h) = source.dimensions();
        let (_, base_h) = base_window(w as f64, h as f64, target.aspect());
        let needed = target.height as f64 * zoom.max;

        let source = if base_h > needed * 1.01 {
            let factor = needed / base_h;
            let nw = ((w as f64 * factor).round() as u32).max(1);
            let nh = ((h as f64 * factor).round() as u32).max(1);
            imageops::resize(&source, nw, nh, FilterType::Triangle)
        } else {
            source
        };

        Self {
            source,
            effect,
            target,
            zoom,
        }
    }

    pub fn source(&self) -> &RgbImage {
        &self.source
    }

    /// Render the frame at `progress` in `[0, 1]`.
    pub fn frame(&self, progress: f64) -> Result<RgbImage> {
        let scale = self.zoom.scale_at(self.effect.zoom, progress);
        let rect = crop_rect(
            self.source.dimensions(),
            self.target.aspect(),
            scale,
            self.effect.pan,
            progress,
        )?;

        let view = imageops::crop_imm(&self.source, rect.x, rect.y, rect.width, rect.height);
        Ok(imageops::resize(
            &*view,
            self.target.width,
            self.target.height,
            FilterType::Triangle,
        ))
    }
}
