use std::path::Path;

use image::RgbImage;

use crate::error::{ReelError, Result};

use super::ImageSource;

/// [`ImageSource`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrate;

impl ImageSource for ImageCrate {
    fn load(&self, path: &Path) -> Result<RgbImage> {
        if !path.exists() {
            return Err(ReelError::FileNotFound(path.display().to_string()));
        }
        // Grayscale, RGBA and 16-bit sources all collapse to 8-bit RGB here.
        Ok(image::open(path)?.to_rgb8())
    }
}
