//! Crop, scale and print-size arithmetic.
//!
//! Everything here is pure so it can be checked without decoding images.

use crate::error::PhotoError;

/// Width / height of an ID photograph.
pub const ID_PHOTO_RATIO: f64 = 3.0 / 4.0;

/// Largest width sent to the generator.
pub const MAX_UPLOAD_WIDTH: u32 = 1024;

pub const MM_PER_INCH: f64 = 25.4;

/// Crop region in exact source pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRectangle {
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer crop region, always inside the source bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRectangle {
    /// Largest centered rectangle with `ratio` (width / height) inside the source.
    ///
    /// Sources relatively wider than the ratio keep their full height; all
    /// others keep their full width. No upscaling happens.
    pub fn centered(source_width: u32, source_height: u32, ratio: f64) -> Result<Self, PhotoError> {
        if source_width == 0 || source_height == 0 {
            return Err(PhotoError::Input(format!(
                "image dimensions must be non-zero, got {source_width}x{source_height}"
            )));
        }
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(PhotoError::Input(format!(
                "aspect ratio must be positive, got {ratio}"
            )));
        }

        let source_w = source_width as f64;
        let source_h = source_height as f64;
        if source_w / source_h > ratio {
            let width = (source_h * ratio).min(source_w);
            Ok(Self {
                offset_x: (source_w - width) / 2.0,
                offset_y: 0.0,
                width,
                height: source_h,
            })
        } else {
            let height = (source_w / ratio).min(source_h);
            Ok(Self {
                offset_x: 0.0,
                offset_y: (source_h - height) / 2.0,
                width: source_w,
                height,
            })
        }
    }

    pub fn is_within(&self, source_width: u32, source_height: u32) -> bool {
        self.offset_x >= 0.0
            && self.offset_y >= 0.0
            && self.offset_x + self.width <= source_width as f64
            && self.offset_y + self.height <= source_height as f64
    }

    /// Snap to whole pixels: sizes round to nearest (at least 1), offsets
    /// round and are pulled back so the rectangle stays inside the source.
    pub fn to_pixels(&self, source_width: u32, source_height: u32) -> PixelRect {
        let width = (self.width.round() as u32).clamp(1, source_width.max(1));
        let height = (self.height.round() as u32).clamp(1, source_height.max(1));
        let x = (self.offset_x.max(0.0).round() as u32).min(source_width.saturating_sub(width));
        let y = (self.offset_y.max(0.0).round() as u32).min(source_height.saturating_sub(height));
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }
}

impl PixelRect {
    pub fn is_within(&self, source_width: u32, source_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= source_width as u64
            && self.y as u64 + self.height as u64 <= source_height as u64
    }
}

/// Output size for the upload step: width capped at `max_width`, height
/// scaled proportionally and rounded.
pub fn bounded_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scale = max_width as f64 / width as f64;
    let scaled_height = ((height as f64 * scale).round() as u32).max(1);
    (max_width, scaled_height)
}

pub fn mm_to_px(mm: f64, dpi: u32) -> u32 {
    (mm / MM_PER_INCH * dpi as f64).round().max(0.0) as u32
}
