use foto3x4_contracts::images::EncodedImage;
use foto3x4_contracts::runs::receipts::CropRecord;

use crate::codec::ImageCodec;
use crate::error::PhotoError;
use crate::geometry::{CropRectangle, PixelRect};

/// Quality used when re-encoding a crop.
pub const CROP_QUALITY: f32 = 0.95;

#[derive(Debug, Clone)]
pub struct CropOutcome {
    pub image: EncodedImage,
    pub rectangle: CropRectangle,
    pub pixels: PixelRect,
}

impl CropOutcome {
    pub fn record(&self) -> CropRecord {
        CropRecord {
            offset_x: self.pixels.x,
            offset_y: self.pixels.y,
            width: self.pixels.width,
            height: self.pixels.height,
        }
    }
}

/// Largest centered `ratio` crop of `image`, re-encoded at `quality`.
pub fn crop_to_ratio(
    codec: &dyn ImageCodec,
    image: &EncodedImage,
    ratio: f64,
    quality: f32,
) -> Result<CropOutcome, PhotoError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PhotoError::Input(format!(
            "cannot crop a {}x{} image",
            image.width(),
            image.height()
        )));
    }

    let decoded = codec.decode(image.bytes())?;
    let (width, height) = (decoded.width(), decoded.height());
    let rectangle = CropRectangle::centered(width, height, ratio)?;
    let pixels = rectangle.to_pixels(width, height);
    let cropped = codec.crop(&decoded, pixels)?;
    let encoded = codec.encode_jpeg(&cropped, quality)?;

    Ok(CropOutcome {
        image: encoded,
        rectangle,
        pixels,
    })
}
