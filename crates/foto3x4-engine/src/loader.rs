use std::path::Path;

use foto3x4_contracts::images::EncodedImage;

use crate::codec::ImageCodec;
use crate::error::PhotoError;
use crate::geometry::bounded_dimensions;

/// Quality used when re-encoding an upload.
pub const UPLOAD_QUALITY: f32 = 0.8;

/// Decode `bytes`, shrink to `max_width` when wider, and re-encode as JPEG.
///
/// EXIF orientation is applied before measuring, so the bound is taken on
/// the upright picture. A surface that cannot be allocated is reported as a
/// decode failure, since the upload could not be read into pixels.
pub fn load(
    codec: &dyn ImageCodec,
    bytes: &[u8],
    max_width: u32,
    quality: f32,
) -> Result<EncodedImage, PhotoError> {
    if bytes.is_empty() {
        return Err(PhotoError::Input("no image data".to_string()));
    }
    if max_width == 0 {
        return Err(PhotoError::Input("maximum width must be > 0".to_string()));
    }

    let decoded = codec.decode(bytes)?;
    let (width, height) = bounded_dimensions(decoded.width(), decoded.height(), max_width);
    let resized = codec
        .resample(&decoded, width, height)
        .map_err(surface_as_decode)?;
    codec.encode_jpeg(&resized, quality).map_err(surface_as_decode)
}

fn surface_as_decode(err: PhotoError) -> PhotoError {
    match err {
        PhotoError::Canvas(detail) => PhotoError::Decode(detail),
        other => other,
    }
}

pub fn load_file(
    codec: &dyn ImageCodec,
    path: &Path,
    max_width: u32,
    quality: f32,
) -> Result<EncodedImage, PhotoError> {
    let bytes = std::fs::read(path)
        .map_err(|err| PhotoError::Input(format!("cannot read {}: {err}", path.display())))?;
    load(codec, &bytes, max_width, quality)
}
