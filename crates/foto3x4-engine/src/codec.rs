use std::io::Cursor;

use foto3x4_contracts::images::{EncodedImage, MIME_JPEG};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader, RgbImage};

use crate::error::PhotoError;
use crate::geometry::PixelRect;

/// Largest surface the codec will allocate (16384 x 16384).
pub const MAX_SURFACE_PIXELS: u64 = 16_384 * 16_384;

/// Decode / resample / encode capability used by the loader, cropper and
/// sheet renderer. Geometry is decided by the callers.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, PhotoError>;

    fn resample(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, PhotoError>;

    fn crop(&self, image: &DynamicImage, rect: PixelRect) -> Result<DynamicImage, PhotoError>;

    /// Encode as JPEG at `quality` in `0.0..=1.0`.
    fn encode_jpeg(&self, image: &DynamicImage, quality: f32) -> Result<EncodedImage, PhotoError>;
}

/// `image`-crate backed codec.
#[derive(Debug, Clone, Copy)]
pub struct RasterCodec {
    filter: FilterType,
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl ImageCodec for RasterCodec {
    /// Decodes and applies any EXIF orientation, so pixels come out upright.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, PhotoError> {
        let (_, mut decoder) = open_decoder(bytes)?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut decoded = DynamicImage::from_decoder(decoder)
            .map_err(|err| PhotoError::Decode(err.to_string()))?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PhotoError::Decode("image has zero dimensions".to_string()));
        }
        decoded.apply_orientation(orientation);
        Ok(decoded)
    }

    fn resample(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, PhotoError> {
        ensure_surface(width, height)?;
        if image.width() == width && image.height() == height {
            return Ok(image.clone());
        }
        Ok(image.resize_exact(width, height, self.filter))
    }

    fn crop(&self, image: &DynamicImage, rect: PixelRect) -> Result<DynamicImage, PhotoError> {
        ensure_surface(rect.width, rect.height)?;
        if !rect.is_within(image.width(), image.height()) {
            return Err(PhotoError::Input(format!(
                "crop {}x{}+{}+{} exceeds {}x{} source",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                image.width(),
                image.height()
            )));
        }
        Ok(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
    }

    fn encode_jpeg(&self, image: &DynamicImage, quality: f32) -> Result<EncodedImage, PhotoError> {
        let rgb = flatten_alpha(image);
        let bytes = encode_rgb_jpeg(&rgb, quality)?;
        Ok(EncodedImage::from_parts(
            bytes,
            rgb.width(),
            rgb.height(),
            MIME_JPEG,
        ))
    }
}

/// Fails with `Canvas` when a `width` x `height` surface cannot be allocated.
pub fn ensure_surface(width: u32, height: u32) -> Result<(), PhotoError> {
    if width == 0 || height == 0 {
        return Err(PhotoError::Canvas(format!(
            "cannot allocate a {width}x{height} surface"
        )));
    }
    if width as u64 * height as u64 > MAX_SURFACE_PIXELS {
        return Err(PhotoError::Canvas(format!(
            "{width}x{height} exceeds the {MAX_SURFACE_PIXELS} pixel surface limit"
        )));
    }
    Ok(())
}

/// Composite any alpha channel over white; JPEG has no transparency.
pub fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let blend = |channel: u8| (channel as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    rgb
}

pub(crate) fn quality_percent(quality: f32) -> Result<u8, PhotoError> {
    if !(0.0..=1.0).contains(&quality) {
        return Err(PhotoError::Input(format!(
            "quality must be between 0.0 and 1.0, got {quality}"
        )));
    }
    Ok(((quality * 100.0).round() as u8).max(1))
}

pub(crate) fn encode_rgb_jpeg(image: &RgbImage, quality: f32) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent(quality)?);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|err| PhotoError::Encode(err.to_string()))?;
    Ok(buffer)
}

fn open_decoder(bytes: &[u8]) -> Result<(ImageFormat, impl ImageDecoder + '_), PhotoError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| PhotoError::Decode(err.to_string()))?;
    let Some(format) = reader.format() else {
        return Err(PhotoError::Decode("unrecognised image format".to_string()));
    };
    let decoder = reader
        .into_decoder()
        .map_err(|err| PhotoError::Decode(err.to_string()))?;
    Ok((format, decoder))
}

/// Whether `orientation` turns the stored raster by a quarter turn.
fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

/// Wrap bytes of unknown provenance after reading the dimensions they
/// display at, EXIF orientation included.
pub fn probe(bytes: Vec<u8>) -> Result<EncodedImage, PhotoError> {
    let (format, mut decoder) = open_decoder(&bytes)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let (stored_width, stored_height) = decoder.dimensions();
    drop(decoder);
    if stored_width == 0 || stored_height == 0 {
        return Err(PhotoError::Decode("image has zero dimensions".to_string()));
    }
    let (width, height) = if swaps_axes(orientation) {
        (stored_height, stored_width)
    } else {
        (stored_width, stored_height)
    };
    Ok(EncodedImage::from_parts(
        bytes,
        width,
        height,
        mime_for_format(format),
    ))
}

pub fn mime_for_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::{ImageEncoder, RgbImage};

    /// APP1 segment holding a big-endian EXIF block whose only tag is
    /// Orientation = `value`.
    fn exif_orientation_segment(value: u8) -> Vec<u8> {
        let mut segment = vec![0xFF, 0xE1, 0x00, 0x22];
        segment.extend_from_slice(b"Exif\0\0");
        segment.extend_from_slice(&[b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
        segment.extend_from_slice(&[0x00, 0x01]);
        segment.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        segment.extend_from_slice(&[0x00, value, 0x00, 0x00]);
        segment.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        segment
    }

    /// Gradient JPEG stored at `width` x `height` carrying an EXIF
    /// orientation tag (6 = display rotated 90 degrees clockwise).
    pub fn oriented_jpeg(width: u32, height: u32, orientation: u8) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                64,
            ]);
        }
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, 90)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        let mut tagged = encoded[..2].to_vec();
        tagged.extend(exif_orientation_segment(orientation));
        tagged.extend_from_slice(&encoded[2..]);
        tagged
    }

    /// Gradient PNG so resampling and cropping have content to work on.
    pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ]);
        }
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }
}
