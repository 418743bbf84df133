use std::io::Cursor;

use foto3x4_contracts::images::{BackgroundRequest, EncodedImage};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;

use super::{background_prompt, BackgroundGenerator, GenerationOutput};
use crate::codec::{flatten_alpha, probe};
use crate::error::GenerationError;
use crate::map_object;

/// Offline generator: centers the portrait on a square canvas painted with
/// the requested colour and returns it as PNG.
///
/// The square output is deliberately not 3:4 so the cropper has work to do.
pub struct DryrunProvider;

impl DryrunProvider {
    fn fail(message: impl Into<String>) -> GenerationError {
        GenerationError::UnexpectedResponse {
            provider: "dryrun".to_string(),
            message: message.into(),
        }
    }
}

impl BackgroundGenerator for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(
        &self,
        image: &EncodedImage,
        background: BackgroundRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let decoded = image::load_from_memory(image.bytes())
            .map_err(|err| Self::fail(format!("input decode failed: {err}")))?;
        let portrait = flatten_alpha(&decoded);
        let side = portrait.width().max(portrait.height());
        let mut canvas = RgbImage::from_pixel(side, side, Rgb(background.rgb()));
        let x = (side - portrait.width()) / 2;
        let y = (side - portrait.height()) / 2;
        image::imageops::replace(&mut canvas, &portrait, x as i64, y as i64);

        let mut bytes = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| Self::fail(format!("encode failed: {err}")))?;
        let generated = probe(bytes).map_err(|err| Self::fail(err.to_string()))?;

        Ok(GenerationOutput {
            image: generated,
            prompt: background_prompt(background),
            model: None,
            provider_request: map_object(json!({
                "endpoint": "dryrun-native",
                "background": background,
                "input": {
                    "width": image.width(),
                    "height": image.height(),
                    "mime_type": image.mime_type(),
                },
            })),
            provider_response: map_object(json!({
                "status": "ok",
                "width": side,
                "height": side,
            })),
            warnings: Vec::new(),
        })
    }
}
