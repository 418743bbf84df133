use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MIME_JPEG: &str = "image/jpeg";

/// An encoded bitmap plus the pixel dimensions it decodes to.
///
/// Values are only built by a codec (or a generator that probed its output),
/// so `width`/`height` always describe the buffer. Nothing mutates an image
/// after construction; each pipeline stage produces a new one.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    mime_type: String,
}

impl EncodedImage {
    pub fn from_parts(
        bytes: Vec<u8>,
        width: u32,
        height: u32,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            width,
            height,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Replacement background requested from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundRequest {
    White,
    Blue,
}

impl BackgroundRequest {
    /// Generation order used by the pipeline.
    pub const ALL: [BackgroundRequest; 2] = [BackgroundRequest::White, BackgroundRequest::Blue];

    pub fn as_str(self) -> &'static str {
        match self {
            BackgroundRequest::White => "white",
            BackgroundRequest::Blue => "blue",
        }
    }

    /// sRGB fill used when a background is painted locally.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            BackgroundRequest::White => [255, 255, 255],
            BackgroundRequest::Blue => [30, 99, 200],
        }
    }

    pub fn hex(self) -> String {
        let [r, g, b] = self.rgb();
        format!("#{r:02X}{g:02X}{b:02X}")
    }

    /// Human wording of the colour, used in prompts and status lines.
    pub fn describe(self) -> &'static str {
        match self {
            BackgroundRequest::White => "plain pure white",
            BackgroundRequest::Blue => "plain solid medium blue",
        }
    }
}

impl fmt::Display for BackgroundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackgroundRequest {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(BackgroundRequest::White),
            "blue" => Ok(BackgroundRequest::Blue),
            other => Err(format!("unknown background '{other}' (expected white or blue)")),
        }
    }
}
