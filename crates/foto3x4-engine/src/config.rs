use std::path::PathBuf;
use std::time::Duration;

use crate::cropper::CROP_QUALITY;
use crate::error::PhotoError;
use crate::geometry::MAX_UPLOAD_WIDTH;
use crate::loader::UPLOAD_QUALITY;
use crate::sheet::{DEFAULT_COPIES_PER_COLOR, DEFAULT_SHEET_DPI};

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image";

pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const REQUEST_TIMEOUT_RANGE: (f64, f64) = (15.0, 300.0);
const SHEET_DPI_RANGE: (u32, u32) = (72, 1200);
const COPIES_RANGE: (usize, usize) = (1, 12);

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_upload_width: u32,
    pub upload_quality: f32,
    pub crop_quality: f32,
    pub copies_per_color: usize,
    pub provider: String,
    pub model: String,
    pub request_timeout_s: f64,
    pub sheet_dpi: u32,
    /// TrueType face for the sheet title and footer; discovered when unset.
    pub sheet_font: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_width: MAX_UPLOAD_WIDTH,
            upload_quality: UPLOAD_QUALITY,
            crop_quality: CROP_QUALITY,
            copies_per_color: DEFAULT_COPIES_PER_COLOR,
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            sheet_dpi: DEFAULT_SHEET_DPI,
            sheet_font: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        let trimmed = provider.trim();
        if !trimmed.is_empty() {
            self.provider = trimmed.to_ascii_lowercase();
        }
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        let trimmed = model.trim();
        if !trimmed.is_empty() {
            self.model = trimmed.to_string();
        }
        self
    }

    pub fn with_request_timeout(mut self, seconds: f64) -> Self {
        self.request_timeout_s = if seconds.is_finite() {
            seconds.clamp(REQUEST_TIMEOUT_RANGE.0, REQUEST_TIMEOUT_RANGE.1)
        } else {
            DEFAULT_REQUEST_TIMEOUT_S
        };
        self
    }

    pub fn with_copies(mut self, copies: usize) -> Self {
        self.copies_per_color = copies.clamp(COPIES_RANGE.0, COPIES_RANGE.1);
        self
    }

    pub fn with_sheet_dpi(mut self, dpi: u32) -> Self {
        self.sheet_dpi = dpi.clamp(SHEET_DPI_RANGE.0, SHEET_DPI_RANGE.1);
        self
    }

    pub fn with_sheet_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.sheet_font = Some(path.into());
        self
    }

    pub fn with_max_upload_width(mut self, width: u32) -> Self {
        self.max_upload_width = width.max(1);
        self
    }

    /// Clamped request timeout; a non-finite value falls back to the default.
    pub fn request_timeout(&self) -> Duration {
        let seconds = if self.request_timeout_s.is_finite() {
            self.request_timeout_s
        } else {
            DEFAULT_REQUEST_TIMEOUT_S
        };
        Duration::from_secs_f64(seconds.clamp(REQUEST_TIMEOUT_RANGE.0, REQUEST_TIMEOUT_RANGE.1))
    }

    pub fn validate(&self) -> Result<(), PhotoError> {
        for (name, quality) in [
            ("upload quality", self.upload_quality),
            ("crop quality", self.crop_quality),
        ] {
            if !(0.0..=1.0).contains(&quality) {
                return Err(PhotoError::Input(format!(
                    "{name} must be between 0.0 and 1.0, got {quality}"
                )));
            }
        }
        if self.max_upload_width == 0 {
            return Err(PhotoError::Input("maximum upload width must be > 0".to_string()));
        }
        if !self.request_timeout_s.is_finite() {
            return Err(PhotoError::Input(format!(
                "request timeout must be a finite number of seconds, got {}",
                self.request_timeout_s
            )));
        }
        Ok(())
    }
}
