//! Text on the print sheet: the page title and the footer credit.

use std::fmt;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use rusttype::{point, Font, Scale};

use crate::error::PhotoError;

pub const SHEET_TITLE: &str = "Fotos 3x4";
pub const SHEET_FOOTER: &str = "Gerado via Foto3x4 IA";

/// Environment variable naming a TrueType font for the sheet text.
pub const FONT_ENV: &str = "FOTO3X4_FONT";

/// Sans-serif faces commonly installed on Linux, macOS and Windows.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// A parsed TrueType face used to letter the sheet.
#[derive(Clone)]
pub struct SheetFont {
    font: Font<'static>,
    source: PathBuf,
}

impl fmt::Debug for SheetFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetFont")
            .field("source", &self.source)
            .finish()
    }
}

impl SheetFont {
    pub fn from_file(path: &Path) -> Result<Self, PhotoError> {
        let data = std::fs::read(path).map_err(|err| {
            PhotoError::Input(format!("cannot read font {}: {err}", path.display()))
        })?;
        let font = Font::try_from_vec(data).ok_or_else(|| {
            PhotoError::Input(format!("{} is not a TrueType font", path.display()))
        })?;
        Ok(Self {
            font,
            source: path.to_path_buf(),
        })
    }

    /// Font for the sheet text.
    ///
    /// An `explicit` path, then `FOTO3X4_FONT`, must load. Otherwise the
    /// first readable system face is used, and `None` means the sheet is
    /// rendered without text.
    pub fn discover(explicit: Option<&Path>) -> Result<Option<Self>, PhotoError> {
        if let Some(path) = explicit {
            return Self::from_file(path).map(Some);
        }
        if let Some(path) = crate::non_empty_env(FONT_ENV) {
            return Self::from_file(Path::new(&path)).map(Some);
        }
        Ok(SYSTEM_FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .filter(|path| path.is_file())
            .find_map(|path| Self::from_file(path).ok()))
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Rendered width of `text` at `px` em height.
    pub fn text_width(&self, px: f32, text: &str) -> u32 {
        let scale = Scale::uniform(px);
        let ascent = self.font.v_metrics(scale).ascent;
        self.font
            .layout(text, scale, point(0.0, ascent))
            .filter_map(|glyph| glyph.pixel_bounding_box())
            .map(|bb| bb.max.x.max(0) as u32)
            .max()
            .unwrap_or(0)
    }

    /// Draw `text` horizontally centered on `center_x`, its ascent line at `top`.
    pub fn draw_centered(
        &self,
        sheet: &mut RgbImage,
        text: &str,
        center_x: u32,
        top: u32,
        px: f32,
        color: [u8; 3],
    ) {
        let left = center_x as f32 - self.text_width(px, text) as f32 / 2.0;
        let scale = Scale::uniform(px);
        let baseline = top as f32 + self.font.v_metrics(scale).ascent;

        for glyph in self.font.layout(text, scale, point(left, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let x = gx as i32 + bb.min.x;
                let y = gy as i32 + bb.min.y;
                if x < 0 || y < 0 {
                    return;
                }
                let (x, y) = (x as u32, y as u32);
                if x >= sheet.width() || y >= sheet.height() || coverage <= 0.0 {
                    return;
                }
                let dst = sheet.get_pixel_mut(x, y);
                let alpha = coverage.min(1.0);
                let blended: [u8; 3] = std::array::from_fn(|idx| {
                    (color[idx] as f32 * alpha + dst.0[idx] as f32 * (1.0 - alpha)).round() as u8
                });
                *dst = Rgb(blended);
            });
        }
    }
}
