//! Print sheet: sequencing of copies, grid geometry and rasterisation.

use std::path::Path;

use foto3x4_contracts::images::{BackgroundRequest, EncodedImage};
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgb, RgbImage};

use crate::codec::{ensure_surface, flatten_alpha, quality_percent, ImageCodec};
use crate::error::PhotoError;
use crate::geometry::{mm_to_px, CropRectangle, PixelRect};
use crate::lettering::{SheetFont, SHEET_FOOTER, SHEET_TITLE};

pub const DEFAULT_COPIES_PER_COLOR: usize = 4;
pub const DEFAULT_SHEET_DPI: u32 = 300;

const BORDER_RGB: [u8; 3] = [229, 231, 235];
/// Cut marks darken the photo like 20% black.
const CUT_MARK_SHADE: f32 = 0.8;
const CUT_MARK_LEG_MM: f64 = 2.0;
const SHEET_QUALITY: f32 = 0.95;
const TITLE_EM_MM: f64 = 7.0;
const TITLE_RGB: [u8; 3] = [17, 24, 39];
const FOOTER_EM_MM: f64 = 3.5;
const FOOTER_RGB: [u8; 3] = [107, 114, 128];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintSheetEntry<'a> {
    pub image: &'a EncodedImage,
    pub tag: BackgroundRequest,
}

/// `copies` blue entries followed by `copies` white entries; absent colours
/// are skipped.
pub fn compose<'a>(
    white: Option<&'a EncodedImage>,
    blue: Option<&'a EncodedImage>,
    copies: usize,
) -> Vec<PrintSheetEntry<'a>> {
    let mut entries = Vec::with_capacity(copies * 2);
    for (image, tag) in [
        (blue, BackgroundRequest::Blue),
        (white, BackgroundRequest::White),
    ] {
        if let Some(image) = image {
            entries.extend(std::iter::repeat(PrintSheetEntry { image, tag }).take(copies));
        }
    }
    entries
}

/// Physical description of the sheet, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetGeometry {
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub cell_width_mm: f64,
    pub cell_height_mm: f64,
    pub gap_mm: f64,
    pub margin_mm: f64,
    /// Space above the grid for the title.
    pub title_band_mm: f64,
    /// Space below the grid for the footer.
    pub footer_band_mm: f64,
    pub columns: usize,
    pub dpi: u32,
}

impl Default for SheetGeometry {
    /// A4 portrait, 4 columns of 30mm x 40mm photos under a title.
    fn default() -> Self {
        Self {
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            cell_width_mm: 30.0,
            cell_height_mm: 40.0,
            gap_mm: 4.0,
            margin_mm: 10.0,
            title_band_mm: 10.0,
            footer_band_mm: 6.0,
            columns: 4,
            dpi: DEFAULT_SHEET_DPI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub page_width_px: u32,
    pub page_height_px: u32,
    pub cell_width_px: u32,
    pub cell_height_px: u32,
    pub cells: Vec<PixelRect>,
    /// Top edge of the title band.
    pub title_top_px: u32,
    /// Top edge of the footer band.
    pub footer_top_px: u32,
}

impl SheetLayout {
    pub fn rows(&self, columns: usize) -> usize {
        self.cells.len().div_ceil(columns.max(1))
    }
}

impl SheetGeometry {
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    fn grid_width_mm(&self) -> f64 {
        let columns = self.columns as f64;
        columns * self.cell_width_mm + (columns - 1.0).max(0.0) * self.gap_mm
    }

    fn grid_top_mm(&self) -> f64 {
        self.margin_mm + self.title_band_mm
    }

    fn rows_per_page(&self) -> usize {
        let usable = self.page_height_mm - 2.0 * self.margin_mm - self.title_band_mm
            - self.footer_band_mm
            + self.gap_mm;
        (usable / (self.cell_height_mm + self.gap_mm)).floor().max(0.0) as usize
    }

    /// Number of photos that fit on one page.
    pub fn capacity(&self) -> usize {
        if self.grid_width_mm() > self.page_width_mm - 2.0 * self.margin_mm {
            return 0;
        }
        self.columns * self.rows_per_page()
    }

    /// Cell rectangles for `count` photos, filled row by row from the top.
    pub fn layout(&self, count: usize) -> Result<SheetLayout, PhotoError> {
        if self.columns == 0 || self.dpi == 0 {
            return Err(PhotoError::Input(
                "sheet needs at least one column and a positive dpi".to_string(),
            ));
        }
        let capacity = self.capacity();
        if count > capacity {
            return Err(PhotoError::Input(format!(
                "{count} photos do not fit on one sheet (capacity {capacity})"
            )));
        }

        let left_mm = (self.page_width_mm - self.grid_width_mm()) / 2.0;
        let cell_width_px = mm_to_px(self.cell_width_mm, self.dpi);
        let cell_height_px = mm_to_px(self.cell_height_mm, self.dpi);
        let cells = (0..count)
            .map(|idx| {
                let col = (idx % self.columns) as f64;
                let row = (idx / self.columns) as f64;
                PixelRect {
                    x: mm_to_px(left_mm + col * (self.cell_width_mm + self.gap_mm), self.dpi),
                    y: mm_to_px(
                        self.grid_top_mm() + row * (self.cell_height_mm + self.gap_mm),
                        self.dpi,
                    ),
                    width: cell_width_px,
                    height: cell_height_px,
                }
            })
            .collect();

        Ok(SheetLayout {
            page_width_px: mm_to_px(self.page_width_mm, self.dpi),
            page_height_px: mm_to_px(self.page_height_mm, self.dpi),
            cell_width_px,
            cell_height_px,
            cells,
            title_top_px: mm_to_px(self.margin_mm, self.dpi),
            footer_top_px: mm_to_px(
                self.page_height_mm - self.margin_mm - self.footer_band_mm,
                self.dpi,
            ),
        })
    }
}

/// Rasterise `entries` onto a white page.
///
/// Each photo fills its cell (center crop to the cell ratio, then resample),
/// gets a hairline border and four corner cut marks. With a `font`, the
/// title is lettered above the grid and the footer credit below it; without
/// one both bands stay blank.
pub fn render_sheet(
    codec: &dyn ImageCodec,
    entries: &[PrintSheetEntry<'_>],
    geometry: &SheetGeometry,
    font: Option<&SheetFont>,
) -> Result<RgbImage, PhotoError> {
    let layout = geometry.layout(entries.len())?;
    ensure_surface(layout.page_width_px, layout.page_height_px)?;
    let mut sheet = RgbImage::from_pixel(
        layout.page_width_px,
        layout.page_height_px,
        Rgb([255, 255, 255]),
    );

    let cell_ratio = layout.cell_width_px as f64 / layout.cell_height_px as f64;
    let mark_len = mm_to_px(CUT_MARK_LEG_MM, geometry.dpi).max(2);
    let mut tiles: Vec<(&EncodedImage, RgbImage)> = Vec::new();

    for (entry, cell) in entries.iter().zip(layout.cells.iter()) {
        let cached = tiles
            .iter()
            .position(|(image, _)| std::ptr::eq(*image, entry.image));
        let idx = match cached {
            Some(idx) => idx,
            None => {
                let tile = fill_tile(
                    codec,
                    entry.image,
                    cell_ratio,
                    layout.cell_width_px,
                    layout.cell_height_px,
                )?;
                tiles.push((entry.image, tile));
                tiles.len() - 1
            }
        };
        image::imageops::replace(&mut sheet, &tiles[idx].1, cell.x as i64, cell.y as i64);
        draw_border(&mut sheet, cell);
        draw_cut_marks(&mut sheet, cell, mark_len);
    }

    if let Some(font) = font {
        let center_x = layout.page_width_px / 2;
        font.draw_centered(
            &mut sheet,
            SHEET_TITLE,
            center_x,
            layout.title_top_px,
            mm_to_px(TITLE_EM_MM, geometry.dpi) as f32,
            TITLE_RGB,
        );
        font.draw_centered(
            &mut sheet,
            SHEET_FOOTER,
            center_x,
            layout.footer_top_px + mm_to_px(geometry.footer_band_mm - FOOTER_EM_MM, geometry.dpi),
            mm_to_px(FOOTER_EM_MM, geometry.dpi) as f32,
            FOOTER_RGB,
        );
    }

    Ok(sheet)
}

fn fill_tile(
    codec: &dyn ImageCodec,
    image: &EncodedImage,
    cell_ratio: f64,
    width: u32,
    height: u32,
) -> Result<RgbImage, PhotoError> {
    let decoded = codec.decode(image.bytes())?;
    let cover = CropRectangle::centered(decoded.width(), decoded.height(), cell_ratio)?
        .to_pixels(decoded.width(), decoded.height());
    let cropped = codec.crop(&decoded, cover)?;
    let resized = codec.resample(&cropped, width, height)?;
    Ok(flatten_alpha(&resized))
}

fn draw_border(sheet: &mut RgbImage, cell: &PixelRect) {
    let right = cell.x + cell.width - 1;
    let bottom = cell.y + cell.height - 1;
    for x in cell.x..=right {
        put_if_inside(sheet, x, cell.y, BORDER_RGB);
        put_if_inside(sheet, x, bottom, BORDER_RGB);
    }
    for y in cell.y..=bottom {
        put_if_inside(sheet, cell.x, y, BORDER_RGB);
        put_if_inside(sheet, right, y, BORDER_RGB);
    }
}

fn draw_cut_marks(sheet: &mut RgbImage, cell: &PixelRect, len: u32) {
    let len = len.min(cell.width).min(cell.height);
    let right = cell.x + cell.width - 1;
    let bottom = cell.y + cell.height - 1;
    for step in 0..len {
        // top-left
        shade(sheet, cell.x + step, cell.y);
        shade(sheet, cell.x, cell.y + step);
        // top-right
        shade(sheet, right - step, cell.y);
        shade(sheet, right, cell.y + step);
        // bottom-left
        shade(sheet, cell.x + step, bottom);
        shade(sheet, cell.x, bottom - step);
        // bottom-right
        shade(sheet, right - step, bottom);
        shade(sheet, right, bottom - step);
    }
}

fn put_if_inside(sheet: &mut RgbImage, x: u32, y: u32, rgb: [u8; 3]) {
    if x < sheet.width() && y < sheet.height() {
        sheet.put_pixel(x, y, Rgb(rgb));
    }
}

fn shade(sheet: &mut RgbImage, x: u32, y: u32) {
    if x < sheet.width() && y < sheet.height() {
        let pixel = sheet.get_pixel_mut(x, y);
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as f32 * CUT_MARK_SHADE).round() as u8;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Jpeg,
    Png,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        if ext == "png" {
            SheetFormat::Png
        } else {
            SheetFormat::Jpeg
        }
    }
}

/// Encode the sheet; JPEG output records `dpi` so it prints at physical size.
pub fn encode_sheet(sheet: &RgbImage, dpi: u32, format: SheetFormat) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    match format {
        SheetFormat::Jpeg => {
            let mut encoder =
                JpegEncoder::new_with_quality(&mut buffer, quality_percent(SHEET_QUALITY)?);
            encoder.set_pixel_density(PixelDensity::dpi(dpi.min(u16::MAX as u32) as u16));
            encoder
                .write_image(
                    sheet.as_raw(),
                    sheet.width(),
                    sheet.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|err| PhotoError::Encode(err.to_string()))?;
        }
        SheetFormat::Png => {
            PngEncoder::new(&mut buffer)
                .write_image(
                    sheet.as_raw(),
                    sheet.width(),
                    sheet.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|err| PhotoError::Encode(err.to_string()))?;
        }
    }
    Ok(buffer)
}
