//! Compositing captured tiles into one page-sized image

use image::{imageops, Rgba, RgbaImage};
use log::debug;

use crate::executor::CaptureTile;
use crate::probe::PageDimensions;
use crate::{CaptureError, Result};

pub(crate) const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// The composited page, `viewport_width x total_height` in device pixels
#[derive(Debug, Clone)]
pub struct StitchedImage {
    canvas: RgbaImage,
}

impl StitchedImage {
    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_inner(self) -> RgbaImage {
        self.canvas
    }
}

impl From<RgbaImage> for StitchedImage {
    fn from(canvas: RgbaImage) -> Self {
        Self { canvas }
    }
}

/// Draw `tiles` onto a white canvas sized to the page.
///
/// Tiles arrive in device pixels while offsets are CSS pixels, so the canvas
/// and every draw offset are scaled by the page's device pixel ratio. Tiles
/// are drawn in ascending offset order so later tiles win in overlap
/// bands. The last tile is pulled up so it ends flush with the canvas bottom.
/// Every tile is decoded before drawing starts; a single undecodable tile
/// fails the whole stitch.
pub fn stitch(tiles: &[CaptureTile], dimensions: &PageDimensions) -> Result<StitchedImage> {
    if tiles.is_empty() {
        return Err(CaptureError::NoTilesToStitch);
    }
    if dimensions.viewport_width == 0 || dimensions.total_height == 0 {
        return Err(CaptureError::DimensionMeasurementFailed(format!(
            "cannot stitch onto a {}x{} canvas",
            dimensions.viewport_width, dimensions.total_height
        )));
    }

    let mut ordered: Vec<&CaptureTile> = tiles.iter().collect();
    ordered.sort_by_key(|t| (t.scroll_y, t.index));

    let decoded = ordered
        .iter()
        .map(|tile| {
            image::load_from_memory(&tile.image_data)
                .map(|img| img.to_rgba8())
                .map_err(|e| CaptureError::TileDecodeFailed {
                    index: tile.index,
                    reason: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let canvas_width = dimensions.to_device(dimensions.viewport_width).max(1);
    let total_height = dimensions.to_device(dimensions.total_height).max(1);
    let mut canvas = RgbaImage::from_pixel(canvas_width, total_height, WHITE);
    debug!(
        "Creating canvas: {}x{} for {} captures (pixel ratio {})",
        canvas.width(),
        canvas.height(),
        decoded.len(),
        dimensions.device_pixel_ratio
    );

    let last = decoded.len() - 1;
    for (position, (tile, img)) in ordered.iter().zip(&decoded).enumerate() {
        let mut y = i64::from(dimensions.to_device(tile.scroll_y));
        if position == last {
            y = y.min(i64::from(total_height) - i64::from(img.height()));
        }
        debug!(
            "Drawing capture {} at y={}, image size: {}x{}",
            tile.index + 1,
            y,
            img.width(),
            img.height()
        );
        imageops::overlay(&mut canvas, img, 0, y);
    }

    Ok(StitchedImage { canvas })
}
