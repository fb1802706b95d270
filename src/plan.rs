//! Tiling a page into viewport-sized capture offsets

use crate::{CaptureError, Result};

/// Overlap between consecutive tiles when none is configured
pub const DEFAULT_OVERLAP_RATIO: f64 = 0.10;

/// Ordered scroll offsets covering a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    pub offsets: Vec<u32>,
    pub overlap_px: u32,
    pub viewport_height: u32,
    pub total_height: u32,
}

impl CapturePlan {
    pub fn tile_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_single_tile(&self) -> bool {
        self.offsets.len() == 1
    }
}

/// Compute the tile offsets for a page of `total_height` seen through a
/// viewport of `viewport_height`.
///
/// Intermediate tiles advance by `viewport_height - overlap`; the final tile
/// is always placed at `total_height - viewport_height` so the page bottom is
/// captured flush.
pub fn plan(total_height: u32, viewport_height: u32, overlap_ratio: f64) -> Result<CapturePlan> {
    if viewport_height == 0 {
        return Err(CaptureError::InvalidConfig("viewport height must be positive".into()));
    }
    if !(0.0..1.0).contains(&overlap_ratio) {
        return Err(CaptureError::InvalidConfig(format!(
            "overlap ratio {} outside [0, 1)",
            overlap_ratio
        )));
    }

    if total_height <= viewport_height {
        return Ok(CapturePlan {
            offsets: vec![0],
            overlap_px: 0,
            viewport_height,
            total_height,
        });
    }

    let overlap_px = (viewport_height as f64 * overlap_ratio).floor() as u32;
    let step = viewport_height - overlap_px;
    let scrollable = total_height - viewport_height;
    let tile_count = (scrollable.div_ceil(step) as usize + 1).max(1);

    let mut offsets: Vec<u32> = (0..tile_count - 1).map(|i| i as u32 * step).collect();
    offsets.push(scrollable);

    Ok(CapturePlan {
        offsets,
        overlap_px,
        viewport_height,
        total_height,
    })
}
