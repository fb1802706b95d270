//! Page extent measurement.
//!
//! Box-model metrics alone under-report pages whose content is positioned
//! outside normal flow, so the probe also folds in the bottom/right edge of
//! every element in the document.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{CaptureError, Result};

/// Scroll/offset/client sizes of a single box (`document.body` or `<html>`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxMetrics {
    pub scroll_width: f64,
    pub scroll_height: f64,
    pub offset_width: f64,
    pub offset_height: f64,
    pub client_width: f64,
    pub client_height: f64,
}

/// Bounding edges of one element, in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementExtent {
    pub bottom: f64,
    pub right: f64,
}

/// Raw metrics read from the page by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub body: BoxMetrics,
    pub document: BoxMetrics,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    /// `window.devicePixelRatio`; hosts that omit it capture at 1:1
    #[serde(default = "default_pixel_ratio")]
    pub device_pixel_ratio: f64,
    /// One entry per element; `None` when its rect could not be computed.
    #[serde(default)]
    pub elements: Vec<Option<ElementExtent>>,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

/// Measured extent of a page, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub total_width: u32,
    pub total_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Device pixels per CSS pixel in captured tiles
    pub device_pixel_ratio: f64,
}

impl PageDimensions {
    /// Convert a CSS length to device pixels, rounding to the nearest pixel
    pub fn to_device(&self, css: u32) -> u32 {
        (f64::from(css) * self.device_pixel_ratio).round() as u32
    }
}

/// Script evaluated in the page by script-driven hosts. Returns a JSON string
/// that deserializes into [`PageMetrics`].
pub const PROBE_SCRIPT: &str = r#"(function() {
    const body = document.body;
    const html = document.documentElement;
    body.offsetHeight;
    const box = (el) => ({
        scrollWidth: el.scrollWidth, scrollHeight: el.scrollHeight,
        offsetWidth: el.offsetWidth, offsetHeight: el.offsetHeight,
        clientWidth: el.clientWidth, clientHeight: el.clientHeight
    });
    const elements = [];
    document.querySelectorAll('*').forEach(function(el) {
        try {
            const rect = el.getBoundingClientRect();
            elements.push({ bottom: rect.bottom, right: rect.right });
        } catch (e) {
            elements.push(null);
        }
    });
    return JSON.stringify({
        body: box(body),
        document: box(html),
        viewportWidth: window.innerWidth,
        viewportHeight: window.innerHeight,
        scrollX: window.pageXOffset || html.scrollLeft,
        scrollY: window.pageYOffset || html.scrollTop,
        devicePixelRatio: window.devicePixelRatio || 1,
        elements: elements
    });
})()"#;

fn to_px(v: f64) -> u32 {
    if !v.is_finite() || v <= 0.0 {
        return 0;
    }
    v.ceil().min(u32::MAX as f64) as u32
}

/// Combine all candidate extents into [`PageDimensions`].
///
/// Never returns less than one viewport in either direction. Elements whose
/// rect is missing or non-finite are skipped.
pub fn measure(metrics: &PageMetrics) -> Result<PageDimensions> {
    let viewport_width = to_px(metrics.viewport_width);
    let viewport_height = to_px(metrics.viewport_height);
    if viewport_width == 0 || viewport_height == 0 {
        return Err(CaptureError::DimensionMeasurementFailed(format!(
            "viewport is {}x{}",
            metrics.viewport_width, metrics.viewport_height
        )));
    }

    let device_pixel_ratio = if metrics.device_pixel_ratio.is_finite() && metrics.device_pixel_ratio > 0.0 {
        metrics.device_pixel_ratio
    } else {
        1.0
    };

    let scroll_x = if metrics.scroll_x.is_finite() { metrics.scroll_x.max(0.0) } else { 0.0 };
    let scroll_y = if metrics.scroll_y.is_finite() { metrics.scroll_y.max(0.0) } else { 0.0 };

    let mut max_bottom = 0u32;
    let mut max_right = 0u32;
    let mut skipped = 0usize;
    for extent in &metrics.elements {
        match extent {
            Some(e) if e.bottom.is_finite() && e.right.is_finite() => {
                max_bottom = max_bottom.max(to_px(e.bottom + scroll_y));
                max_right = max_right.max(to_px(e.right + scroll_x));
            }
            _ => skipped += 1,
        }
    }

    let b = &metrics.body;
    let d = &metrics.document;
    let heights = [
        b.scroll_height,
        b.offset_height,
        d.scroll_height,
        d.offset_height,
        d.client_height,
    ];
    let widths = [
        b.scroll_width,
        b.offset_width,
        d.scroll_width,
        d.offset_width,
        d.client_width,
    ];

    let total_height = heights
        .iter()
        .map(|h| to_px(*h))
        .fold(max_bottom.max(viewport_height), u32::max);
    let total_width = widths
        .iter()
        .map(|w| to_px(*w))
        .fold(max_right.max(viewport_width), u32::max);

    debug!(
        "measured {}x{} (viewport {}x{}, ratio {}, element bottom {}, {} elements skipped)",
        total_width,
        total_height,
        viewport_width,
        viewport_height,
        device_pixel_ratio,
        max_bottom,
        skipped
    );

    Ok(PageDimensions {
        total_width,
        total_height,
        viewport_width,
        viewport_height,
        device_pixel_ratio,
    })
}
