//! The page host: everything the pipeline needs from a browser tab.
//!
//! Backends implement [`PageHost`] over a real tab (see `async_api` with the
//! `cdp` feature) or over a synthetic page in tests.

use async_trait::async_trait;
use url::Url;

use crate::probe::PageMetrics;
use crate::{CaptureError, Result};

/// Current scroll position and scroll range of the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollState {
    pub scroll_y: u32,
    pub document_scroll_height: u32,
    pub viewport_height: u32,
}

#[async_trait]
pub trait PageHost: Send {
    /// URL of the page to capture, `None` when there is no active tab
    async fn target_url(&mut self) -> Result<Option<String>>;

    /// Document title, used for the download filename
    async fn page_title(&mut self) -> Result<String>;

    /// Resolve once navigation has completed
    async fn wait_for_page_ready(&mut self) -> Result<()>;

    /// Resolve once pending `<img>` loads have finished or errored
    async fn wait_for_images(&mut self) -> Result<()>;

    /// Render the page at `width` CSS pixels and hide scrollbars
    async fn apply_viewport_width(&mut self, width: u32) -> Result<()>;

    /// Undo [`PageHost::apply_viewport_width`]
    async fn restore_page(&mut self) -> Result<()>;

    /// Read raw box and element metrics; forces layout first
    async fn read_metrics(&mut self) -> Result<PageMetrics>;

    /// Set the scroll position; out-of-range values are clamped by the page
    async fn set_scroll_position(&mut self, x: u32, y: u32) -> Result<()>;

    async fn scroll_state(&mut self) -> Result<ScrollState>;

    /// Encoded (PNG or JPEG) raster of whatever is currently visible
    async fn capture_visible_viewport(&mut self) -> Result<Vec<u8>>;
}

const RESTRICTED_SCHEMES: &[&str] = &[
    "chrome",
    "chrome-extension",
    "chrome-search",
    "devtools",
    "edge",
    "about",
    "moz-extension",
    "view-source",
];

/// Reject pages the host is not allowed to script.
pub fn validate_target(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|_| CaptureError::UnsupportedTarget(url.to_string()))?;
    if RESTRICTED_SCHEMES.contains(&parsed.scheme()) {
        return Err(CaptureError::UnsupportedTarget(url.to_string()));
    }
    Ok(())
}
