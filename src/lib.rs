//! Full-page screenshots
//!
//! Captures a whole scrollable web page as a single image: measure the real
//! page extent, scroll through it one viewport at a time, capture each
//! viewport, stitch the tiles together and encode the result as a JPEG.
//!
//! The browser side is abstracted behind [`PageHost`], so the pipeline runs
//! unchanged against a real Chrome tab (the `cdp` feature) or a synthetic
//! page in tests.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # async fn run() -> fullpage_shot::Result<()> {
//! use fullpage_shot::{async_api::ChromeHost, CaptureOptions, Capturer, Viewport};
//!
//! let host = ChromeHost::launch("https://example.com", Viewport { width: 1440, height: 900 }).await?;
//! let capturer = Capturer::new(host);
//! let jpeg = capturer.capture_full_page(1440, &CaptureOptions::default()).await?;
//! std::fs::write("page.jpg", &jpeg.bytes).ok();
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{CaptureError, ErrorKind, Result, TimeoutStage};

pub mod delivery;
pub mod encode;
pub mod executor;
pub mod host;
pub mod plan;
pub mod prefs;
pub mod probe;
pub mod scroll;
pub mod session;
pub mod stitch;

// Chrome DevTools Protocol backend
#[cfg(feature = "cdp")]
pub mod cdp;

// Async host over a worker thread owning the blocking CDP tab
#[cfg(feature = "cdp")]
pub mod async_api;

pub use delivery::{Delivery, DirectoryDelivery};
pub use encode::EncodedImage;
pub use executor::CaptureTile;
pub use host::{PageHost, ScrollState};
pub use plan::CapturePlan;
pub use probe::{PageDimensions, PageMetrics};
pub use session::{Capturer, SessionState, Stage};
pub use stitch::StitchedImage;

/// Tuning for a capture run
///
/// The defaults follow what works on typical pages: a 10% overlap between
/// tiles, half a second for the page to settle after preparation, and a
/// longer wait after every scroll since scroll-triggered rendering (lazy
/// images, sticky headers) shows up as visible seams in the stitched output.
///
/// ```
/// let opts = fullpage_shot::CaptureOptions::default();
/// assert_eq!(opts.jpeg_quality, 95);
/// assert!(opts.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Fraction of the viewport repeated between consecutive tiles, in `[0, 1)`
    pub overlap_ratio: f64,
    /// Wait after preparing the page, before measuring
    pub settle_delay_ms: u64,
    /// Wait after resizing/zooming the page
    pub stabilization_ms: u64,
    /// Wait after each scroll, before capturing the tile
    pub tile_settle_ms: u64,
    /// Upper bound on waiting for pending image loads
    pub image_wait_timeout_ms: u64,
    /// Upper bound on any single awaited host stage
    pub stage_timeout_ms: u64,
    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            overlap_ratio: plan::DEFAULT_OVERLAP_RATIO,
            settle_delay_ms: 500,
            stabilization_ms: 300,
            tile_settle_ms: 750,
            image_wait_timeout_ms: 5000,
            stage_timeout_ms: 15000,
            jpeg_quality: encode::DEFAULT_JPEG_QUALITY,
        }
    }
}

impl CaptureOptions {
    /// Options with every delay set to zero (tests, pre-settled pages)
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            stabilization_ms: 0,
            tile_settle_ms: 0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.overlap_ratio) {
            return Err(CaptureError::InvalidConfig(format!(
                "overlap_ratio {} outside [0, 1)",
                self.overlap_ratio
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CaptureError::InvalidConfig(format!(
                "jpeg_quality {} outside 1..=100",
                self.jpeg_quality
            )));
        }
        if self.stage_timeout_ms == 0 {
            return Err(CaptureError::InvalidConfig("stage_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Browser window size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: prefs::DEFAULT_VIEWPORT_WIDTH,
            height: 900,
        }
    }
}
