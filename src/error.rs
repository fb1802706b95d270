//! Error types for the capture pipeline

use std::fmt;

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Pipeline stage a timeout was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    PageLoad,
    DimensionAnalysis,
    Capture,
}

impl fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeoutStage::PageLoad => "page load",
            TimeoutStage::DimensionAnalysis => "dimension analysis",
            TimeoutStage::Capture => "viewport capture",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while capturing a full page
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No page or tab to capture
    #[error("No active tab found")]
    NoActiveTarget,

    /// Restricted or internal page the host cannot script
    #[error("Cannot capture screenshots of browser internal pages: {0}")]
    UnsupportedTarget(String),

    /// The page extent could not be measured
    #[error("Failed to get page dimensions: {0}")]
    DimensionMeasurementFailed(String),

    /// Scrolling the page failed
    #[error("Failed to scroll to position: {0}")]
    ScrollFailed(String),

    /// The host failed to capture one viewport tile
    #[error("Failed to capture screenshot section {}: {reason}", .index + 1)]
    TileCaptureFailed { index: usize, reason: String },

    /// Stitching was attempted with an empty tile list
    #[error("No captures to stitch")]
    NoTilesToStitch,

    /// A captured tile could not be decoded
    #[error("Failed to load screenshot section {}: {reason}", .index + 1)]
    TileDecodeFailed { index: usize, reason: String },

    /// JPEG encoding failed
    #[error("Failed to encode screenshot: {0}")]
    EncodeFailed(String),

    /// Saving the final image failed
    #[error("Download failed: {0}")]
    DeliveryFailed(String),

    /// Another capture is running on the same target
    #[error("Capture already in progress")]
    AlreadyInProgress,

    /// A bounded wait expired
    #[error("Timed out waiting for {0}")]
    Timeout(TimeoutStage),

    /// The capture was cancelled by the caller
    #[error("Capture cancelled")]
    Cancelled,

    /// Invalid options
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Host backend error not attributable to a pipeline step
    #[error("Host error: {0}")]
    Host(String),

    /// Preference store error
    #[error("Preference store error: {0}")]
    Preference(String),
}

/// Stable tag for a [`CaptureError`], suitable for UI mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoActiveTarget,
    UnsupportedTarget,
    DimensionMeasurementFailed,
    ScrollFailed,
    TileCaptureFailed,
    NoTilesToStitch,
    TileDecodeFailed,
    EncodeFailed,
    DeliveryFailed,
    AlreadyInProgress,
    Timeout,
    Cancelled,
    InvalidConfig,
    Host,
    Preference,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::NoActiveTarget => ErrorKind::NoActiveTarget,
            CaptureError::UnsupportedTarget(_) => ErrorKind::UnsupportedTarget,
            CaptureError::DimensionMeasurementFailed(_) => ErrorKind::DimensionMeasurementFailed,
            CaptureError::ScrollFailed(_) => ErrorKind::ScrollFailed,
            CaptureError::TileCaptureFailed { .. } => ErrorKind::TileCaptureFailed,
            CaptureError::NoTilesToStitch => ErrorKind::NoTilesToStitch,
            CaptureError::TileDecodeFailed { .. } => ErrorKind::TileDecodeFailed,
            CaptureError::EncodeFailed(_) => ErrorKind::EncodeFailed,
            CaptureError::DeliveryFailed(_) => ErrorKind::DeliveryFailed,
            CaptureError::AlreadyInProgress => ErrorKind::AlreadyInProgress,
            CaptureError::Timeout(_) => ErrorKind::Timeout,
            CaptureError::Cancelled => ErrorKind::Cancelled,
            CaptureError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CaptureError::Host(_) => ErrorKind::Host,
            CaptureError::Preference(_) => ErrorKind::Preference,
        }
    }

    /// Index of the tile involved, for tile-level failures
    pub fn tile_index(&self) -> Option<usize> {
        match self {
            CaptureError::TileCaptureFailed { index, .. }
            | CaptureError::TileDecodeFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CaptureError {
    fn from(err: anyhow::Error) -> Self {
        CaptureError::Host(err.to_string())
    }
}
