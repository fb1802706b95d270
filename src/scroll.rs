//! Positioning the viewport before each tile

use log::debug;

use crate::host::PageHost;
use crate::{CaptureError, Result};

/// What a scroll request actually achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub requested_y: u32,
    pub actual_y: u32,
    pub max_scroll_y: u32,
}

/// Scroll to `y` and report the achieved offset.
///
/// Requests past the scroll range are clamped to `max_scroll_y`. The caller
/// is responsible for waiting a stabilization delay afterwards.
pub async fn scroll_to<H: PageHost + ?Sized>(host: &mut H, y: u32) -> Result<ScrollOutcome> {
    host.set_scroll_position(0, y)
        .await
        .map_err(|e| CaptureError::ScrollFailed(format!("scrollTo({}): {}", y, e)))?;

    let state = host
        .scroll_state()
        .await
        .map_err(|e| CaptureError::ScrollFailed(format!("reading scroll state: {}", e)))?;

    let max_scroll_y = state.document_scroll_height.saturating_sub(state.viewport_height);
    let outcome = ScrollOutcome {
        requested_y: y,
        actual_y: state.scroll_y.min(max_scroll_y),
        max_scroll_y,
    };
    debug!("scroll result: {:?}", outcome);
    Ok(outcome)
}
