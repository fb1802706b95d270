//! Driving the scroll -> settle -> capture loop

use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::TimeoutStage;
use crate::host::PageHost;
use crate::plan::CapturePlan;
use crate::scroll::scroll_to;
use crate::session::Stage;
use crate::{CaptureError, CaptureOptions, Result};

/// Called with [`Stage::CapturingSection`] before each tile
pub type SectionCallback<'a> = &'a (dyn Fn(&Stage) + Send + Sync);

/// One captured viewport and where it belongs on the page
#[derive(Debug, Clone)]
pub struct CaptureTile {
    /// Encoded raster as returned by the host
    pub image_data: Vec<u8>,
    /// Offset actually achieved when the tile was captured
    pub scroll_y: u32,
    pub index: usize,
    pub is_last: bool,
}

/// Sleep for `duration` unless `cancel` fires first.
async fn settle(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CaptureError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Capture every tile of `plan` in order.
///
/// Any failure aborts the whole run; no partial tile list is returned. A
/// viewport capture that outlasts `stage_timeout_ms` fails with
/// `Timeout(Capture)`. The page is scrolled back to the top afterwards
/// whether or not the run succeeded.
pub async fn execute<H: PageHost + ?Sized>(
    host: &mut H,
    plan: &CapturePlan,
    options: &CaptureOptions,
    cancel: &CancellationToken,
    progress: Option<SectionCallback<'_>>,
) -> Result<Vec<CaptureTile>> {
    let result = capture_tiles(host, plan, options, cancel, progress).await;

    if let Err(e) = scroll_to(host, 0).await {
        warn!("Failed to restore scroll position after capture: {}", e);
    }

    result
}

async fn capture_tiles<H: PageHost + ?Sized>(
    host: &mut H,
    plan: &CapturePlan,
    options: &CaptureOptions,
    cancel: &CancellationToken,
    progress: Option<SectionCallback<'_>>,
) -> Result<Vec<CaptureTile>> {
    let total = plan.tile_count();
    let tile_settle = Duration::from_millis(options.tile_settle_ms);
    let capture_timeout = Duration::from_millis(options.stage_timeout_ms);
    let mut tiles = Vec::with_capacity(total);

    for (index, &offset) in plan.offsets.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Capture cancelled before section {} of {}", index + 1, total);
            return Err(CaptureError::Cancelled);
        }
        if let Some(cb) = progress {
            cb(&Stage::CapturingSection { index: index + 1, total });
        }

        let outcome = scroll_to(host, offset).await?;
        if outcome.actual_y != offset {
            debug!(
                "section {}: requested y={} but page settled at y={}",
                index + 1,
                offset,
                outcome.actual_y
            );
        }
        settle(tile_settle, cancel).await?;

        let image_data = match tokio::time::timeout(capture_timeout, host.capture_visible_viewport()).await {
            Ok(Ok(data)) if !data.is_empty() => data,
            Ok(Ok(_)) => {
                return Err(CaptureError::TileCaptureFailed {
                    index,
                    reason: "host returned an empty image".into(),
                })
            }
            Ok(Err(e)) => {
                return Err(CaptureError::TileCaptureFailed {
                    index,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    "section {} of {}: no image after {}ms",
                    index + 1,
                    total,
                    options.stage_timeout_ms
                );
                return Err(CaptureError::Timeout(TimeoutStage::Capture));
            }
        };

        debug!(
            "captured section {} of {} at y={} ({} bytes)",
            index + 1,
            total,
            outcome.actual_y,
            image_data.len()
        );
        tiles.push(CaptureTile {
            image_data,
            scroll_y: outcome.actual_y,
            index,
            is_last: index + 1 == total,
        });
    }

    Ok(tiles)
}
