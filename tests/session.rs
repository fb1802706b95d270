//! End-to-end capture sessions against the synthetic page

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{row_color, SyntheticHost};
use fullpage_shot::{
    CaptureError, CaptureOptions, Capturer, DirectoryDelivery, ErrorKind, SessionState, Stage,
    TimeoutStage,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn captures_long_page_as_jpeg() {
    let host = SyntheticHost::new(32, 3000, 1000);
    let log = host.log();
    let stages = Arc::new(Mutex::new(Vec::new()));

    let mut capturer = Capturer::new(host);
    let seen = stages.clone();
    capturer.on_progress(move |stage| seen.lock().unwrap().push(stage.clone()));

    let jpeg = capturer
        .capture_full_page(1280, &CaptureOptions::immediate())
        .await
        .unwrap();
    assert_eq!((jpeg.width, jpeg.height), (32, 3000));
    assert_eq!(jpeg.mime_type, "image/jpeg");

    let decoded = image::load_from_memory(&jpeg.bytes).unwrap().to_rgb8();
    assert_eq!(decoded.height(), 3000);
    // lossy, but each band should stay close to the source row colour
    for y in [5u32, 950, 1850, 2990] {
        let want = row_color(y);
        let got = decoded.get_pixel(16, y);
        for c in 0..3 {
            assert!((got[c] as i32 - want[c] as i32).abs() <= 12, "row {}: {:?} vs {:?}", y, got, want);
        }
    }

    let stages = stages.lock().unwrap();
    assert_eq!(stages.first(), Some(&Stage::Preparing));
    assert!(stages.contains(&Stage::CapturingSection { index: 4, total: 4 }));
    assert_eq!(stages.last(), Some(&Stage::Encoding));

    let log = log.lock().unwrap();
    assert_eq!(log.applied_width, Some(1280));
    assert!(log.restored);
    assert_eq!(capturer.state(), SessionState::Idle);
}

#[tokio::test]
async fn off_flow_content_extends_capture() {
    let mut host = SyntheticHost::new(8, 2600, 1000);
    host.flow_height = 1500;
    let capturer = Capturer::new(host);

    let jpeg = capturer
        .capture_full_page(1440, &CaptureOptions::immediate())
        .await
        .unwrap();
    assert_eq!(jpeg.height, 2600);
    let (dims, plan) = capturer.last_plan().unwrap();
    assert_eq!(dims.total_height, 2600);
    assert_eq!(*plan.offsets.last().unwrap(), 1600);
}

#[tokio::test]
async fn repeated_capture_plans_identically() {
    let capturer = Capturer::new(SyntheticHost::new(8, 4321, 768));
    let opts = CaptureOptions::immediate();

    capturer.capture_full_page(1024, &opts).await.unwrap();
    let first = capturer.last_plan().unwrap();
    capturer.capture_full_page(1024, &opts).await.unwrap();
    let second = capturer.last_plan().unwrap();
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_capture_is_rejected_while_first_runs() {
    let gate = Arc::new(Notify::new());
    let mut host = SyntheticHost::new(8, 3000, 1000);
    host.capture_gate = Some(gate.clone());
    let started = host.capture_started.clone();

    let capturer = Arc::new(Capturer::new(host));
    let first = {
        let capturer = capturer.clone();
        tokio::spawn(async move {
            capturer
                .capture_full_page(1440, &CaptureOptions::immediate())
                .await
        })
    };

    started.notified().await;
    assert!(capturer.is_capturing());
    assert_eq!(capturer.state(), SessionState::CapturingTiles { index: 1, total: 4 });

    let err = capturer
        .capture_full_page(1440, &CaptureOptions::immediate())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInProgress);
    assert_eq!(capturer.state(), SessionState::CapturingTiles { index: 1, total: 4 });
    assert_eq!(capturer.last_failure(), None);

    // the state follows each section as its capture starts
    gate.notify_one();
    started.notified().await;
    assert_eq!(capturer.state(), SessionState::CapturingTiles { index: 2, total: 4 });

    // release the remaining captures one by one
    while !first.is_finished() {
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let jpeg = first.await.unwrap().unwrap();
    assert_eq!(jpeg.height, 3000);
    assert!(!capturer.is_capturing());
    assert_eq!(capturer.state(), SessionState::Idle);
    assert_eq!(capturer.last_failure(), None);
}

#[tokio::test]
async fn missing_target_fails_fast() {
    let mut host = SyntheticHost::new(8, 2000, 1000);
    host.url = None;
    let capturer = Capturer::new(host);
    let err = capturer
        .capture_full_page(1440, &CaptureOptions::immediate())
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::NoActiveTarget));
    assert!(!capturer.is_capturing());
}

#[tokio::test]
async fn internal_pages_are_unsupported() {
    let mut host = SyntheticHost::new(8, 2000, 1000);
    host.url = Some("chrome://extensions".into());
    let log = host.log();
    let capturer = Capturer::new(host);
    let err = capturer
        .capture_full_page(1440, &CaptureOptions::immediate())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedTarget);
    assert!(log.lock().unwrap().captures.is_empty());
}

#[tokio::test]
async fn page_that_never_loads_times_out() {
    let mut host = SyntheticHost::new(8, 2000, 1000);
    host.never_ready = true;
    let capturer = Capturer::new(host);
    let opts = CaptureOptions { stage_timeout_ms: 50, ..CaptureOptions::immediate() };

    let err = capturer.capture_full_page(1440, &opts).await.unwrap_err();
    assert!(matches!(err, CaptureError::Timeout(TimeoutStage::PageLoad)));
    assert_eq!(capturer.state(), SessionState::Idle);
}

#[tokio::test]
async fn failed_capture_restores_page() {
    let mut host = SyntheticHost::new(8, 3000, 1000);
    host.fail_capture_at = Some(2);
    let log = host.log();
    let capturer = Capturer::new(host);

    let err = capturer
        .capture_full_page(1440, &CaptureOptions::immediate())
        .await
        .unwrap_err();
    assert_eq!(err.tile_index(), Some(2));
    assert!(log.lock().unwrap().restored);
    assert_eq!(capturer.state(), SessionState::Idle);

    let (kind, message) = capturer.last_failure().unwrap();
    assert_eq!(kind, ErrorKind::TileCaptureFailed);
    assert!(message.starts_with("Failed to capture screenshot section 3"), "{}", message);
    assert_eq!(capturer.into_host().scroll_y, 0);
}

#[tokio::test]
async fn success_clears_previous_failure() {
    let mut host = SyntheticHost::new(8, 2000, 1000);
    // only the very first capture call fails
    host.fail_capture_at = Some(0);
    let capturer = Capturer::new(host);
    let opts = CaptureOptions::immediate();

    capturer.capture_full_page(1440, &opts).await.unwrap_err();
    assert_eq!(
        capturer.last_failure().map(|(kind, _)| kind),
        Some(ErrorKind::TileCaptureFailed)
    );

    capturer.capture_full_page(1440, &opts).await.unwrap();
    assert_eq!(capturer.last_failure(), None);
}

#[tokio::test]
async fn high_density_page_is_captured_at_device_resolution() {
    let host = SyntheticHost::with_pixel_ratio(8, 1500, 600, 2);
    let capturer = Capturer::new(host);

    let jpeg = capturer
        .capture_full_page(1440, &CaptureOptions::immediate())
        .await
        .unwrap();
    assert_eq!((jpeg.width, jpeg.height), (16, 3000));

    let (dims, plan) = capturer.last_plan().unwrap();
    assert_eq!(dims.total_height, 1500);
    assert_eq!(dims.device_pixel_ratio, 2.0);
    assert_eq!(*plan.offsets.last().unwrap(), 900);
}

#[tokio::test]
async fn cancellation_surfaces_cancelled() {
    let host = SyntheticHost::new(8, 3000, 1000);
    let capturer = Capturer::new(host);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = capturer
        .capture_full_page_with_cancel(1440, &CaptureOptions::immediate(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::Cancelled));
    assert!(!capturer.is_capturing());
    assert_eq!(capturer.last_failure().map(|(kind, _)| kind), Some(ErrorKind::Cancelled));
}

#[tokio::test]
async fn cancelled_delivery_writes_nothing() {
    let dir = std::env::temp_dir().join(format!("fullpage-shot-cancel-{}", std::process::id()));
    let host = SyntheticHost::new(8, 3000, 1000);
    let log = host.log();
    let capturer = Capturer::new(host);
    let delivery = DirectoryDelivery::new(&dir);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = capturer
        .capture_and_deliver_with_cancel(1440, &CaptureOptions::immediate(), &delivery, cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::Cancelled));
    assert!(log.lock().unwrap().captures.is_empty());
    assert!(!dir.exists());
    assert!(!capturer.is_capturing());
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let capturer = Capturer::new(SyntheticHost::new(8, 3000, 1000));
    let opts = CaptureOptions { overlap_ratio: 1.0, ..CaptureOptions::immediate() };
    let err = capturer.capture_full_page(1440, &opts).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[tokio::test]
async fn delivers_to_directory_with_conventional_name() {
    let dir = std::env::temp_dir().join(format!("fullpage-shot-delivery-{}", std::process::id()));
    let capturer = Capturer::new(SyntheticHost::new(8, 1500, 1000));
    let delivery = DirectoryDelivery::new(&dir);

    let (jpeg, location) = capturer
        .capture_and_deliver(375, &CaptureOptions::immediate(), &delivery)
        .await
        .unwrap();

    let name = std::path::Path::new(&location)
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string();
    assert!(name.starts_with("screenshot-Synthetic Long Page-375px-"), "{}", name);
    assert!(name.ends_with(".jpg"));
    assert_eq!(std::fs::read(&location).unwrap(), jpeg.bytes);

    std::fs::remove_dir_all(&dir).ok();
}
