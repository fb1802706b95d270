//! Capture sessions: one end-to-end capture attempt per call, guarded so a
//! target never runs two at once.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::delivery::{screenshot_filename, Delivery};
use crate::encode::{self, EncodedImage};
use crate::error::{ErrorKind, TimeoutStage};
use crate::executor::{self, CaptureTile, SectionCallback};
use crate::host::{validate_target, PageHost};
use crate::plan::{self, CapturePlan};
use crate::probe::{self, PageDimensions};
use crate::stitch;
use crate::{CaptureError, CaptureOptions, Result};

/// Progress callback invoked on every stage change
pub type ProgressHandler = Arc<dyn Fn(&Stage) + Send + Sync>;

/// User-facing progress stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Preparing,
    Measuring,
    /// 1-based section index
    CapturingSection { index: usize, total: usize },
    Stitching,
    Encoding,
    Delivering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Preparing => f.write_str("Preparing page..."),
            Stage::Measuring => f.write_str("Measuring page dimensions..."),
            Stage::CapturingSection { index, total } => {
                write!(f, "Capturing section {} of {}...", index, total)
            }
            Stage::Stitching => f.write_str("Stitching screenshot..."),
            Stage::Encoding => f.write_str("Encoding image..."),
            Stage::Delivering => f.write_str("Processing and downloading..."),
        }
    }
}

/// Lifecycle of a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Preparing,
    Measuring,
    Planning,
    /// 1-based index of the section being captured
    CapturingTiles { index: usize, total: usize },
    Stitching,
    Encoding,
    Delivering,
    Failed(String),
}

/// Clears the capturing flag on every exit path.
struct CaptureGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CaptureGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::AlreadyInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// State of one capture attempt. Owned by a single `Capturer` call and
/// dropped when it returns.
pub(crate) struct CaptureSession<'a> {
    target_width: u32,
    options: &'a CaptureOptions,
    cancel: CancellationToken,
    state: &'a Mutex<SessionState>,
    progress: Option<&'a ProgressHandler>,
    page_prepared: bool,
    title: String,
    dimensions: Option<PageDimensions>,
    plan: Option<CapturePlan>,
    tiles: Vec<CaptureTile>,
}

impl<'a> CaptureSession<'a> {
    fn new(
        target_width: u32,
        options: &'a CaptureOptions,
        cancel: CancellationToken,
        state: &'a Mutex<SessionState>,
        progress: Option<&'a ProgressHandler>,
    ) -> Self {
        Self {
            target_width,
            options,
            cancel,
            state,
            progress,
            page_prepared: false,
            title: String::new(),
            dimensions: None,
            plan: None,
            tiles: Vec::new(),
        }
    }

    fn set_state(&self, next: SessionState) {
        debug!("capture session -> {:?}", next);
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn notify(&self, stage: Stage) {
        self.report(&stage);
    }

    fn report(&self, stage: &Stage) {
        info!("{}", stage);
        if let Some(cb) = self.progress {
            cb(stage);
        }
    }

    fn on_section(&self, stage: &Stage) {
        if let Stage::CapturingSection { index, total } = *stage {
            self.set_state(SessionState::CapturingTiles { index, total });
        }
        self.report(stage);
    }

    async fn bounded<T, F>(&self, stage: TimeoutStage, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = Duration::from_millis(self.options.stage_timeout_ms);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CaptureError::Cancelled),
            res = tokio::time::timeout(limit, fut) => res.map_err(|_| CaptureError::Timeout(stage))?,
        }
    }

    async fn pause(&self, ms: u64) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CaptureError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
        }
    }

    async fn prepare<H: PageHost + ?Sized>(&mut self, host: &mut H) -> Result<()> {
        self.set_state(SessionState::Preparing);
        self.notify(Stage::Preparing);

        let url = host.target_url().await?.ok_or(CaptureError::NoActiveTarget)?;
        validate_target(&url)?;
        self.title = host.page_title().await.unwrap_or_default();

        self.bounded(TimeoutStage::PageLoad, host.wait_for_page_ready()).await?;

        self.page_prepared = true;
        host.apply_viewport_width(self.target_width).await?;
        self.pause(self.options.stabilization_ms).await?;

        let image_wait = Duration::from_millis(self.options.image_wait_timeout_ms);
        match tokio::time::timeout(image_wait, host.wait_for_images()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Waiting for images failed, continuing: {}", e),
            Err(_) => warn!(
                "Images still loading after {}ms, continuing",
                self.options.image_wait_timeout_ms
            ),
        }

        self.pause(self.options.settle_delay_ms).await
    }

    async fn measure<H: PageHost + ?Sized>(&mut self, host: &mut H) -> Result<PageDimensions> {
        self.set_state(SessionState::Measuring);
        self.notify(Stage::Measuring);

        let metrics = self
            .bounded(TimeoutStage::DimensionAnalysis, async {
                host.read_metrics()
                    .await
                    .map_err(|e| CaptureError::DimensionMeasurementFailed(e.to_string()))
            })
            .await?;
        let dimensions = probe::measure(&metrics)?;
        info!(
            "Page dimensions: {}x{} (viewport {}x{})",
            dimensions.total_width,
            dimensions.total_height,
            dimensions.viewport_width,
            dimensions.viewport_height
        );
        self.dimensions = Some(dimensions);
        Ok(dimensions)
    }

    async fn run<H: PageHost + ?Sized>(&mut self, host: &mut H) -> Result<EncodedImage> {
        self.prepare(host).await?;
        let dimensions = self.measure(host).await?;

        self.set_state(SessionState::Planning);
        let plan = plan::plan(
            dimensions.total_height,
            dimensions.viewport_height,
            self.options.overlap_ratio,
        )?;
        debug!("capture plan: {:?}", plan.offsets);

        self.plan = Some(plan.clone());
        let on_section = |stage: &Stage| self.on_section(stage);
        let on_section: SectionCallback<'_> = &on_section;
        let tiles =
            executor::execute(host, &plan, self.options, &self.cancel, Some(on_section)).await?;
        self.tiles = tiles;

        self.set_state(SessionState::Stitching);
        self.notify(Stage::Stitching);
        let stitched = stitch::stitch(&self.tiles, &dimensions)?;
        self.tiles.clear();

        self.set_state(SessionState::Encoding);
        self.notify(Stage::Encoding);
        encode::encode(&stitched, self.options.jpeg_quality)
    }

    /// Best-effort page restoration; failures are logged only.
    async fn cleanup<H: PageHost + ?Sized>(&mut self, host: &mut H) {
        if self.page_prepared {
            if let Err(e) = host.restore_page().await {
                warn!("Failed to restore page after capture: {}", e);
            }
            self.page_prepared = false;
        }
    }
}

/// Entry point for full-page captures against one host.
///
/// A `Capturer` allows one capture at a time: a second call while one is in
/// flight fails with [`CaptureError::AlreadyInProgress`].
pub struct Capturer<H: PageHost> {
    host: tokio::sync::Mutex<H>,
    capturing: AtomicBool,
    state: Mutex<SessionState>,
    last_run: Mutex<Option<(PageDimensions, CapturePlan)>>,
    last_failure: Mutex<Option<(ErrorKind, String)>>,
    on_progress: Option<ProgressHandler>,
}

impl<H: PageHost> Capturer<H> {
    pub fn new(host: H) -> Self {
        Self {
            host: tokio::sync::Mutex::new(host),
            capturing: AtomicBool::new(false),
            state: Mutex::new(SessionState::Idle),
            last_run: Mutex::new(None),
            last_failure: Mutex::new(None),
            on_progress: None,
        }
    }

    /// Register a callback for progress notifications
    pub fn on_progress<F>(&mut self, cb: F)
    where
        F: Fn(&Stage) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(cb));
    }

    pub fn clear_on_progress(&mut self) {
        self.on_progress = None;
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(SessionState::Idle)
    }

    /// Dimensions and plan of the most recent session that got past planning
    pub fn last_plan(&self) -> Option<(PageDimensions, CapturePlan)> {
        self.last_run.lock().ok().and_then(|l| l.clone())
    }

    /// Kind and message of the most recent failed session, cleared by the next
    /// successful one. A capture rejected with `AlreadyInProgress` never ran a
    /// session and is not recorded.
    pub fn last_failure(&self) -> Option<(ErrorKind, String)> {
        self.last_failure.lock().ok().and_then(|f| f.clone())
    }

    /// Consume the capturer and hand back the host
    pub fn into_host(self) -> H {
        self.host.into_inner()
    }

    /// Capture the whole page rendered at `target_width` and encode it.
    pub async fn capture_full_page(
        &self,
        target_width: u32,
        options: &CaptureOptions,
    ) -> Result<EncodedImage> {
        self.capture_full_page_with_cancel(target_width, options, CancellationToken::new())
            .await
    }

    /// As [`Capturer::capture_full_page`], stopping with
    /// [`CaptureError::Cancelled`] once `cancel` fires.
    pub async fn capture_full_page_with_cancel(
        &self,
        target_width: u32,
        options: &CaptureOptions,
        cancel: CancellationToken,
    ) -> Result<EncodedImage> {
        let _guard = CaptureGuard::acquire(&self.capturing)?;
        self.run_session(target_width, options, cancel, None::<&NoDelivery>)
            .await
            .map(|(image, _)| image)
    }

    /// Capture, then hand the JPEG to `delivery` under the conventional
    /// `screenshot-<title>-<width>px-<timestamp>.jpg` name. Returns the image
    /// and the location reported by the delivery.
    pub async fn capture_and_deliver<D: Delivery + ?Sized>(
        &self,
        target_width: u32,
        options: &CaptureOptions,
        delivery: &D,
    ) -> Result<(EncodedImage, String)> {
        self.capture_and_deliver_with_cancel(target_width, options, delivery, CancellationToken::new())
            .await
    }

    /// As [`Capturer::capture_and_deliver`], stopping with
    /// [`CaptureError::Cancelled`] once `cancel` fires. Nothing is delivered
    /// after cancellation.
    pub async fn capture_and_deliver_with_cancel<D: Delivery + ?Sized>(
        &self,
        target_width: u32,
        options: &CaptureOptions,
        delivery: &D,
        cancel: CancellationToken,
    ) -> Result<(EncodedImage, String)> {
        let _guard = CaptureGuard::acquire(&self.capturing)?;
        let (image, filename) = self
            .run_session(target_width, options, cancel, Some(delivery))
            .await?;
        Ok((image, filename.unwrap_or_default()))
    }

    async fn run_session<D: Delivery + ?Sized>(
        &self,
        target_width: u32,
        options: &CaptureOptions,
        cancel: CancellationToken,
        delivery: Option<&D>,
    ) -> Result<(EncodedImage, Option<String>)> {
        let result = async {
            if target_width == 0 {
                return Err(CaptureError::InvalidConfig("target width must be positive".into()));
            }
            options.validate()?;

            let mut host = self.host.lock().await;
            let mut session = CaptureSession::new(
                target_width,
                options,
                cancel,
                &self.state,
                self.on_progress.as_ref(),
            );
            let outcome = session.run(&mut *host).await;
            session.cleanup(&mut *host).await;
            if let (Some(dims), Some(plan)) = (session.dimensions, session.plan.take()) {
                if let Ok(mut last) = self.last_run.lock() {
                    *last = Some((dims, plan));
                }
            }
            let image = outcome?;

            let filename = match delivery {
                Some(delivery) => {
                    if session.cancel.is_cancelled() {
                        return Err(CaptureError::Cancelled);
                    }
                    session.set_state(SessionState::Delivering);
                    session.notify(Stage::Delivering);
                    let name = screenshot_filename(&session.title, target_width, chrono::Utc::now());
                    Some(delivery.deliver(&image, &name).await?)
                }
                None => None,
            };
            Ok((image, filename))
        }
        .await;

        let failure = match &result {
            Ok(_) => {
                info!("Capture complete");
                None
            }
            Err(e) => {
                warn!("Screenshot capture failed: {}", e);
                self.set_state(SessionState::Failed(e.to_string()));
                Some((e.kind(), e.to_string()))
            }
        };
        if let Ok(mut last) = self.last_failure.lock() {
            *last = failure;
        }
        self.set_state(SessionState::Idle);
        result
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }
}

/// Placeholder delivery type for captures that return the image only
struct NoDelivery;

#[async_trait::async_trait]
impl Delivery for NoDelivery {
    async fn deliver(&self, _image: &EncodedImage, _filename: &str) -> Result<String> {
        Ok(String::new())
    }
}
