//! Synthetic page host shared by the integration tests.
//!
//! The page is a deterministic raster where every row has its own colour, so
//! a correctly stitched capture reproduces it pixel for pixel.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fullpage_shot::probe::{BoxMetrics, ElementExtent, PageMetrics};
use fullpage_shot::{CaptureError, PageHost, Result, ScrollState};
use image::{imageops, ImageFormat, Rgba, RgbaImage};
use tokio::sync::Notify;

pub fn row_color(y: u32) -> Rgba<u8> {
    Rgba([(y % 251) as u8, ((y / 251) % 251) as u8, 97, 255])
}

pub fn render_page(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |_, y| row_color(y))
}

/// What the host observed, readable after the host moved into a `Capturer`
#[derive(Debug, Default)]
pub struct HostLog {
    pub captures: Vec<u32>,
    pub scrolls: Vec<u32>,
    pub applied_width: Option<u32>,
    pub restored: bool,
}

pub struct SyntheticHost {
    pub url: Option<String>,
    pub title: String,
    /// Rendered in device pixels, `pixel_ratio` times the CSS size
    pub page: RgbaImage,
    pub pixel_ratio: u32,
    pub viewport_height: u32,
    /// Height reported by box metrics; an off-flow element covers the rest
    pub flow_height: u32,
    pub scroll_y: u32,
    pub fail_capture_at: Option<usize>,
    pub corrupt_capture_at: Option<usize>,
    pub never_ready: bool,
    /// When set, each capture waits for this before returning
    pub capture_gate: Option<Arc<Notify>>,
    pub capture_started: Arc<Notify>,
    pub log: Arc<Mutex<HostLog>>,
}

impl SyntheticHost {
    pub fn new(width: u32, total_height: u32, viewport_height: u32) -> Self {
        Self::with_pixel_ratio(width, total_height, viewport_height, 1)
    }

    /// A page of the given CSS size that captures at `ratio` device pixels
    /// per CSS pixel.
    pub fn with_pixel_ratio(width: u32, total_height: u32, viewport_height: u32, ratio: u32) -> Self {
        Self {
            url: Some("https://example.test/long-page".to_string()),
            title: "Synthetic: Long Page!".to_string(),
            page: render_page(width * ratio, total_height * ratio),
            pixel_ratio: ratio,
            viewport_height,
            flow_height: total_height,
            scroll_y: 0,
            fail_capture_at: None,
            corrupt_capture_at: None,
            never_ready: false,
            capture_gate: None,
            capture_started: Arc::new(Notify::new()),
            log: Arc::new(Mutex::new(HostLog::default())),
        }
    }

    pub fn log(&self) -> Arc<Mutex<HostLog>> {
        self.log.clone()
    }

    fn css_width(&self) -> u32 {
        self.page.width() / self.pixel_ratio
    }

    fn css_height(&self) -> u32 {
        self.page.height() / self.pixel_ratio
    }

    fn max_scroll(&self) -> u32 {
        self.css_height().saturating_sub(self.viewport_height)
    }
}

#[async_trait]
impl PageHost for SyntheticHost {
    async fn target_url(&mut self) -> Result<Option<String>> {
        Ok(self.url.clone())
    }

    async fn page_title(&mut self) -> Result<String> {
        Ok(self.title.clone())
    }

    async fn wait_for_page_ready(&mut self) -> Result<()> {
        if self.never_ready {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn wait_for_images(&mut self) -> Result<()> {
        Ok(())
    }

    async fn apply_viewport_width(&mut self, width: u32) -> Result<()> {
        self.log.lock().unwrap().applied_width = Some(width);
        Ok(())
    }

    async fn restore_page(&mut self) -> Result<()> {
        self.log.lock().unwrap().restored = true;
        self.scroll_y = 0;
        Ok(())
    }

    async fn read_metrics(&mut self) -> Result<PageMetrics> {
        let w = self.css_width() as f64;
        let flow = self.flow_height as f64;
        let boxes = BoxMetrics {
            scroll_width: w,
            scroll_height: flow,
            offset_width: w,
            offset_height: flow,
            client_width: w,
            client_height: flow,
        };
        Ok(PageMetrics {
            body: boxes,
            document: BoxMetrics { client_height: self.viewport_height as f64, ..boxes },
            viewport_width: w,
            viewport_height: self.viewport_height as f64,
            scroll_x: 0.0,
            scroll_y: self.scroll_y as f64,
            device_pixel_ratio: self.pixel_ratio as f64,
            elements: vec![
                Some(ElementExtent { bottom: 10.0 - self.scroll_y as f64, right: w }),
                None,
                Some(ElementExtent {
                    bottom: self.css_height() as f64 - self.scroll_y as f64,
                    right: w,
                }),
            ],
        })
    }

    async fn set_scroll_position(&mut self, _x: u32, y: u32) -> Result<()> {
        self.scroll_y = y.min(self.max_scroll());
        self.log.lock().unwrap().scrolls.push(y);
        Ok(())
    }

    async fn scroll_state(&mut self) -> Result<ScrollState> {
        Ok(ScrollState {
            scroll_y: self.scroll_y,
            document_scroll_height: self.css_height(),
            viewport_height: self.viewport_height,
        })
    }

    async fn capture_visible_viewport(&mut self) -> Result<Vec<u8>> {
        let index = {
            let mut log = self.log.lock().unwrap();
            log.captures.push(self.scroll_y);
            log.captures.len() - 1
        };
        self.capture_started.notify_one();
        if let Some(gate) = &self.capture_gate {
            gate.notified().await;
        }
        if self.fail_capture_at == Some(index) {
            return Err(CaptureError::Host("captureVisibleTab failed".into()));
        }
        if self.corrupt_capture_at == Some(index) {
            return Ok(b"\x89PNG garbage".to_vec());
        }

        let r = self.pixel_ratio;
        let height = self.viewport_height.min(self.css_height()) * r;
        let view = imageops::crop_imm(&self.page, 0, self.scroll_y * r, self.page.width(), height).to_image();
        let mut buf = Cursor::new(Vec::new());
        view.write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| CaptureError::Host(e.to_string()))?;
        Ok(buf.into_inner())
    }
}
