//! Chrome DevTools Protocol page driver
//!
//! A blocking wrapper over a single `headless_chrome` tab exposing the page
//! primitives the capture pipeline needs. Every page-side operation is a
//! small script evaluated in the page's global context.

use std::sync::Arc;

use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};

use crate::host::ScrollState;
use crate::probe::{PageMetrics, PROBE_SCRIPT};
use crate::{CaptureError, Result, Viewport};

const WAIT_FOR_LOAD_SCRIPT: &str = r#"new Promise(function(resolve) {
    if (document.readyState === 'complete') { resolve(true); return; }
    window.addEventListener('load', function() { resolve(true); }, { once: true });
})"#;

const WAIT_FOR_IMAGES_SCRIPT: &str = r#"new Promise(function(resolve) {
    const pending = Array.from(document.querySelectorAll('img')).filter(function(img) {
        return !img.complete;
    });
    if (pending.length === 0) { resolve(0); return; }
    let remaining = pending.length;
    const done = function() { remaining--; if (remaining <= 0) resolve(pending.length); };
    pending.forEach(function(img) {
        img.addEventListener('load', done, { once: true });
        img.addEventListener('error', done, { once: true });
    });
})"#;

const APPLY_WIDTH_TEMPLATE: &str = r#"(function(targetWidth) {
    const state = window.__fullpageShot || (window.__fullpageShot = {});
    state.scrollX = window.scrollX;
    state.scrollY = window.scrollY;
    window.scrollTo(0, 0);
    if (targetWidth && Math.abs(window.innerWidth - targetWidth) > 50) {
        state.zoom = document.body.style.zoom || '1';
        document.body.style.zoom = String(targetWidth / window.innerWidth);
    }
    if (!document.getElementById('fullpage-shot-hide-scrollbars')) {
        const style = document.createElement('style');
        style.id = 'fullpage-shot-hide-scrollbars';
        style.textContent = '* { scrollbar-width: none !important; -ms-overflow-style: none !important; } ' +
            '*::-webkit-scrollbar { display: none !important; }';
        document.head.appendChild(style);
    }
    return true;
})({{WIDTH}})"#;

const RESTORE_SCRIPT: &str = r#"(function() {
    const state = window.__fullpageShot || {};
    if (state.zoom !== undefined) { document.body.style.zoom = state.zoom; }
    const style = document.getElementById('fullpage-shot-hide-scrollbars');
    if (style) { style.remove(); }
    if (state.scrollX !== undefined && state.scrollY !== undefined) {
        window.scrollTo(state.scrollX, state.scrollY);
    }
    delete window.__fullpageShot;
    return true;
})()"#;

const SCROLL_STATE_SCRIPT: &str = r#"JSON.stringify({
    scrollY: window.scrollY,
    scrollHeight: document.documentElement.scrollHeight,
    innerHeight: window.innerHeight
})"#;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScrollState {
    scroll_y: f64,
    scroll_height: f64,
    inner_height: f64,
}

fn px(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.round() as u32
    } else {
        0
    }
}

/// Blocking driver over one Chrome tab
pub struct CdpPage {
    browser: Browser,
    tab: Arc<Tab>,
}

impl CdpPage {
    /// Launch headless Chrome with a window of `viewport` size
    pub fn launch(viewport: Viewport) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((viewport.width, viewport.height)))
            .build()
            .map_err(|e| CaptureError::Host(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| CaptureError::Host(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| CaptureError::Host(format!("Failed to create tab: {}", e)))?;

        Ok(Self { browser, tab })
    }

    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| CaptureError::Host(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| CaptureError::Host(format!("Wait for navigation failed: {}", e)))?;
        Ok(())
    }

    pub fn url(&self) -> Option<String> {
        let url = self.tab.get_url();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }

    pub fn title(&self) -> Result<String> {
        self.tab
            .get_title()
            .map_err(|e| CaptureError::Host(format!("Failed to get title: {}", e)))
    }

    fn eval(&self, script: &str, await_promise: bool) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, await_promise)
            .map_err(|e| CaptureError::Host(format!("Evaluation failed: {}", e)))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    fn eval_json<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let value = self.eval(script, false)?;
        let raw = value
            .as_str()
            .ok_or_else(|| CaptureError::Host(format!("expected a JSON string, got {}", value)))?;
        serde_json::from_str(raw).map_err(|e| CaptureError::Host(format!("Malformed page response: {}", e)))
    }

    pub fn wait_for_load(&self) -> Result<()> {
        self.eval(WAIT_FOR_LOAD_SCRIPT, true).map(|_| ())
    }

    pub fn wait_for_images(&self) -> Result<()> {
        let pending = self.eval(WAIT_FOR_IMAGES_SCRIPT, true)?;
        debug!("waited for {} pending images", pending);
        Ok(())
    }

    pub fn apply_viewport_width(&self, width: u32) -> Result<()> {
        let script = APPLY_WIDTH_TEMPLATE.replace("{{WIDTH}}", &width.to_string());
        self.eval(&script, false).map(|_| ())
    }

    pub fn restore(&self) -> Result<()> {
        self.eval(RESTORE_SCRIPT, false).map(|_| ())
    }

    pub fn read_metrics(&self) -> Result<PageMetrics> {
        self.eval_json(PROBE_SCRIPT)
    }

    pub fn set_scroll_position(&self, x: u32, y: u32) -> Result<()> {
        let script = format!(
            "window.scrollTo({{ top: {}, left: {}, behavior: 'auto' }}); document.body.offsetHeight; true",
            y, x
        );
        self.eval(&script, false).map(|_| ())
    }

    pub fn scroll_state(&self) -> Result<ScrollState> {
        let raw: RawScrollState = self.eval_json(SCROLL_STATE_SCRIPT)?;
        Ok(ScrollState {
            scroll_y: px(raw.scroll_y),
            document_scroll_height: px(raw.scroll_height),
            viewport_height: px(raw.inner_height),
        })
    }

    /// PNG of the visible viewport
    pub fn capture_viewport(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| CaptureError::Host(format!("Screenshot failed: {}", e)))
    }

    pub fn close(self) -> Result<()> {
        if let Err(e) = self.tab.close(false) {
            warn!("Failed to close tab: {}", e);
        }
        drop(self.browser);
        Ok(())
    }
}
