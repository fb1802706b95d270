use std::sync::mpsc::{self, Sender};
use std::thread;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::cdp::CdpPage;
use crate::host::{PageHost, ScrollState};
use crate::probe::PageMetrics;
use crate::{CaptureError, Result, Viewport};

enum Command {
    Url(oneshot::Sender<Result<Option<String>>>),
    Title(oneshot::Sender<Result<String>>),
    WaitForLoad(oneshot::Sender<Result<()>>),
    WaitForImages(oneshot::Sender<Result<()>>),
    ApplyWidth(u32, oneshot::Sender<Result<()>>),
    Restore(oneshot::Sender<Result<()>>),
    ReadMetrics(oneshot::Sender<Result<PageMetrics>>),
    Scroll(u32, u32, oneshot::Sender<Result<()>>),
    ScrollState(oneshot::Sender<Result<ScrollState>>),
    Capture(oneshot::Sender<Result<Vec<u8>>>),
    Close(oneshot::Sender<Result<()>>),
}

/// A [`PageHost`] backed by headless Chrome on a dedicated worker thread.
///
/// The worker thread owns the blocking `CdpPage` and executes commands sent
/// from async tasks, so the pipeline can await host calls without blocking
/// the runtime.
pub struct ChromeHost {
    cmd_tx: Sender<Command>,
}

impl ChromeHost {
    /// Launch Chrome with a `viewport`-sized window and open `url`.
    pub async fn launch(url: &str, viewport: Viewport) -> Result<Self> {
        let url = url.to_string();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let page = match CdpPage::launch(viewport) {
                Ok(p) => p,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            if let Err(err) = page.navigate(&url) {
                let _ = init_tx.send(Err(err));
                let _ = page.close();
                return;
            }

            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Url(resp) => {
                        let _ = resp.send(Ok(page.url()));
                    }
                    Command::Title(resp) => {
                        let _ = resp.send(page.title());
                    }
                    Command::WaitForLoad(resp) => {
                        let _ = resp.send(page.wait_for_load());
                    }
                    Command::WaitForImages(resp) => {
                        let _ = resp.send(page.wait_for_images());
                    }
                    Command::ApplyWidth(width, resp) => {
                        let _ = resp.send(page.apply_viewport_width(width));
                    }
                    Command::Restore(resp) => {
                        let _ = resp.send(page.restore());
                    }
                    Command::ReadMetrics(resp) => {
                        let _ = resp.send(page.read_metrics());
                    }
                    Command::Scroll(x, y, resp) => {
                        let _ = resp.send(page.set_scroll_position(x, y));
                    }
                    Command::ScrollState(resp) => {
                        let _ = resp.send(page.scroll_state());
                    }
                    Command::Capture(resp) => {
                        let _ = resp.send(page.capture_viewport());
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(page.close());
                        break;
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|e| CaptureError::Host(format!("Worker init canceled: {}", e)))??;

        Ok(Self { cmd_tx })
    }

    async fn request<T>(
        &self,
        what: &str,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| CaptureError::Host(format!("{}: browser worker has exited", what)))?;
        rx.await
            .map_err(|e| CaptureError::Host(format!("{} canceled: {}", what, e)))?
    }

    /// Shut down the worker and the browser.
    pub async fn close(self) -> Result<()> {
        self.request("Close", Command::Close).await
    }
}

#[async_trait]
impl PageHost for ChromeHost {
    async fn target_url(&mut self) -> Result<Option<String>> {
        self.request("Url", Command::Url).await
    }

    async fn page_title(&mut self) -> Result<String> {
        self.request("Title", Command::Title).await
    }

    async fn wait_for_page_ready(&mut self) -> Result<()> {
        self.request("WaitForLoad", Command::WaitForLoad).await
    }

    async fn wait_for_images(&mut self) -> Result<()> {
        self.request("WaitForImages", Command::WaitForImages).await
    }

    async fn apply_viewport_width(&mut self, width: u32) -> Result<()> {
        self.request("ApplyWidth", |tx| Command::ApplyWidth(width, tx)).await
    }

    async fn restore_page(&mut self) -> Result<()> {
        self.request("Restore", Command::Restore).await
    }

    async fn read_metrics(&mut self) -> Result<PageMetrics> {
        self.request("ReadMetrics", Command::ReadMetrics).await
    }

    async fn set_scroll_position(&mut self, x: u32, y: u32) -> Result<()> {
        self.request("Scroll", |tx| Command::Scroll(x, y, tx)).await
    }

    async fn scroll_state(&mut self) -> Result<ScrollState> {
        self.request("ScrollState", Command::ScrollState).await
    }

    async fn capture_visible_viewport(&mut self) -> Result<Vec<u8>> {
        self.request("Capture", Command::Capture).await
    }
}
