//! Handing the finished JPEG to its destination

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;

use crate::encode::EncodedImage;
use crate::{CaptureError, Result};

const MAX_TITLE_CHARS: usize = 50;

/// Destination for finished screenshots
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Save `image` as `filename`; returns where it ended up
    async fn deliver(&self, image: &EncodedImage, filename: &str) -> Result<String>;
}

/// Keep word characters, whitespace and `-`, truncated to 50 characters.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// `screenshot-<title>-<width>px-<timestamp>.jpg`
pub fn screenshot_filename(title: &str, viewport_width: u32, at: DateTime<Utc>) -> String {
    let title = if title.is_empty() { "screenshot" } else { title };
    format!(
        "screenshot-{}-{}px-{}.jpg",
        sanitize_title(title),
        viewport_width,
        at.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

/// Writes screenshots into a directory
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Delivery for DirectoryDelivery {
    async fn deliver(&self, image: &EncodedImage, filename: &str) -> Result<String> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename == ".." {
            return Err(CaptureError::DeliveryFailed(format!("invalid filename {:?}", filename)));
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CaptureError::DeliveryFailed(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.dir.join(filename);
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| CaptureError::DeliveryFailed(format!("{}: {}", path.display(), e)))?;

        info!("Screenshot saved to {} ({} bytes)", path.display(), image.bytes.len());
        Ok(path.display().to_string())
    }
}
