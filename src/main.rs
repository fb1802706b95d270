use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fullpage_shot::prefs::{self, JsonFilePreferenceStore};
use fullpage_shot::CaptureOptions;

/// Capture a whole web page as one stitched JPEG
#[derive(Parser, Debug)]
#[command(name = "fullpage-shot", version, about)]
struct Cli {
    /// Page to capture
    url: String,

    /// Viewport width in CSS pixels (defaults to the last width used)
    #[arg(long)]
    width: Option<u32>,

    /// Browser window height; each tile is one window tall
    #[arg(long, default_value_t = 900)]
    height: u32,

    /// Fraction of each tile repeated in the next, in [0, 1)
    #[arg(long)]
    overlap: Option<f64>,

    /// JPEG quality, 1-100
    #[arg(long)]
    quality: Option<u8>,

    /// Directory the screenshot is written to
    #[arg(long, short, default_value = ".")]
    out: PathBuf,

    /// JSON file with capture options
    #[arg(long)]
    options: Option<PathBuf>,

    /// Preferences file remembering the last width
    #[arg(long, default_value = ".fullpage-shot.json")]
    prefs: PathBuf,
}

fn load_options(cli: &Cli) -> Result<CaptureOptions> {
    let mut options = match &cli.options {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read options file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse options file {}", path.display()))?
        }
        None => CaptureOptions::default(),
    };
    if let Some(overlap) = cli.overlap {
        options.overlap_ratio = overlap;
    }
    if let Some(quality) = cli.quality {
        options.jpeg_quality = quality;
    }
    options.validate()?;
    Ok(options)
}

#[cfg(feature = "cdp")]
async fn run(cli: Cli) -> Result<()> {
    use fullpage_shot::async_api::ChromeHost;
    use fullpage_shot::{Capturer, DirectoryDelivery, Viewport};

    let options = load_options(&cli)?;
    let store = JsonFilePreferenceStore::new(&cli.prefs);
    let width = cli.width.unwrap_or_else(|| prefs::load_viewport_width(&store));
    prefs::save_viewport_width(&store, width)?;

    log::info!("Capturing {} at {}px", cli.url, width);
    let host = ChromeHost::launch(&cli.url, Viewport { width, height: cli.height })
        .await
        .context("Failed to start browser")?;

    let mut capturer = Capturer::new(host);
    capturer.on_progress(|stage| eprintln!("{}", stage));

    let delivery = DirectoryDelivery::new(&cli.out);
    let result = capturer.capture_and_deliver(width, &options, &delivery).await;
    capturer.into_host().close().await.ok();

    let (image, location) = result?;
    println!("{} ({}x{})", location, image.width, image.height);
    Ok(())
}

#[cfg(not(feature = "cdp"))]
async fn run(cli: Cli) -> Result<()> {
    load_options(&cli)?;
    let store = JsonFilePreferenceStore::new(&cli.prefs);
    let width = cli.width.unwrap_or_else(|| prefs::load_viewport_width(&store));
    anyhow::bail!(
        "cannot capture {} at {}px: built without a browser backend (rebuild with --features cdp)",
        cli.url,
        width
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run(Cli::parse()).await
}
