//! Umbra - capture covered windows and read their shadow text

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn, Level};

use umbra_capture::{native_backend, WindowLocator};
use umbra_core::colored_logger::{init_component_logger, Component};
use umbra_core::{Config, Screenshot};
use umbra_ocr::OcrThreshold;

#[derive(Parser)]
#[command(name = "umbra")]
#[command(about = "Capture window regions, even when covered, and read faint text from them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    target: TargetArgs,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Named profile from the configuration file
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Window selection; overrides the configuration file's [target]
#[derive(Args)]
struct TargetArgs {
    /// Exact window title
    #[arg(long, global = true)]
    title: Option<String>,

    /// Exact window class name
    #[arg(long, global = true)]
    class: Option<String>,

    /// Exact title of a child window to use as the coordinate origin
    #[arg(long, global = true)]
    child_title: Option<String>,

    /// Exact class name of a child window to use as the coordinate origin
    #[arg(long, global = true)]
    child_class: Option<String>,
}

/// Region in the target's client coordinates
#[derive(Args, Clone, Copy)]
struct RegionArgs {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

#[derive(Subcommand)]
enum Commands {
    /// List visible top-level windows
    List,

    /// Capture a region to BMP files
    Bmp {
        #[command(flatten)]
        region: RegionArgs,

        /// Output file; numbered when repeating
        #[arg(short, long, default_value = "screenshot.bmp")]
        out: PathBuf,

        /// Number of captures
        #[arg(short, long, default_value = "1")]
        repeat: u32,

        /// Delay between captures in milliseconds
        #[arg(short, long, default_value = "3000")]
        interval_ms: u64,
    },

    /// Read shadow text in a region
    Ocr {
        #[command(flatten)]
        region: RegionArgs,

        /// Sensitivity 0-255; higher admits fainter text
        #[arg(short, long)]
        threshold: Option<u8>,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let component = match cli.command {
        Commands::List => Component::Main,
        Commands::Bmp { .. } => Component::Capture,
        Commands::Ocr { .. } => Component::Ocr,
    };
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_component_logger(component, level)?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::List => {
            cmd_list()?;
        }
        Commands::Bmp {
            region,
            out,
            repeat,
            interval_ms,
        } => {
            cmd_bmp(config, region, out, repeat, Duration::from_millis(interval_ms))?;
        }
        Commands::Ocr {
            region,
            threshold,
            json,
        } => {
            cmd_ocr(config, region, threshold, json)?;
        }
    }

    Ok(())
}

/// Configuration file, then profile, then command-line target flags
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(profile) = &cli.profile {
        config = config.apply_profile(profile)?;
    }

    let args = &cli.target;
    if args.title.is_some() || args.class.is_some() {
        config.target.title = args.title.clone();
        config.target.class = args.class.clone();
    }
    if args.child_title.is_some() || args.child_class.is_some() {
        config.target.child_title = args.child_title.clone();
        config.target.child_class = args.child_class.clone();
    }
    Ok(config)
}

fn cmd_list() -> Result<()> {
    let locator = WindowLocator::new(native_backend()?);
    let windows = locator.list()?;

    println!("found {} window(s):\n", windows.len());

    for w in &windows {
        println!(
            "  [{:#010x}] {:?} class={:?} {}",
            w.id.0, w.title, w.class_name, w.bounds
        );
    }

    Ok(())
}

/// `out` for a single capture, `<stem>_<i>.<ext>` for repeats
fn numbered_path(out: &Path, index: u32, repeat: u32) -> PathBuf {
    if repeat <= 1 {
        return out.to_path_buf();
    }
    let stem = out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot".to_string());
    let ext = out
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bmp".to_string());
    out.with_file_name(format!("{}_{}.{}", stem, index, ext))
}

#[tokio::main]
async fn cmd_bmp(
    config: Config,
    region: RegionArgs,
    out: PathBuf,
    repeat: u32,
    interval: Duration,
) -> Result<()> {
    let session = Arc::new(Screenshot::new(&config)?);

    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let stop = Arc::new(Notify::new());
    {
        let running = running.clone();
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            warn!("received shutdown signal, stopping after the current capture");
            running.store(false, Ordering::SeqCst);
            stop.notify_one();
        })?;
    }

    let mut written = 0;
    for i in 0..repeat {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if i > 0 {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.notified() => break,
            }
        }

        let shot = Arc::clone(&session);
        let RegionArgs {
            x,
            y,
            width,
            height,
        } = region;
        let blob = tokio::task::spawn_blocking(move || shot.take_bmp(x, y, width, height))
            .await
            .context("capture task failed")??;

        let path = numbered_path(&out, i, repeat);
        tokio::fs::write(&path, blob.as_bytes())
            .await
            .with_context(|| format!("failed to write {:?}", path))?;
        info!("wrote {:?} ({} bytes)", path, blob.len());
        written += 1;
    }

    info!("{} of {} capture(s) written", written, repeat);
    Ok(())
}

fn cmd_ocr(config: Config, region: RegionArgs, threshold: Option<u8>, json: bool) -> Result<()> {
    let threshold = threshold
        .map(OcrThreshold)
        .unwrap_or_else(|| config.ocr.default_threshold());
    let session = Screenshot::new(&config)?;

    let matches = session.ocr_shadow_text(
        region.x,
        region.y,
        region.width,
        region.height,
        threshold,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("no text found at threshold {}", threshold.0);
        return Ok(());
    }

    println!("found {} match(es):\n", matches.len());
    for m in &matches {
        println!(
            "  {:>16}  {:.2}  {}",
            m.bounds.to_string(),
            m.confidence,
            m.text
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_path() {
        let out = Path::new("shots/test.bmp");
        assert_eq!(numbered_path(out, 0, 1), PathBuf::from("shots/test.bmp"));
        assert_eq!(numbered_path(out, 2, 3), PathBuf::from("shots/test_2.bmp"));
    }

    #[test]
    fn test_cli_parses_region_and_target() {
        let cli = Cli::try_parse_from([
            "umbra", "--title", "Game", "ocr", "10", "20", "300", "40", "--threshold", "240",
        ])
        .unwrap();
        assert_eq!(cli.target.title.as_deref(), Some("Game"));
        match cli.command {
            Commands::Ocr {
                region, threshold, ..
            } => {
                assert_eq!((region.x, region.width), (10, 300));
                assert_eq!(threshold, Some(240));
            }
            _ => panic!("expected ocr command"),
        }
    }
}
