//! Parcel overlay renderer CLI.
//!
//! Resolves a parcel by address or APN, fetches the requested GIS layers
//! and writes one PNG per layer plus a PDF contact sheet.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http_cache::{CacheStore, DiskStore};
use parcel_common::RenderRequest;
use render_pipeline::{RenderOrchestrator, Settings};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "parcel-render")]
#[command(about = "Render GIS overlay maps for a land parcel")]
struct Args {
    /// Source configuration file (overrides CONFIG_PATH)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory root (overrides OUTPUT_ROOT)
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render overlay images for one parcel
    Render {
        /// Street address
        #[arg(long)]
        address: Option<String>,

        /// Assessor parcel number
        #[arg(long)]
        apn: Option<String>,

        /// Layer to render (repeatable)
        #[arg(short, long = "layer", required = true)]
        layers: Vec<String>,

        /// Ground distance around the parcel, in feet
        #[arg(long)]
        buffer_feet: Option<f64>,

        #[arg(long)]
        dpi: Option<u32>,

        /// Canvas width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Canvas height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// County used to pick between several matching parcels
        #[arg(long)]
        county: Option<String>,
    },

    /// Remove expired entries from the HTTP cache
    PurgeCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr; stdout carries the response JSON
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut settings = Settings::from_env().context("Invalid environment settings")?;
    if let Some(config) = args.config {
        settings.config_path = config;
    }
    if let Some(output_root) = args.output_root {
        settings.output_root = output_root;
    }

    match args.command {
        Command::Render {
            address,
            apn,
            layers,
            buffer_feet,
            dpi,
            width,
            height,
            county,
        } => {
            let request = RenderRequest {
                address,
                apn,
                county,
                layers,
                buffer_feet,
                output_dpi: dpi,
                canvas_width_px: width,
                canvas_height_px: height,
            };
            render(settings, request).await
        }
        Command::PurgeCache => {
            let store = DiskStore::open(&settings.cache_dir)
                .await
                .with_context(|| format!("Failed to open cache at {}", settings.cache_dir.display()))?;
            let removed = store.purge_expired().await.context("Cache purge failed")?;
            info!(removed, cache_dir = %settings.cache_dir.display(), "Purged expired cache entries");
            Ok(())
        }
    }
}

async fn render(settings: Settings, request: RenderRequest) -> Result<()> {
    info!(
        config = %settings.config_path.display(),
        output_root = %settings.output_root.display(),
        "Starting parcel render"
    );

    let output_root = settings.output_root.clone();
    let orchestrator = RenderOrchestrator::from_settings(settings)
        .await
        .context("Failed to initialize render pipeline")?;

    let result = orchestrator
        .render(request)
        .await
        .context("Render request failed")?;

    let stats = orchestrator.cache_stats();
    info!(
        hits = stats.hits(),
        misses = stats.misses(),
        hit_rate = stats.hit_rate(),
        "HTTP cache usage"
    );

    let response = result.to_response(&output_root, "/outputs");
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
