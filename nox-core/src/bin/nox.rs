//! Nox standalone player.
//!
//! # Usage
//!
//! ```bash
//! nox game.wasm
//! nox game.wat --config nox.toml
//! nox game.wasm --headless --frames 600 --record mix.wav --screenshot last.png
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nox_core::config::Config;
use nox_core::player::{self, PlayerOptions};

#[derive(Parser)]
#[command(name = "nox")]
#[command(author, version, about = "Nox - run a WASM guest with 2D drawing and audio")]
struct Args {
    /// Guest module to run (.wasm or .wat)
    rom: PathBuf,

    /// Configuration file (TOML)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long, short = 'n')]
    frames: Option<u64>,

    /// Do not open an audio device; mix in the frame loop instead
    #[arg(long)]
    headless: bool,

    /// Record the mix to a WAV file (implies --headless)
    #[arg(long, value_name = "FILE")]
    record: Option<PathBuf>,

    /// Save the final screen as PNG
    #[arg(long, value_name = "FILE")]
    screenshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if !args.rom.exists() {
        anyhow::bail!("guest file not found: {}", args.rom.display());
    }

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.headless || args.record.is_some() {
        config.audio.enabled = false;
    }

    let rom = std::fs::read(&args.rom)
        .with_context(|| format!("failed to read {}", args.rom.display()))?;

    let options = PlayerOptions {
        max_frames: args.frames,
        record: args.record,
        screenshot: args.screenshot,
    };
    let summary = player::run(&config, &rom, &options)?;
    tracing::info!(frames = summary.frames, "exited");
    Ok(())
}
