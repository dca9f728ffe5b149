//! Log setup shared by the binaries: stderr plus a timestamped file under `logs/`.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
/// Returns the log file path.
pub fn init(name: &str) -> Result<PathBuf> {
    fs::create_dir_all("logs").context("failed to create logs/")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = PathBuf::from(format!("logs/{name}_{ts}.log"));
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("logger already installed")?;

    eprintln!("Log: {}", path.display());
    Ok(path)
}
