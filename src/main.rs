//! Entry point for the mdwriter tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Initialize logging from `--log-level` (or `RUST_LOG`).
//! 3. Map every heap file into memory.
//! 4. Lay out the metadata header and heaps, then write the blob.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use tracing_subscriber::EnvFilter;

use mdwriter::config::Config;
use mdwriter::heap::DataHeap;
use mdwriter::writer::write_metadata;

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Map input files into memory
    let mut maps = Vec::new();
    for (name, path) in &config.heaps {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", path.display()))?;
        tracing::debug!("heap {} from {}: {} bytes", name, path.display(), mmap.len());
        maps.push((name, mmap));
    }
    let heaps: Vec<DataHeap> = maps
        .iter()
        .map(|(name, mmap)| DataHeap::new(name, &mmap[..]))
        .collect();

    if heaps.is_empty() {
        tracing::warn!("no heaps given, writing a bare metadata header");
    }

    write_metadata(&config.output, config.header_options(), &heaps)?;

    println!("Wrote metadata to {}", config.output.display());
    Ok(())
}
