//! Metadata blob writer.
//!
//! This module assembles the metadata header and its heaps into one buffer
//! and writes it to disk.

use anyhow::{Context, Result};
use std::path::Path;

use crate::chunk::{Chunk, FileOffset, Heap, Rva};
use crate::header::{MetadataHeader, MetadataHeaderOptions};
use crate::layout::{ChunkList, HEAP_ALIGNMENT};

/// Lays out the header followed by `heaps` at offset 0 and returns the bytes.
///
/// Heaps are listed in the header in the order given. Each heap can only be
/// positioned once, so the slice cannot be reused for another blob.
pub fn build_metadata<H: Heap>(options: MetadataHeaderOptions, heaps: &[H]) -> Result<Vec<u8>> {
    let mut header = MetadataHeader::with_options(options);
    header.set_heaps(heaps.iter().map(|heap| heap as &dyn Heap).collect());

    let mut chunks = ChunkList::new();
    chunks.add(&header, HEAP_ALIGNMENT);
    for heap in heaps {
        chunks.add(heap, HEAP_ALIGNMENT);
    }
    chunks
        .set_offset(FileOffset(0), Rva(0))
        .context("failed to lay out metadata")?;

    let mut buffer = Vec::with_capacity(chunks.file_length() as usize);
    chunks
        .write_to(&mut buffer)
        .context("failed to write metadata")?;
    Ok(buffer)
}

/// Builds the metadata blob and writes it to `output_path`.
pub fn write_metadata<H: Heap>(
    output_path: &Path,
    options: MetadataHeaderOptions,
    heaps: &[H],
) -> Result<()> {
    let buffer = build_metadata(options, heaps)?;
    std::fs::write(output_path, &buffer)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    tracing::info!("wrote {} bytes of metadata to {}", buffer.len(), output_path.display());
    Ok(())
}
