//! Metadata heaps.
//!
//! A heap is a named region of raw content that the metadata header points
//! at. The header only needs its name, position and length; the bytes
//! themselves are produced elsewhere.

use std::borrow::Cow;
use std::io::Write;

use crate::chunk::{Chunk, FileOffset, Heap, Placement, Rva};
use crate::error::{Error, Result};

/// Compressed metadata tables.
pub const TABLES_STREAM: &str = "#~";
/// Uncompressed (edit-and-continue) metadata tables.
pub const UNCOMPRESSED_TABLES_STREAM: &str = "#-";
pub const STRINGS_STREAM: &str = "#Strings";
pub const USER_STRINGS_STREAM: &str = "#US";
pub const GUID_STREAM: &str = "#GUID";
pub const BLOB_STREAM: &str = "#Blob";
pub const PDB_STREAM: &str = "#Pdb";

/// A heap backed by a byte buffer, either owned or borrowed (e.g. a mapped file).
#[derive(Debug)]
pub struct DataHeap<'a> {
    name: String,
    data: Cow<'a, [u8]>,
    placement: Placement,
}

impl<'a> DataHeap<'a> {
    /// Creates a heap named `name` holding `data`.
    pub fn new(name: &str, data: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            name: name.to_string(),
            data: data.into(),
            placement: Placement::new(),
        }
    }

    /// The raw content of the heap.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Chunk for DataHeap<'_> {
    fn set_offset(&self, offset: FileOffset, rva: Rva) -> Result<()> {
        self.placement.set(offset, rva)?;
        tracing::trace!("heap {} at offset {} (rva {}), {} bytes", self.name, offset, rva, self.data.len());
        Ok(())
    }

    fn file_offset(&self) -> Option<FileOffset> {
        self.placement.file_offset()
    }

    fn rva(&self) -> Option<Rva> {
        self.placement.rva()
    }

    fn file_length(&self) -> u32 {
        self.data.len() as u32
    }

    fn virtual_size(&self) -> u32 {
        self.file_length()
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        if self.placement.get().is_none() {
            return Err(Error::NotPositioned);
        }
        writer.write_all(&self.data)?;
        Ok(())
    }
}

impl Heap for DataHeap<'_> {
    fn name(&self) -> &str {
        &self.name
    }
}
