//! Chunk abstraction.
//!
//! Every piece of the output image (the metadata header, each heap, a list of
//! chunks) implements the same two-phase contract: it is positioned first,
//! which fixes its length, and written later, emitting exactly that length.
//! This lets an assembler place and emit components it knows nothing about.

use once_cell::unsync::OnceCell;
use std::fmt;
use std::io::Write;
use std::ops::Add;

use crate::error::{Error, Result};
use crate::utils::align_up;

/// Byte offset from the start of the output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileOffset(pub u32);

/// Relative virtual address of a chunk once the image is mapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rva(pub u32);

impl FileOffset {
    pub fn align_up(self, align: u32) -> Self {
        FileOffset(align_up(self.0, align))
    }
}

impl Rva {
    pub fn align_up(self, align: u32) -> Self {
        Rva(align_up(self.0, align))
    }
}

impl Add<u32> for FileOffset {
    type Output = FileOffset;

    fn add(self, len: u32) -> FileOffset {
        FileOffset(self.0 + len)
    }
}

impl Add<u32> for Rva {
    type Output = Rva;

    fn add(self, len: u32) -> Rva {
        Rva(self.0 + len)
    }
}

impl fmt::Display for FileOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Display for Rva {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// A component of the output image that is measured before it is written.
///
/// Positions are assigned through a shared reference so that an assembler and
/// the metadata header can both hold on to the same heaps.
pub trait Chunk {
    /// Assigns the file offset and RVA of this chunk.
    ///
    /// Called exactly once; a chunk that computes its length here must never
    /// recompute it afterwards.
    fn set_offset(&self, offset: FileOffset, rva: Rva) -> Result<()>;

    /// File offset assigned by `set_offset`, if any.
    fn file_offset(&self) -> Option<FileOffset>;

    /// RVA assigned by `set_offset`, if any.
    fn rva(&self) -> Option<Rva>;

    /// Number of bytes `write_to` will emit.
    fn file_length(&self) -> u32;

    /// Size of the chunk once mapped.
    fn virtual_size(&self) -> u32;

    /// Appends exactly `file_length()` bytes to `writer`.
    fn write_to(&self, writer: &mut dyn Write) -> Result<()>;
}

/// A named chunk whose location is recorded in the metadata header.
pub trait Heap: Chunk {
    /// Stream name, e.g. `#Strings`.
    fn name(&self) -> &str;
}

/// Write-once storage for a chunk's file offset and RVA.
#[derive(Debug, Default)]
pub struct Placement(OnceCell<(FileOffset, Rva)>);

impl Placement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the position, rejecting a second assignment.
    pub fn set(&self, offset: FileOffset, rva: Rva) -> Result<()> {
        self.0
            .set((offset, rva))
            .map_err(|_| Error::AlreadyPositioned)
    }

    pub fn get(&self) -> Option<(FileOffset, Rva)> {
        self.0.get().copied()
    }

    pub fn file_offset(&self) -> Option<FileOffset> {
        self.get().map(|(offset, _)| offset)
    }

    pub fn rva(&self) -> Option<Rva> {
        self.get().map(|(_, rva)| rva)
    }
}
