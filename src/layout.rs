//! Layout management.
//!
//! `ChunkList` is a minimal image assembler: it places chunks one after the
//! other, each aligned to its own boundary, and later writes them back in the
//! same order. While writing it checks that every chunk emitted exactly the
//! number of bytes it measured, so a measure/write mismatch is reported at the
//! chunk that caused it instead of corrupting everything placed after it.

use once_cell::unsync::OnceCell;
use std::io::{self, Write};

use crate::chunk::{Chunk, FileOffset, Placement, Rva};
use crate::error::{Error, Result};
use crate::utils::write_zeros;

/// Default alignment of metadata heaps.
pub const HEAP_ALIGNMENT: u32 = 4;

struct Entry<'a> {
    chunk: &'a dyn Chunk,
    alignment: u32,
}

/// An ordered list of chunks laid out back to back.
pub struct ChunkList<'a> {
    chunks: Vec<Entry<'a>>,
    placement: Placement,
    /// File length and virtual size, fixed by `set_offset`.
    lengths: OnceCell<(u32, u32)>,
}

impl<'a> ChunkList<'a> {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            placement: Placement::new(),
            lengths: OnceCell::new(),
        }
    }

    /// Appends `chunk`, to be placed at a multiple of `alignment`.
    /// `alignment` must be a power of two.
    pub fn add(&mut self, chunk: &'a dyn Chunk, alignment: u32) {
        assert!(alignment.is_power_of_two());
        self.chunks.push(Entry { chunk, alignment });
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for ChunkList<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk for ChunkList<'_> {
    fn set_offset(&self, offset: FileOffset, rva: Rva) -> Result<()> {
        if self.placement.get().is_some() {
            return Err(Error::AlreadyPositioned);
        }

        let mut current_off = offset;
        let mut current_rva = rva;
        for entry in &self.chunks {
            current_off = current_off.align_up(entry.alignment);
            current_rva = current_rva.align_up(entry.alignment);
            entry.chunk.set_offset(current_off, current_rva)?;
            current_off = current_off + entry.chunk.file_length();
            current_rva = current_rva + entry.chunk.virtual_size();
        }

        let file_length = current_off.0 - offset.0;
        let virtual_size = current_rva.0 - rva.0;
        tracing::debug!(
            "laid out {} chunks at offset {}: 0x{:x} bytes",
            self.chunks.len(),
            offset,
            file_length
        );
        // The list is only positioned once every chunk in it was.
        self.placement.set(offset, rva)?;
        let _ = self.lengths.set((file_length, virtual_size));
        Ok(())
    }

    fn file_offset(&self) -> Option<FileOffset> {
        self.placement.file_offset()
    }

    fn rva(&self) -> Option<Rva> {
        self.placement.rva()
    }

    /// # Panics
    ///
    /// Panics if called before `set_offset`.
    fn file_length(&self) -> u32 {
        self.lengths.get().expect("chunk list not yet laid out").0
    }

    fn virtual_size(&self) -> u32 {
        self.lengths.get().expect("chunk list not yet laid out").1
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        let start = self.placement.file_offset().ok_or(Error::NotPositioned)?;
        let mut out = CountingWriter::new(writer);

        for entry in &self.chunks {
            let chunk_offset = entry.chunk.file_offset().ok_or(Error::NotPositioned)?;
            let target = u64::from(chunk_offset.0 - start.0);
            let gap = (target - out.written) as usize;
            write_zeros(&mut out, gap)?;

            let before = out.written;
            entry.chunk.write_to(&mut out)?;
            let actual = out.written - before;
            let expected = u64::from(entry.chunk.file_length());
            if actual != expected {
                return Err(Error::LengthMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

/// Forwards writes while counting the bytes that went through.
struct CountingWriter<'w> {
    inner: &'w mut dyn Write,
    written: u64,
}

impl<'w> CountingWriter<'w> {
    fn new(inner: &'w mut dyn Write) -> Self {
        Self { inner, written: 0 }
    }
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::DataHeap;

    /// Claims one length but writes another.
    struct Liar {
        placement: Placement,
    }

    impl Chunk for Liar {
        fn set_offset(&self, offset: FileOffset, rva: Rva) -> Result<()> {
            self.placement.set(offset, rva)
        }
        fn file_offset(&self) -> Option<FileOffset> {
            self.placement.file_offset()
        }
        fn rva(&self) -> Option<Rva> {
            self.placement.rva()
        }
        fn file_length(&self) -> u32 {
            4
        }
        fn virtual_size(&self) -> u32 {
            4
        }
        fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
            writer.write_all(&[1, 2, 3])?;
            Ok(())
        }
    }

    #[test]
    fn chunks_are_aligned_and_gaps_zero_filled() {
        let a = DataHeap::new("a", vec![0xaa; 3]);
        let b = DataHeap::new("b", vec![0xbb; 2]);
        let mut list = ChunkList::new();
        list.add(&a, 1);
        list.add(&b, 8);
        list.set_offset(FileOffset(0x100), Rva(0x2100)).unwrap();

        assert_eq!(a.file_offset(), Some(FileOffset(0x100)));
        assert_eq!(b.file_offset(), Some(FileOffset(0x108)));
        assert_eq!(b.rva(), Some(Rva(0x2108)));
        assert_eq!(list.file_length(), 10);
        assert_eq!(list.virtual_size(), 10);

        let mut out = Vec::new();
        list.write_to(&mut out).unwrap();
        assert_eq!(out, [0xaa, 0xaa, 0xaa, 0, 0, 0, 0, 0, 0xbb, 0xbb]);
    }

    #[test]
    fn length_mismatch_is_detected() {
        let liar = Liar { placement: Placement::new() };
        let mut list = ChunkList::new();
        list.add(&liar, 4);
        list.set_offset(FileOffset(0), Rva(0)).unwrap();

        let mut out = Vec::new();
        match list.write_to(&mut out) {
            Err(Error::LengthMismatch { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("expected length mismatch, got {:?}", other),
        }
    }

    #[test]
    fn empty_list_has_no_length() {
        let list = ChunkList::new();
        assert!(list.is_empty());
        list.set_offset(FileOffset(0x40), Rva(0x40)).unwrap();
        assert_eq!(list.file_length(), 0);
        let mut out = Vec::new();
        list.write_to(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn chunks_cannot_be_laid_out_twice() {
        let heap = DataHeap::new("#Blob", vec![0]);
        let mut list = ChunkList::new();
        list.add(&heap, 4);
        list.set_offset(FileOffset(0), Rva(0)).unwrap();
        assert!(matches!(
            list.set_offset(FileOffset(0), Rva(0)),
            Err(Error::AlreadyPositioned)
        ));
    }

    #[test]
    fn failed_layout_leaves_list_unpositioned() {
        let early = DataHeap::new("#Strings", vec![0; 4]);
        early.set_offset(FileOffset(0x10), Rva(0x10)).unwrap();
        let mut list = ChunkList::new();
        list.add(&early, 4);

        assert!(matches!(
            list.set_offset(FileOffset(0x40), Rva(0x40)),
            Err(Error::AlreadyPositioned)
        ));
        assert_eq!(list.file_offset(), None);
        let mut out = Vec::new();
        assert!(matches!(list.write_to(&mut out), Err(Error::NotPositioned)));
    }
}
