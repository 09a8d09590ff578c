//! Metadata header writer.
//!
//! The metadata header (the "metadata root") is the directory that precedes
//! the metadata heaps. It records a signature, version information, a runtime
//! version string and, for every heap, its offset relative to the header, its
//! size and its name.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! 0       u32   signature            "BSJB"
//! 4       u16   major version
//! 6       u16   minor version
//! 8       u32   reserved
//! 12      u32   L = aligned length of the version string
//! 16      L     version string, NUL, zero padding
//! 16+L    u8    storage flags
//! 17+L    u8    reserved
//! 18+L    u16   number of heaps
//! 20+L    ...   per heap: u32 offset, u32 size, ASCII name + NUL padded to 4
//! ```
//!
//! The header is measured in [`Chunk::set_offset`] and that length is cached.
//! [`Chunk::write_to`] must then emit exactly that many bytes. The 32-byte heap
//! name limit is checked while writing, once per heap.

use bitflags::bitflags;
use object::endian::{U16, U32};
use object::pod::{bytes_of, Pod};
use object::Endianness;
use once_cell::unsync::OnceCell;
use std::io::Write;
use std::mem;

use crate::chunk::{Chunk, FileOffset, Heap, Placement, Rva};
use crate::error::{Error, Result};
use crate::utils::{align_up, asciiz, utf8z, write_zeros};

/// `"BSJB"` read as a little-endian `u32`.
pub const DEFAULT_SIGNATURE: u32 = 0x424A_5342;
pub const DEFAULT_MAJOR_VERSION: u16 = 1;
pub const DEFAULT_MINOR_VERSION: u16 = 1;
pub const DEFAULT_VERSION_STRING: &str = MS_CLR_20;

/// Runtime version strings found in shipped images.
pub const MS_CLR_10: &str = "v1.0.3705";
pub const MS_CLR_11: &str = "v1.1.4322";
pub const MS_CLR_20: &str = "v2.0.50727";
pub const MS_CLR_40: &str = "v4.0.30319";
pub const ECMA_2002: &str = "Standard CLI 2002";
pub const ECMA_2005: &str = "Standard CLI 2005";
pub const PORTABLE_PDB_V1: &str = "PDB v1.0";

/// Largest padded heap name field, NUL included.
pub const MAX_HEAP_NAME_LEN: usize = 32;

/// Readers refuse longer version strings; they are still written as given.
const MAX_VERSION_STRING_LEN: usize = 255;

bitflags! {
    /// Storage flags byte following the version string.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct StorageFlags: u8 {
        /// Extra data follows the heap count.
        const EXTRA_DATA = 0x01;
    }
}

/// Optional overrides for the header fields.
///
/// Every field falls back to a documented default when `None`; use the
/// accessor of the same name to get the effective value.
#[derive(Debug, Clone, Default)]
pub struct MetadataHeaderOptions {
    /// Defaults to [`DEFAULT_SIGNATURE`].
    pub signature: Option<u32>,
    /// Defaults to 1.
    pub major_version: Option<u16>,
    /// Defaults to 1.
    pub minor_version: Option<u16>,
    /// Should be 0.
    pub reserved1: Option<u32>,
    /// Should be 0.
    pub reserved2: Option<u8>,
    /// Should be empty.
    pub storage_flags: Option<StorageFlags>,
    /// Stored as NUL-terminated UTF-8. Defaults to [`DEFAULT_VERSION_STRING`].
    pub version_string: Option<String>,
}

impl MetadataHeaderOptions {
    pub fn signature(&self) -> u32 {
        self.signature.unwrap_or(DEFAULT_SIGNATURE)
    }

    pub fn major_version(&self) -> u16 {
        self.major_version.unwrap_or(DEFAULT_MAJOR_VERSION)
    }

    pub fn minor_version(&self) -> u16 {
        self.minor_version.unwrap_or(DEFAULT_MINOR_VERSION)
    }

    pub fn reserved1(&self) -> u32 {
        self.reserved1.unwrap_or(0)
    }

    pub fn reserved2(&self) -> u8 {
        self.reserved2.unwrap_or(0)
    }

    pub fn storage_flags(&self) -> StorageFlags {
        self.storage_flags.unwrap_or_default()
    }

    pub fn version_string(&self) -> &str {
        self.version_string.as_deref().unwrap_or(DEFAULT_VERSION_STRING)
    }
}

fn u16(v: u16) -> U16<Endianness> {
    U16::new(Endianness::Little, v)
}
fn u32(v: u32) -> U32<Endianness> {
    U32::new(Endianness::Little, v)
}

/// Fixed fields up to and including the version string length.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct RootPrefix {
    signature: U32<Endianness>,
    major_version: U16<Endianness>,
    minor_version: U16<Endianness>,
    reserved1: U32<Endianness>,
    version_length: U32<Endianness>,
}

/// Fields between the version string and the heap entries.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct StorageHeader {
    flags: u8,
    reserved2: u8,
    streams: U16<Endianness>,
}

/// Fixed part of a heap entry; the padded name follows.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct StreamHeader {
    offset: U32<Endianness>,
    size: U32<Endianness>,
}

// SAFETY: `repr(C)` structs of `u8` and byte-array endian fields: align 1,
// no padding, every bit pattern valid.
unsafe impl Pod for RootPrefix {}
unsafe impl Pod for StorageHeader {}
unsafe impl Pod for StreamHeader {}

/// The metadata header chunk.
///
/// Holds non-owning references to the heaps it describes, in the order they
/// are listed in the output. The heap list must be complete before
/// [`Chunk::set_offset`]; later changes are not reflected in the cached
/// length.
pub struct MetadataHeader<'a> {
    options: MetadataHeaderOptions,
    heaps: Vec<&'a dyn Heap>,
    placement: Placement,
    length: OnceCell<u32>,
}

impl<'a> MetadataHeader<'a> {
    /// Creates a header with default options and no heaps.
    pub fn new() -> Self {
        Self::with_options(MetadataHeaderOptions::default())
    }

    pub fn with_options(options: MetadataHeaderOptions) -> Self {
        Self {
            options,
            heaps: Vec::new(),
            placement: Placement::new(),
            length: OnceCell::new(),
        }
    }

    pub fn options(&self) -> &MetadataHeaderOptions {
        &self.options
    }

    pub fn heaps(&self) -> &[&'a dyn Heap] {
        &self.heaps
    }

    /// Replaces the heap list.
    pub fn set_heaps(&mut self, heaps: Vec<&'a dyn Heap>) {
        self.heaps = heaps;
    }

    pub fn push_heap(&mut self, heap: &'a dyn Heap) {
        self.heaps.push(heap);
    }

    /// Byte cost of everything `write_to` emits, computed without emitting.
    fn measure(&self) -> u32 {
        let mut length = mem::size_of::<RootPrefix>() as u32;
        length += utf8z(self.options.version_string()).len() as u32;
        length = align_up(length, 4);
        length += mem::size_of::<StorageHeader>() as u32;
        for heap in &self.heaps {
            length += mem::size_of::<StreamHeader>() as u32;
            length += asciiz(heap.name()).len() as u32;
            length = align_up(length, 4);
        }
        length
    }

    fn write_heap_entry(
        &self,
        writer: &mut dyn Write,
        header_offset: FileOffset,
        heap: &dyn Heap,
    ) -> Result<()> {
        let name = asciiz(heap.name());
        if name.len() > MAX_HEAP_NAME_LEN {
            return Err(Error::HeapNameTooLong {
                name: heap.name().to_string(),
            });
        }
        let heap_offset = heap.file_offset().ok_or(Error::NotPositioned)?;
        let relative = heap_offset
            .0
            .checked_sub(header_offset.0)
            .ok_or_else(|| Error::HeapBeforeHeader {
                name: heap.name().to_string(),
            })?;

        tracing::trace!(
            "heap entry {}: offset +0x{:x}, size 0x{:x}",
            heap.name(),
            relative,
            heap.file_length()
        );
        let entry = StreamHeader {
            offset: u32(relative),
            size: u32(heap.file_length()),
        };
        writer.write_all(bytes_of(&entry))?;
        writer.write_all(&name)?;
        write_zeros(writer, align_up(name.len() as u32, 4) as usize - name.len())?;
        Ok(())
    }
}

impl Default for MetadataHeader<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk for MetadataHeader<'_> {
    fn set_offset(&self, offset: FileOffset, rva: Rva) -> Result<()> {
        self.placement.set(offset, rva)?;

        let version = self.options.version_string();
        if version.len() > MAX_VERSION_STRING_LEN {
            tracing::warn!(
                "metadata version string is {} bytes, readers accept at most {}",
                version.len(),
                MAX_VERSION_STRING_LEN
            );
        }

        let length = *self.length.get_or_init(|| self.measure());
        tracing::debug!(
            "metadata header at offset {} (rva {}): {} heaps, {} bytes",
            offset,
            rva,
            self.heaps.len(),
            length
        );
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
        *self.length.get().expect("metadata header not yet positioned")
    }

    fn virtual_size(&self) -> u32 {
        self.file_length()
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        let header_offset = self.placement.file_offset().ok_or(Error::NotPositioned)?;
        let streams = u16::try_from(self.heaps.len()).map_err(|_| Error::TooManyHeaps {
            count: self.heaps.len(),
        })?;
        let options = &self.options;

        let version = utf8z(options.version_string());
        let version_length = align_up(version.len() as u32, 4);
        let prefix = RootPrefix {
            signature: u32(options.signature()),
            major_version: u16(options.major_version()),
            minor_version: u16(options.minor_version()),
            reserved1: u32(options.reserved1()),
            version_length: u32(version_length),
        };
        writer.write_all(bytes_of(&prefix))?;
        writer.write_all(&version)?;
        write_zeros(writer, version_length as usize - version.len())?;

        let storage = StorageHeader {
            flags: options.storage_flags().bits(),
            reserved2: options.reserved2(),
            streams: u16(streams),
        };
        writer.write_all(bytes_of(&storage))?;

        for heap in &self.heaps {
            self.write_heap_entry(writer, header_offset, *heap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_records_have_no_padding() {
        assert_eq!(mem::size_of::<RootPrefix>(), 16);
        assert_eq!(mem::size_of::<StorageHeader>(), 4);
        assert_eq!(mem::size_of::<StreamHeader>(), 8);
    }

    #[test]
    fn options_resolve_defaults() {
        let options = MetadataHeaderOptions::default();
        assert_eq!(options.signature(), 0x424A5342);
        assert_eq!(options.major_version(), 1);
        assert_eq!(options.minor_version(), 1);
        assert_eq!(options.reserved1(), 0);
        assert_eq!(options.reserved2(), 0);
        assert_eq!(options.storage_flags(), StorageFlags::empty());
        assert_eq!(options.version_string(), "v2.0.50727");
    }

    #[test]
    fn options_prefer_overrides() {
        let options = MetadataHeaderOptions {
            signature: Some(0xdead_beef),
            major_version: Some(0),
            minor_version: Some(19),
            reserved1: Some(7),
            reserved2: Some(9),
            storage_flags: Some(StorageFlags::EXTRA_DATA),
            version_string: Some(MS_CLR_40.to_string()),
        };
        assert_eq!(options.signature(), 0xdead_beef);
        assert_eq!(options.major_version(), 0);
        assert_eq!(options.minor_version(), 19);
        assert_eq!(options.reserved1(), 7);
        assert_eq!(options.reserved2(), 9);
        assert_eq!(options.storage_flags().bits(), 1);
        assert_eq!(options.version_string(), "v4.0.30319");
    }

    #[test]
    fn overridden_fields_land_at_their_offsets() {
        let header = MetadataHeader::with_options(MetadataHeaderOptions {
            signature: Some(0x0403_0201),
            major_version: Some(0x0605),
            minor_version: Some(0x0807),
            reserved1: Some(0x0c0b_0a09),
            reserved2: Some(0x22),
            storage_flags: Some(StorageFlags::EXTRA_DATA),
            version_string: Some("abc".to_string()),
        });
        header.set_offset(FileOffset(0), Rva(0)).unwrap();
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();

        assert_eq!(out.len(), 24);
        assert_eq!(&out[..12], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(&out[12..16], &[4, 0, 0, 0]);
        assert_eq!(&out[16..20], b"abc\0");
        assert_eq!(&out[20..24], &[0x01, 0x22, 0, 0]);
    }

    #[test]
    fn version_string_is_measured_as_utf8() {
        // "v\u{e9}" is 3 bytes of UTF-8, 4 with the NUL.
        let header = MetadataHeader::with_options(MetadataHeaderOptions {
            version_string: Some("v\u{e9}".to_string()),
            ..Default::default()
        });
        header.set_offset(FileOffset(0), Rva(0)).unwrap();
        assert_eq!(header.file_length(), 16 + 4 + 4);
    }

    #[test]
    fn set_offset_twice_is_rejected() {
        let header = MetadataHeader::new();
        header.set_offset(FileOffset(0x200), Rva(0x2200)).unwrap();
        assert!(matches!(
            header.set_offset(FileOffset(0x300), Rva(0x2300)),
            Err(Error::AlreadyPositioned)
        ));
        assert_eq!(header.file_offset(), Some(FileOffset(0x200)));
        assert_eq!(header.rva(), Some(Rva(0x2200)));
    }

    #[test]
    fn write_before_set_offset_is_rejected() {
        let header = MetadataHeader::new();
        let mut out = Vec::new();
        assert!(matches!(header.write_to(&mut out), Err(Error::NotPositioned)));
        assert!(out.is_empty());
    }

    #[test]
    #[should_panic(expected = "not yet positioned")]
    fn file_length_before_set_offset_panics() {
        MetadataHeader::new().file_length();
    }

    #[test]
    fn virtual_size_matches_file_length() {
        let header = MetadataHeader::new();
        header.set_offset(FileOffset(0), Rva(0)).unwrap();
        assert_eq!(header.virtual_size(), header.file_length());
    }
}
