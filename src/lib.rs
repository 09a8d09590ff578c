//! Metadata Header Writer Library.
//!
//! This library writes the metadata root of a managed module image: the
//! directory record that lists every metadata heap with its offset, size and
//! name. It is organized into several modules:
//! - `chunk`: The measure-then-write contract shared by every image component.
//! - `header`: The metadata header itself and its options.
//! - `heap`: Heap trait implementations and standard heap names.
//! - `layout`: Sequential placement of chunks.
//! - `writer`: Assembling a metadata blob and writing it to disk.
//! - `config`: CLI configuration.

pub mod chunk;
pub mod config;
pub mod error;
pub mod header;
pub mod heap;
pub mod layout;
pub mod utils;
pub mod writer;

pub use chunk::{Chunk, FileOffset, Heap, Rva};
pub use error::{Error, Result};
pub use header::{MetadataHeader, MetadataHeaderOptions, StorageFlags};
