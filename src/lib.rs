//! sfs is a simple user-space file system that stores a complete
//! hierarchical namespace inside a single fixed-size backing image.
//!
//! Linear image layout:
//! - Superblock (block 0)
//! - Inode table (packed 80-byte records)
//! - Block bitmap (one block, which bounds the image size)
//! - Data blocks
//!
//! Layers, from bottom to top:
//! 1. Block device: whole-block I/O against the backing image.
//! 2. Superblock/bitmap/inode table: allocation and persisted counters.
//! 3. Indirection mapper: file offset -> block id, allocate-on-write.
//! 4. Directory/path: name -> inode entries and absolute-path walks.
//! 5. File: byte-granular read/write over the mapper.
//! 6. FileSystem: the facade the host dispatcher drives, plus the
//!    open-handle table. Not thread-safe; callers serialize.

mod bitmap;
mod block_dev;
mod config;
mod directory;
mod error;
mod file;
mod fs;
mod handle;
mod indirect;
mod inode;
mod path;
mod structs;
mod superblock;

pub mod fuse;

pub use bitmap::*;
pub use block_dev::{BlockDevice, ImageFile};
pub use config::*;
pub use directory::*;
pub use error::FsError as Error;
pub use error::Result;
pub use file::*;
pub use fs::*;
pub use handle::*;
pub use indirect::*;
pub use inode::*;
pub use path::*;
pub use structs::*;
pub use superblock::*;
