//! A two-level filesystem stored inside one fixed-size container file.
//!
//! # Layout
//! ==========================================================================
//! | Root directory | Subdirectory and file chain blocks ... | Bitmap       |
//! ==========================================================================
//!
//! Block 0 holds the root directory. The root only contains subdirectories and
//! subdirectories only contain files. File contents live in singly linked
//! chains of blocks, and the top blocks of the container hold one allocation
//! bit per block.
#[macro_use]
extern crate log;

pub mod alloc;
pub mod dir;
pub mod file;
pub mod fs;
pub mod io;
pub mod layout;
pub mod path;

pub use crate::fs::{ChainFs, CheckReport, FileAttributes, FileKind, FsError};
pub use crate::layout::Geometry;

/// Size of a disk block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Default size of the container file (5 MiB).
pub const DISK_SIZE: u64 = 5 * 1024 * 1024;

/// Directory names and file basenames use at most this many bytes.
pub const MAX_FILENAME: usize = 8;
/// File extensions use at most this many bytes.
pub const MAX_EXTENSION: usize = 3;

pub type Result<T> = std::result::Result<T, FsError>;
