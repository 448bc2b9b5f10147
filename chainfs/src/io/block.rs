use std::path::Path;

use crate::layout::Geometry;
use crate::Result;

/// The block number to access ranging from 0 (the root directory) to n - 1 (the
/// last bitmap block) where n is number of blocks in the container.
pub type BlockNumber = usize;

/// Whole-block and single-byte access to a fixed-size backing container.
///
/// Every call is a single attempt. Failures are surfaced as `std::io::Error`
/// and never retried since the medium is assumed to be local.
pub trait BlockStorage {
    /// Opens the container at the specified path and checks that its length
    /// matches the geometry exactly.
    ///
    /// # Errors
    ///
    /// `StoreNotFound` if nothing exists at `path`, `StoreNotReadable` if it
    /// cannot be opened for reading and writing, `InvalidSize` if its length
    /// differs from `geometry.capacity()`.
    fn open_disk<P: AsRef<Path>>(path: P, geometry: &Geometry) -> Result<Self>
    where
        Self: std::marker::Sized;

    fn geometry(&self) -> &Geometry;

    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Reading a block out of range, into a buffer that is not exactly one
    /// block long, or hitting the end of the medium returns an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// Writing a block out of range or a buffer that is not exactly one block
    /// long returns an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Reads the byte at an absolute offset in the container.
    fn read_byte(&mut self, offset: u64) -> std::io::Result<u8>;

    /// Writes the byte at an absolute offset in the container.
    fn write_byte(&mut self, offset: u64, byte: u8) -> std::io::Result<()>;

    /// Flush any buffered disk IO from memory.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}
