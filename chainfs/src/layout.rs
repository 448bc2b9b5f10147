use crate::fs::FsError;
use crate::io::{BlockNumber, BlockStorage};
use crate::{Result, BLOCK_SIZE, DISK_SIZE};

use std::fmt;
use zerocopy::{AsBytes, FromBytes};

const BLOCK_BYTES: u64 = BLOCK_SIZE as u64;
/// Number of blocks whose allocation bits fit in one bitmap block.
const BITS_PER_BLOCK: u64 = BLOCK_BYTES * 8;

/// Sizes and regions derived from the container capacity.
///
/// The bitmap occupies the highest `ceil(capacity / (8 * BLOCK_SIZE^2))`
/// blocks. Blocks below it, except the root at block 0, can be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    capacity: u64,
    total_blocks: usize,
    bitmap_blocks: usize,
}

impl Geometry {
    /// # Errors
    ///
    /// `InvalidSize` when the capacity is not a whole number of blocks or
    /// leaves no room for a single data block.
    pub fn new(capacity: u64) -> Result<Self> {
        if capacity == 0 || capacity % BLOCK_BYTES != 0 {
            return Err(FsError::InvalidSize {
                expected: capacity - capacity % BLOCK_BYTES,
                actual: capacity,
            });
        }
        let geometry = Self::derive(capacity);
        // Root directory, bitmap, and at least one block to hand out.
        let minimum = geometry.bitmap_blocks + 2;
        if geometry.total_blocks < minimum {
            return Err(FsError::InvalidSize {
                expected: minimum as u64 * BLOCK_BYTES,
                actual: capacity,
            });
        }
        Ok(geometry)
    }

    fn derive(capacity: u64) -> Self {
        let total_blocks = capacity / BLOCK_BYTES;
        let bitmap_blocks = (total_blocks + BITS_PER_BLOCK - 1) / BITS_PER_BLOCK;
        Self {
            capacity,
            total_blocks: total_blocks as usize,
            bitmap_blocks: bitmap_blocks as usize,
        }
    }

    /// Length of the container in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn bitmap_blocks(&self) -> usize {
        self.bitmap_blocks
    }

    /// Number of block indices the allocator cycles through. Index 0 is part
    /// of the range but never handed out.
    pub fn data_blocks(&self) -> usize {
        self.total_blocks - self.bitmap_blocks
    }

    /// First block of the bitmap region.
    pub fn bitmap_block(&self) -> BlockNumber {
        self.data_blocks()
    }

    /// Byte offset of the bitmap region in the container.
    pub fn bitmap_start(&self) -> u64 {
        self.bitmap_block() as u64 * BLOCK_BYTES
    }

    /// Locates the allocation bit of a block: the absolute offset of the bitmap
    /// byte holding it and the mask selecting it. Returns `None` for blocks
    /// outside the container.
    pub fn bitmap_position(&self, blocknr: BlockNumber) -> Option<(u64, u8)> {
        if blocknr >= self.total_blocks {
            return None;
        }
        let offset = self.bitmap_start() + (blocknr / 8) as u64;
        Some((offset, 1 << (blocknr % 8)))
    }

    /// Absolute byte offset of a block in the container.
    pub fn block_offset(&self, blocknr: BlockNumber) -> u64 {
        blocknr as u64 * BLOCK_BYTES
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::derive(DISK_SIZE)
    }
}

/// What a block holds. Nothing on disk says so; the role always comes from
/// the directory entry or link that led to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Root,
    Subdirectory,
    File,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::Root => "root directory",
            BlockKind::Subdirectory => "subdirectory",
            BlockKind::File => "file",
        };
        f.write_str(name)
    }
}

/// A fixed-layout structure that fills exactly one block.
pub trait Record: AsBytes + FromBytes + Sized {
    const KIND: BlockKind;

    /// Checks invariants that the byte layout alone cannot express.
    fn validate(&self, _blocknr: BlockNumber) -> Result<()> {
        Ok(())
    }

    fn load<T: BlockStorage>(dev: &mut T, blocknr: BlockNumber) -> Result<Self> {
        let mut buf = [0; BLOCK_SIZE];
        dev.read_block(blocknr, &mut buf)?;
        let record = Self::read_from(&buf[..]).ok_or(FsError::CorruptBlock {
            block: blocknr,
            kind: Self::KIND,
        })?;
        record.validate(blocknr)?;
        Ok(record)
    }

    fn store<T: BlockStorage>(&self, dev: &mut T, blocknr: BlockNumber) -> Result<()> {
        dev.write_block(blocknr, self.as_bytes())?;
        Ok(())
    }
}
