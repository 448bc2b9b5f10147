//! File contents as singly linked chains of blocks.
//!
//! Each block starts with the index of the next block in the chain followed by
//! the payload. Block 0 is the root directory and can never be part of a
//! chain, so a zero link ends the chain.

use std::cmp::min;
use std::mem::size_of;

use zerocopy::byteorder::{LittleEndian, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::alloc::{self, BlockAllocator};
use crate::dir::FileEntry;
use crate::fs::FsError;
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::{BlockKind, Record};
use crate::{Result, BLOCK_SIZE};

/// Payload bytes carried by one file block.
pub const PAYLOAD_SIZE: usize = BLOCK_SIZE - size_of::<U64<LittleEndian>>();

const END_OF_CHAIN: u64 = 0;

const _: () = assert!(size_of::<FileBlock>() == BLOCK_SIZE);

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone)]
pub struct FileBlock {
    next: U64<LittleEndian>,
    data: [u8; PAYLOAD_SIZE],
}

impl Record for FileBlock {
    const KIND: BlockKind = BlockKind::File;
}

impl FileBlock {
    /// The block that continues the chain, if any.
    pub fn next(&self) -> Option<BlockNumber> {
        match self.next.get() {
            END_OF_CHAIN => None,
            next => Some(next as BlockNumber),
        }
    }

    pub fn set_next(&mut self, blocknr: BlockNumber) {
        self.next.set(blocknr as u64);
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A position inside a chain: the loaded block and an offset into its
/// payload. The offset may equal `PAYLOAD_SIZE` when it sits right at the
/// end of a full block.
pub struct ChainCursor {
    pub blocknr: BlockNumber,
    pub block: FileBlock,
    pub offset: usize,
}

fn broken_chain(blocknr: BlockNumber) -> FsError {
    FsError::CorruptBlock {
        block: blocknr,
        kind: BlockKind::File,
    }
}

/// Number of blocks a chain needs to hold `len` bytes. Even an empty file
/// owns its head block.
pub fn blocks_needed(len: u64) -> usize {
    let payload = PAYLOAD_SIZE as u64;
    ((len + payload - 1) / payload).max(1) as usize
}

/// Walks the chain from `start` until `offset` falls inside the current
/// block's payload.
///
/// # Errors
///
/// A corrupt-block fault if the chain ends before the offset is reached.
pub fn seek_to_offset<T: BlockStorage>(
    dev: &mut T,
    start: BlockNumber,
    offset: u64,
) -> Result<ChainCursor> {
    let mut blocknr = start;
    let mut block = FileBlock::load(dev, blocknr)?;
    let mut remaining = offset;

    while remaining > PAYLOAD_SIZE as u64 {
        blocknr = block.next().ok_or_else(|| broken_chain(blocknr))?;
        block = FileBlock::load(dev, blocknr)?;
        remaining -= PAYLOAD_SIZE as u64;
    }

    Ok(ChainCursor {
        blocknr,
        block,
        offset: remaining as usize,
    })
}

/// Counts the blocks of the chain starting at `start`. The walk is bounded by
/// the number of allocatable blocks, so a cycle is reported as corruption
/// instead of looping forever.
pub fn chain_len<T: BlockStorage>(dev: &mut T, start: BlockNumber) -> Result<usize> {
    let limit = dev.geometry().data_blocks();
    let mut blocknr = start;
    let mut len = 1;

    while let Some(next) = FileBlock::load(dev, blocknr)?.next() {
        len += 1;
        if len > limit {
            return Err(broken_chain(start));
        }
        blocknr = next;
    }
    Ok(len)
}

/// Reads up to `buf.len()` bytes of the file starting at `offset`.
///
/// The request is clamped to the logical size, so reading at exactly the end
/// of the file returns 0 bytes.
///
/// # Errors
///
/// `OffsetTooLarge` if `offset` is past the logical size, a corrupt-block
/// fault if the chain is shorter than the logical size.
pub fn read<T: BlockStorage>(
    dev: &mut T,
    file: &FileEntry,
    buf: &mut [u8],
    offset: u64,
) -> Result<usize> {
    if offset > file.size {
        return Err(FsError::OffsetTooLarge {
            offset,
            size: file.size,
        });
    }
    let len = min(buf.len() as u64, file.size - offset) as usize;
    if len == 0 {
        return Ok(0);
    }

    let mut cursor = seek_to_offset(dev, file.start_block, offset)?;
    let mut copied = 0;
    loop {
        let n = min(PAYLOAD_SIZE - cursor.offset, len - copied);
        buf[copied..copied + n]
            .copy_from_slice(&cursor.block.payload()[cursor.offset..cursor.offset + n]);
        copied += n;
        if copied == len {
            break;
        }

        let next = cursor.block.next().ok_or_else(|| broken_chain(cursor.blocknr))?;
        cursor = ChainCursor {
            blocknr: next,
            block: FileBlock::load(dev, next)?,
            offset: 0,
        };
    }

    debug!("read {} bytes at {} from {}", copied, offset, file.file_name());
    Ok(copied)
}

/// Writes `data` into the file at `offset`, growing the chain as needed.
///
/// The blocks the chain is missing are reserved as one batch before anything
/// is touched. Each one is marked used when the chain is linked to it. If a
/// later step fails, every block marked by this call is released again, but
/// payload and links already written stay on disk. A persisted link can then
/// point at a block that is free again: `ChainFs::check` reports it as
/// unmarked, and a later allocation may hand it to another file. The logical
/// size in the directory entry is left to the caller.
///
/// # Errors
///
/// `OffsetTooLarge` if `offset` is past the logical size, `NoSpace` if not
/// enough free blocks exist (nothing is modified), I/O faults otherwise.
pub fn write<T: BlockStorage>(
    dev: &mut T,
    alloc: &mut BlockAllocator,
    file: &FileEntry,
    data: &[u8],
    offset: u64,
) -> Result<usize> {
    if offset > file.size {
        return Err(FsError::OffsetTooLarge {
            offset,
            size: file.size,
        });
    }
    if data.is_empty() {
        return Ok(0);
    }

    let end = offset + data.len() as u64;
    let have = chain_len(dev, file.start_block)?;
    let missing = blocks_needed(end).saturating_sub(have);
    let reserved = alloc.reserve(dev, missing)?;
    if missing > 0 {
        debug!("extending {} by {} blocks", file.file_name(), missing);
    }

    let mut fresh = reserved.into_iter();
    let mut marked: Vec<BlockNumber> = Vec::with_capacity(missing);
    if let Err(err) = write_chain(dev, file.start_block, data, offset, &mut fresh, &mut marked) {
        for &blocknr in &marked {
            if let Err(release_err) = alloc::mark_free(dev, blocknr) {
                warn!("could not release block {}: {}", blocknr, release_err);
            }
        }
        warn!(
            "write to {} failed, released {} blocks",
            file.file_name(),
            marked.len()
        );
        return Err(err);
    }

    debug!("wrote {} bytes at {} to {}", data.len(), offset, file.file_name());
    Ok(data.len())
}

fn write_chain<T: BlockStorage>(
    dev: &mut T,
    start: BlockNumber,
    data: &[u8],
    offset: u64,
    fresh: &mut impl Iterator<Item = BlockNumber>,
    marked: &mut Vec<BlockNumber>,
) -> Result<()> {
    let mut cursor = seek_to_offset(dev, start, offset)?;
    let mut written = 0;

    loop {
        let n = min(PAYLOAD_SIZE - cursor.offset, data.len() - written);
        cursor.block.payload_mut()[cursor.offset..cursor.offset + n]
            .copy_from_slice(&data[written..written + n]);
        written += n;

        let mut next = None;
        if written < data.len() {
            next = match cursor.block.next() {
                Some(blocknr) => Some((blocknr, false)),
                None => {
                    let blocknr = fresh.next().ok_or(FsError::NoSpace)?;
                    alloc::mark_used(dev, blocknr)?;
                    marked.push(blocknr);
                    cursor.block.set_next(blocknr);
                    Some((blocknr, true))
                }
            };
        }
        cursor.block.store(dev, cursor.blocknr)?;

        let (blocknr, linked) = match next {
            Some(next) => next,
            None => return Ok(()),
        };
        // Freshly linked blocks may hold stale bytes, start them empty.
        let block = if linked {
            FileBlock::new_zeroed()
        } else {
            FileBlock::load(dev, blocknr)?
        };
        cursor = ChainCursor {
            blocknr,
            block,
            offset: 0,
        };
    }
}
