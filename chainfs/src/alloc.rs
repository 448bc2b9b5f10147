use crate::fs::FsError;
use crate::io::{BlockNumber, BlockStorage};
use crate::Result;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

/// Reads the allocation state of a block straight from the on-disk bitmap.
///
/// # Errors
///
/// `InvalidBlock` for a block outside the container, an I/O fault if the
/// bitmap byte cannot be read.
pub fn state<T: BlockStorage>(dev: &mut T, blocknr: BlockNumber) -> Result<State> {
    let (offset, mask) = dev
        .geometry()
        .bitmap_position(blocknr)
        .ok_or(FsError::InvalidBlock(blocknr))?;
    let byte = dev.read_byte(offset)?;
    Ok(if byte & mask == 0 {
        State::Free
    } else {
        State::Used
    })
}

/// Marks a block as allocated. Exactly one bit of the bitmap changes.
pub fn mark_used<T: BlockStorage>(dev: &mut T, blocknr: BlockNumber) -> Result<()> {
    set_state(dev, blocknr, State::Used)
}

/// Marks a block as available again.
pub fn mark_free<T: BlockStorage>(dev: &mut T, blocknr: BlockNumber) -> Result<()> {
    set_state(dev, blocknr, State::Free)
}

fn set_state<T: BlockStorage>(dev: &mut T, blocknr: BlockNumber, state: State) -> Result<()> {
    let (offset, mask) = dev
        .geometry()
        .bitmap_position(blocknr)
        .ok_or(FsError::InvalidBlock(blocknr))?;
    let byte = dev.read_byte(offset)?;
    let byte = match state {
        State::Used => byte | mask,
        State::Free => byte & !mask,
    };
    dev.write_byte(offset, byte)?;
    trace!("block {} is now {:?}", blocknr, state);
    Ok(())
}

/// Implements a round-robin allocation policy. Each search resumes one past
/// the index it last returned and wraps around the allocatable region, so
/// allocations spread across the device instead of piling up at the front.
///
/// The allocator only chooses candidates. Committing a block is a separate
/// `mark_used` call made by whoever consumes the index.
#[derive(Debug, Default)]
pub struct BlockAllocator {
    /// The index most recently returned by `find_free_block`. Lives as long as
    /// the allocator and is never written to disk.
    last: BlockNumber,
}

impl BlockAllocator {
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Starts the search right after `last` instead of after the root block.
    pub fn with_cursor(last: BlockNumber) -> Self {
        Self { last }
    }

    pub fn cursor(&self) -> BlockNumber {
        self.last
    }

    /// Finds the next free block after the cursor without reserving it.
    ///
    /// # Errors
    ///
    /// `NoSpace` if a full pass over the allocatable region finds every block
    /// in use, an I/O fault if a bitmap byte cannot be read.
    pub fn find_free_block<T: BlockStorage>(&mut self, dev: &mut T) -> Result<BlockNumber> {
        let geometry = *dev.geometry();
        let count = geometry.data_blocks();
        // Consecutive indices share a bitmap byte, read it once per run.
        let mut cached: Option<(u64, u8)> = None;

        for _ in 0..count {
            self.last = (self.last + 1) % count;
            // The root directory is never handed out.
            if self.last == 0 {
                continue;
            }
            let (offset, mask) = geometry
                .bitmap_position(self.last)
                .ok_or(FsError::InvalidBlock(self.last))?;
            let byte = match cached {
                Some((cached_offset, byte)) if cached_offset == offset => byte,
                _ => {
                    let byte = dev.read_byte(offset)?;
                    cached = Some((offset, byte));
                    byte
                }
            };
            if byte & mask == 0 {
                debug!("found free block {}", self.last);
                return Ok(self.last);
            }
        }
        Err(FsError::NoSpace)
    }

    /// Chooses `n` distinct free blocks for an upcoming write. None of them is
    /// marked; the caller commits each one with `mark_used` as it is consumed.
    ///
    /// # Errors
    ///
    /// If the search fails or wraps back to the first block chosen in this
    /// batch, the cursor is restored to where it was and nothing is returned.
    pub fn reserve<T: BlockStorage>(&mut self, dev: &mut T, n: usize) -> Result<Vec<BlockNumber>> {
        let saved = self.last;
        let mut blocks: Vec<BlockNumber> = Vec::with_capacity(n);

        for _ in 0..n {
            match self.find_free_block(dev) {
                Ok(blocknr) if blocks.first() != Some(&blocknr) => blocks.push(blocknr),
                Ok(_) => {
                    debug!("only {} free blocks for a batch of {}", blocks.len(), n);
                    self.last = saved;
                    return Err(FsError::NoSpace);
                }
                Err(err) => {
                    self.last = saved;
                    return Err(err);
                }
            }
        }
        Ok(blocks)
    }
}
