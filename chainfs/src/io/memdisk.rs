use crate::io::{BlockNumber, BlockStorage};
use crate::layout::Geometry;
use crate::{Result, BLOCK_SIZE};

use std::io::ErrorKind;
use std::path::Path;

/// In-memory medium used by unit tests. Block writes and bitmap byte accesses
/// can be made to fail to exercise fault handling.
pub(crate) struct MemoryDisk {
    bytes: Vec<u8>,
    geometry: Geometry,
    block_writes: usize,
    fail_block_write: Option<usize>,
    byte_reads: usize,
    fail_byte_read: Option<usize>,
    byte_writes: usize,
    fail_byte_write: Option<usize>,
}

impl MemoryDisk {
    pub(crate) fn new(geometry: Geometry) -> Self {
        Self {
            bytes: vec![0; geometry.capacity() as usize],
            geometry,
            block_writes: 0,
            fail_block_write: None,
            byte_reads: 0,
            fail_byte_read: None,
            byte_writes: 0,
            fail_byte_write: None,
        }
    }

    /// A medium of `blocks` blocks.
    pub(crate) fn with_blocks(blocks: usize) -> Self {
        Self::new(Geometry::new((blocks * BLOCK_SIZE) as u64).unwrap())
    }

    /// The block write numbered `n` from now (0 is the next one) and every
    /// one after it fail.
    pub(crate) fn fail_block_writes_after(&mut self, n: usize) {
        self.fail_block_write = Some(self.block_writes + n);
    }

    /// The byte read numbered `n` from now and every one after it fail.
    pub(crate) fn fail_byte_reads_after(&mut self, n: usize) {
        self.fail_byte_read = Some(self.byte_reads + n);
    }

    /// Only the byte write numbered `n` from now fails.
    pub(crate) fn fail_nth_byte_write(&mut self, n: usize) {
        self.fail_byte_write = Some(self.byte_writes + n);
    }

    pub(crate) fn heal(&mut self) {
        self.fail_block_write = None;
        self.fail_byte_read = None;
        self.fail_byte_write = None;
    }

    pub(crate) fn byte_reads(&self) -> usize {
        self.byte_reads
    }

    fn block_range(&self, blocknr: BlockNumber, len: usize) -> std::io::Result<std::ops::Range<usize>> {
        if blocknr >= self.geometry.total_blocks() || len != BLOCK_SIZE {
            return Err(std::io::Error::new(ErrorKind::InvalidInput, "bad block access"));
        }
        let start = blocknr * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }
}

impl BlockStorage for MemoryDisk {
    /// Every open yields a fresh zeroed medium; the path is ignored.
    fn open_disk<P: AsRef<Path>>(_path: P, geometry: &Geometry) -> Result<Self> {
        Ok(Self::new(*geometry))
    }

    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        let range = self.block_range(blocknr, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        let range = self.block_range(blocknr, buf.len())?;
        let attempt = self.block_writes;
        self.block_writes += 1;
        if matches!(self.fail_block_write, Some(limit) if attempt >= limit) {
            return Err(std::io::Error::new(ErrorKind::Other, "injected write fault"));
        }
        self.bytes[range].copy_from_slice(buf);
        Ok(())
    }

    fn read_byte(&mut self, offset: u64) -> std::io::Result<u8> {
        let attempt = self.byte_reads;
        self.byte_reads += 1;
        if matches!(self.fail_byte_read, Some(limit) if attempt >= limit) {
            return Err(std::io::Error::new(ErrorKind::Other, "injected read fault"));
        }
        self.bytes
            .get(offset as usize)
            .copied()
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "bad byte access"))
    }

    fn write_byte(&mut self, offset: u64, byte: u8) -> std::io::Result<()> {
        let attempt = self.byte_writes;
        self.byte_writes += 1;
        if self.fail_byte_write == Some(attempt) {
            return Err(std::io::Error::new(ErrorKind::Other, "injected write fault"));
        }
        let slot = self
            .bytes
            .get_mut(offset as usize)
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "bad byte access"))?;
        *slot = byte;
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
