use crate::fs::FsError;
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::Geometry;
use crate::{Result, BLOCK_SIZE};

use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

/// Emulates a block device in userspace using a fixed-size file as the
/// medium. The handle is closed when the value is dropped.
#[derive(Debug)]
pub struct DiskImage {
    /// Fixed-size file, exactly `geometry.capacity()` bytes long.
    fd: File,
    geometry: Geometry,
}

impl DiskImage {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_block(&self, blocknr: BlockNumber, len: usize) -> std::io::Result<()> {
        if blocknr >= self.geometry.total_blocks() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("block {} out of range", blocknr),
            ));
        }
        if len != BLOCK_SIZE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("buffer of {} bytes is not one block", len),
            ));
        }
        Ok(())
    }

    fn check_offset(&self, offset: u64) -> std::io::Result<()> {
        if offset >= self.geometry.capacity() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("offset {} out of range", offset),
            ));
        }
        Ok(())
    }
}

impl BlockStorage for DiskImage {
    fn open_disk<P: AsRef<Path>>(path: P, geometry: &Geometry) -> Result<Self>
    where
        Self: std::marker::Sized,
    {
        let path = path.as_ref();
        // Return error if the file does not exist rather than create one.
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => FsError::StoreNotFound(path.to_path_buf()),
                _ => FsError::StoreNotReadable(path.to_path_buf(), err),
            })?;

        let len = fd
            .metadata()
            .map_err(|err| FsError::StoreNotReadable(path.to_path_buf(), err))?
            .len();
        if len != geometry.capacity() {
            return Err(FsError::InvalidSize {
                expected: geometry.capacity(),
                actual: len,
            });
        }

        Ok(DiskImage {
            fd,
            geometry: *geometry,
        })
    }

    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_block(blocknr, buf.len())?;
        trace!("read block {}", blocknr);
        self.fd
            .seek(SeekFrom::Start(self.geometry.block_offset(blocknr)))?;
        self.fd.read_exact(buf)
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_block(blocknr, buf.len())?;
        trace!("write block {}", blocknr);
        self.fd
            .seek(SeekFrom::Start(self.geometry.block_offset(blocknr)))?;
        self.fd.write_all(buf)
    }

    fn read_byte(&mut self, offset: u64) -> std::io::Result<u8> {
        self.check_offset(offset)?;
        let mut byte = [0; 1];
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn write_byte(&mut self, offset: u64, byte: u8) -> std::io::Result<()> {
        self.check_offset(offset)?;
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.write_all(&[byte])
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()
    }
}

/// Prepares a zero-filled container of an exact capacity. An all-zero
/// container is an empty filesystem: no directories and every block free.
pub struct DiskImageBuilder {
    fd: File,
    geometry: Geometry,
}

impl From<File> for DiskImageBuilder {
    fn from(fd: File) -> Self {
        DiskImageBuilder {
            fd,
            geometry: Geometry::default(),
        }
    }
}

impl DiskImageBuilder {
    /// Sets the layout, and therefore the exact length, of the container.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// This builder assumes ownership of the file descriptor and overwrites
    /// whatever it held. Ownership moves on to the returned image.
    pub fn build(mut self) -> std::io::Result<DiskImage> {
        self.zero_blocks()?;
        Ok(DiskImage {
            fd: self.fd,
            geometry: self.geometry,
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.set_len(0)?;
        self.fd.seek(SeekFrom::Start(0))?;
        let zeroes = [0x00; BLOCK_SIZE];
        // Buffer the block writes rather than hitting the file once per block.
        let mut bfd = BufWriter::new(&self.fd);
        for _ in 0..self.geometry.total_blocks() {
            bfd.write_all(&zeroes)?;
        }
        bfd.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_geometry(blocks: u64) -> Geometry {
        Geometry::new(blocks * BLOCK_SIZE as u64).unwrap()
    }

    fn build_image(blocks: u64) -> DiskImage {
        let fs_block = tempfile::tempfile().unwrap();
        DiskImageBuilder::from(fs_block)
            .with_geometry(small_geometry(blocks))
            .build()
            .expect("failed to allocate file block")
    }

    #[test]
    fn builder_allocates_correct_num_bytes() {
        let mut disk = build_image(4);
        disk.sync_disk().unwrap();
        assert_eq!(disk.into_file().metadata().unwrap().len(), 4 * 512);
    }

    #[test]
    fn can_read_and_write_blocks() {
        let mut disk = build_image(4);

        // Allocate a block with a non-zero character.
        let block = vec![0x55; BLOCK_SIZE];
        disk.write_block(2, &block).unwrap();

        let mut read_block = vec![0x00; BLOCK_SIZE];
        // Read a different block.
        disk.read_block(1, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x00; BLOCK_SIZE]);

        // Read the block with data.
        disk.read_block(2, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x55; BLOCK_SIZE]);
    }

    #[test]
    fn can_read_and_write_start_and_end_blocks() {
        let mut disk = build_image(4);

        disk.write_block(0, &[0x11; BLOCK_SIZE]).unwrap();
        disk.write_block(3, &[0x33; BLOCK_SIZE]).unwrap();

        let mut read_block = [0x00; BLOCK_SIZE];
        disk.read_block(0, &mut read_block).unwrap();
        assert_eq!(read_block, [0x11; BLOCK_SIZE]);
        disk.read_block(3, &mut read_block).unwrap();
        assert_eq!(read_block, [0x33; BLOCK_SIZE]);
    }

    #[test]
    fn block_access_beyond_range_fails() {
        let mut disk = build_image(4);

        assert!(disk.write_block(4, &[0x55; BLOCK_SIZE]).is_err());
        assert!(disk.read_block(4, &mut [0x00; BLOCK_SIZE]).is_err());
    }

    #[test]
    fn partial_block_buffers_are_rejected() {
        let mut disk = build_image(4);

        let err = disk.write_block(0, &[0x55; 256]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(disk.read_block(0, &mut [0x00; 1024]).is_err());
    }

    #[test]
    fn bytes_alias_block_contents() {
        let mut disk = build_image(4);

        disk.write_byte(512 + 7, 0xAB).unwrap();
        assert_eq!(disk.read_byte(512 + 7).unwrap(), 0xAB);

        let mut block = [0x00; BLOCK_SIZE];
        disk.read_block(1, &mut block).unwrap();
        assert_eq!(block[7], 0xAB);

        assert!(disk.read_byte(4 * 512).is_err());
    }

    #[test]
    fn open_missing_container_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = DiskImage::open_disk(dir.path().join(".disk"), &small_geometry(4));
        match result.unwrap_err() {
            FsError::StoreNotFound(_) => (),
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn open_container_with_wrong_size_fails() {
        let tf = tempfile::NamedTempFile::new().unwrap();
        DiskImageBuilder::from(tf.reopen().unwrap())
            .with_geometry(small_geometry(4))
            .build()
            .unwrap();

        match DiskImage::open_disk(tf.path(), &small_geometry(8)).unwrap_err() {
            FsError::InvalidSize { expected, actual } => {
                assert_eq!(expected, 8 * 512);
                assert_eq!(actual, 4 * 512);
            }
            err => panic!("unexpected error {:?}", err),
        }
        assert!(DiskImage::open_disk(tf.path(), &small_geometry(4)).is_ok());
    }

    #[test]
    fn rebuilding_shrinks_and_clears_the_medium() {
        let tf = tempfile::NamedTempFile::new().unwrap();
        let mut disk = DiskImageBuilder::from(tf.reopen().unwrap())
            .with_geometry(small_geometry(8))
            .build()
            .unwrap();
        disk.write_block(1, &[0xFF; BLOCK_SIZE]).unwrap();
        disk.sync_disk().unwrap();

        let mut disk = DiskImageBuilder::from(tf.reopen().unwrap())
            .with_geometry(small_geometry(4))
            .build()
            .unwrap();
        let mut block = [0xEE; BLOCK_SIZE];
        disk.read_block(1, &mut block).unwrap();
        assert_eq!(block, [0x00; BLOCK_SIZE]);
        assert_eq!(disk.into_file().metadata().unwrap().len(), 4 * 512);
    }
}
