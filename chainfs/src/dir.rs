//! Root and subdirectory records.
//!
//! Both are a 32-bit entry count followed by as many fixed-size entries as fit
//! in one block, with the leftover bytes as padding. Names are NUL terminated
//! inside a field one byte longer than the longest allowed name.

use std::mem::size_of;

use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::alloc::{self, BlockAllocator};
use crate::file::FileBlock;
use crate::fs::FsError;
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::{BlockKind, Record};
use crate::{Result, BLOCK_SIZE, MAX_EXTENSION, MAX_FILENAME};

/// The root directory always lives in the first block.
pub const ROOT_BLOCK: BlockNumber = 0;

const NAME_FIELD: usize = MAX_FILENAME + 1;
const EXTENSION_FIELD: usize = MAX_EXTENSION + 1;
const COUNT_SIZE: usize = size_of::<U32<LittleEndian>>();

pub const MAX_DIRS_IN_ROOT: usize = (BLOCK_SIZE - COUNT_SIZE) / size_of::<RawDirectory>();
const ROOT_PADDING: usize = BLOCK_SIZE - COUNT_SIZE - MAX_DIRS_IN_ROOT * size_of::<RawDirectory>();

pub const MAX_FILES_IN_DIR: usize = (BLOCK_SIZE - COUNT_SIZE) / size_of::<RawFile>();
const DIR_PADDING: usize = BLOCK_SIZE - COUNT_SIZE - MAX_FILES_IN_DIR * size_of::<RawFile>();

const _: () = assert!(size_of::<RootBlock>() == BLOCK_SIZE);
const _: () = assert!(size_of::<DirectoryBlock>() == BLOCK_SIZE);

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy)]
struct RawDirectory {
    name: [u8; NAME_FIELD],
    start_block: U64<LittleEndian>,
}

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy)]
struct RawFile {
    basename: [u8; NAME_FIELD],
    extension: [u8; EXTENSION_FIELD],
    size: U64<LittleEndian>,
    start_block: U64<LittleEndian>,
}

/// Block 0: the list of subdirectories.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone)]
pub struct RootBlock {
    count: U32<LittleEndian>,
    directories: [RawDirectory; MAX_DIRS_IN_ROOT],
    padding: [u8; ROOT_PADDING],
}

/// The list of files in one subdirectory.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone)]
pub struct DirectoryBlock {
    count: U32<LittleEndian>,
    files: [RawFile; MAX_FILES_IN_DIR],
    padding: [u8; DIR_PADDING],
}

/// A subdirectory as listed in the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub start_block: BlockNumber,
}

/// A file as listed in its subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub basename: String,
    pub extension: String,
    /// Logical length in bytes. The chain may hold more.
    pub size: u64,
    /// Head of the block chain.
    pub start_block: BlockNumber,
    /// Position of the entry in its directory block.
    pub slot: usize,
}

impl FileEntry {
    /// `basename.extension`, the name shown in listings.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.basename, self.extension)
    }
}

/// Validates a name against the limits of its field.
///
/// # Errors
///
/// `NotPermitted` for an empty name or one with a NUL byte, `NameTooLong` when
/// it is longer than `max` bytes.
pub fn check_name(name: &str, max: usize) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(FsError::NotPermitted);
    }
    if name.len() > max {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

fn encode_name<const N: usize>(name: &str) -> [u8; N] {
    let mut field = [0; N];
    let len = name.len().min(N - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

fn name_bytes(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

fn decode_name(field: &[u8]) -> String {
    String::from_utf8_lossy(name_bytes(field)).into_owned()
}

fn check_count(count: u32, capacity: usize, block: BlockNumber, kind: BlockKind) -> Result<()> {
    if count as usize > capacity {
        return Err(FsError::CorruptBlock { block, kind });
    }
    Ok(())
}

impl Record for RootBlock {
    const KIND: BlockKind = BlockKind::Root;

    fn validate(&self, blocknr: BlockNumber) -> Result<()> {
        check_count(self.count.get(), MAX_DIRS_IN_ROOT, blocknr, Self::KIND)
    }
}

impl Record for DirectoryBlock {
    const KIND: BlockKind = BlockKind::Subdirectory;

    fn validate(&self, blocknr: BlockNumber) -> Result<()> {
        check_count(self.count.get(), MAX_FILES_IN_DIR, blocknr, Self::KIND)
    }
}

impl RootBlock {
    pub fn len(&self) -> usize {
        (self.count.get() as usize).min(MAX_DIRS_IN_ROOT)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_DIRS_IN_ROOT
    }

    pub fn entries(&self) -> impl Iterator<Item = DirectoryEntry> + '_ {
        self.directories[..self.len()]
            .iter()
            .map(|raw| DirectoryEntry {
                name: decode_name(&raw.name),
                start_block: raw.start_block.get() as BlockNumber,
            })
    }

    /// Linear scan of the subdirectory list.
    pub fn lookup_subdirectory(&self, name: &str) -> Result<DirectoryEntry> {
        self.directories[..self.len()]
            .iter()
            .find(|raw| name_bytes(&raw.name) == name.as_bytes())
            .map(|raw| DirectoryEntry {
                name: name.to_string(),
                start_block: raw.start_block.get() as BlockNumber,
            })
            .ok_or(FsError::NotFound)
    }

    fn push(&mut self, name: &str, start_block: BlockNumber) {
        let slot = self.len();
        self.directories[slot] = RawDirectory {
            name: encode_name(name),
            start_block: U64::new(start_block as u64),
        };
        self.count.set(slot as u32 + 1);
    }
}

impl DirectoryBlock {
    pub fn len(&self) -> usize {
        (self.count.get() as usize).min(MAX_FILES_IN_DIR)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_FILES_IN_DIR
    }

    pub fn entries(&self) -> impl Iterator<Item = FileEntry> + '_ {
        self.files[..self.len()]
            .iter()
            .enumerate()
            .map(|(slot, raw)| Self::decode(slot, raw))
    }

    /// Linear scan for a `(basename, extension)` pair.
    pub fn lookup_file(&self, basename: &str, extension: &str) -> Result<FileEntry> {
        self.files[..self.len()]
            .iter()
            .enumerate()
            .find(|(_, raw)| {
                name_bytes(&raw.basename) == basename.as_bytes()
                    && name_bytes(&raw.extension) == extension.as_bytes()
            })
            .map(|(slot, raw)| Self::decode(slot, raw))
            .ok_or(FsError::NotFound)
    }

    /// Records a new logical size for the file in `slot`. Sizes only grow.
    pub fn grow_file(&mut self, slot: usize, size: u64) {
        debug_assert!(slot < self.len(), "slot {} holds no file", slot);
        if slot >= self.len() {
            return;
        }
        let raw = &mut self.files[slot];
        if size > raw.size.get() {
            raw.size.set(size);
        }
    }

    fn decode(slot: usize, raw: &RawFile) -> FileEntry {
        FileEntry {
            basename: decode_name(&raw.basename),
            extension: decode_name(&raw.extension),
            size: raw.size.get(),
            start_block: raw.start_block.get() as BlockNumber,
            slot,
        }
    }

    fn push(&mut self, basename: &str, extension: &str, start_block: BlockNumber) -> usize {
        let slot = self.len();
        self.files[slot] = RawFile {
            basename: encode_name(basename),
            extension: encode_name(extension),
            size: U64::new(0),
            start_block: U64::new(start_block as u64),
        };
        self.count.set(slot as u32 + 1);
        slot
    }
}

/// Adds a subdirectory to the root and persists it.
///
/// The new directory block is written first, then the root, then the bitmap
/// bit. If the bitmap update fails the root already points at the block while
/// its bit is still clear; that window is accepted and reported as an I/O
/// fault.
pub fn create_subdirectory<T: BlockStorage>(
    dev: &mut T,
    alloc: &mut BlockAllocator,
    root: &mut RootBlock,
    name: &str,
) -> Result<DirectoryEntry> {
    check_name(name, MAX_FILENAME)?;
    if root.lookup_subdirectory(name).is_ok() {
        return Err(FsError::AlreadyExists);
    }
    if root.is_full() {
        return Err(FsError::NoSpace);
    }

    let blocknr = alloc.find_free_block(dev)?;
    DirectoryBlock::new_zeroed().store(dev, blocknr)?;
    root.push(name, blocknr);
    root.store(dev, ROOT_BLOCK)?;
    if let Err(err) = alloc::mark_used(dev, blocknr) {
        warn!("directory {} saved but block {} left unmarked", name, blocknr);
        return Err(err);
    }

    info!("created directory {} at block {}", name, blocknr);
    Ok(DirectoryEntry {
        name: name.to_string(),
        start_block: blocknr,
    })
}

/// Adds an empty file to a subdirectory and persists it. The head of the new
/// chain is written as a zeroed file block so it ends the chain.
pub fn create_file<T: BlockStorage>(
    dev: &mut T,
    alloc: &mut BlockAllocator,
    dir: &mut DirectoryBlock,
    dir_block: BlockNumber,
    basename: &str,
    extension: &str,
) -> Result<FileEntry> {
    check_name(basename, MAX_FILENAME)?;
    check_name(extension, MAX_EXTENSION)?;
    if dir.lookup_file(basename, extension).is_ok() {
        return Err(FsError::AlreadyExists);
    }
    if dir.is_full() {
        return Err(FsError::NoSpace);
    }

    let blocknr = alloc.find_free_block(dev)?;
    FileBlock::new_zeroed().store(dev, blocknr)?;
    let slot = dir.push(basename, extension, blocknr);
    dir.store(dev, dir_block)?;
    if let Err(err) = alloc::mark_used(dev, blocknr) {
        warn!(
            "file {}.{} saved but block {} left unmarked",
            basename, extension, blocknr
        );
        return Err(err);
    }

    info!("created file {}.{} at block {}", basename, extension, blocknr);
    Ok(FileEntry {
        basename: basename.to_string(),
        extension: extension.to_string(),
        size: 0,
        start_block: blocknr,
        slot,
    })
}
