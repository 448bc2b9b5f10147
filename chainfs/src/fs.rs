use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::alloc::{self, BlockAllocator, State};
use crate::dir::{self, DirectoryBlock, FileEntry, RootBlock, ROOT_BLOCK};
use crate::file::{self, FileBlock, PAYLOAD_SIZE};
use crate::io::{BlockNumber, BlockStorage, DiskImage, DiskImageBuilder};
use crate::layout::{BlockKind, Geometry, Record};
use crate::path::FsPath;
use crate::{Result, MAX_EXTENSION, MAX_FILENAME};

#[derive(Error, Debug)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("no space left in directory or container")]
    NoSpace,
    #[error("name too long: {0}")]
    NameTooLong(String),
    #[error("operation not permitted")]
    NotPermitted,
    #[error("offset {offset} is past the end of a {size} byte file")]
    OffsetTooLarge { offset: u64, size: u64 },
    #[error("is a directory")]
    IsDirectory,
    #[error("no container at {}", .0.display())]
    StoreNotFound(PathBuf),
    #[error("cannot open container at {}: {}", .0.display(), .1)]
    StoreNotReadable(PathBuf, #[source] std::io::Error),
    #[error("cannot create container at {}: {}", .0.display(), .1)]
    StoreNotCreated(PathBuf, #[source] std::io::Error),
    #[error("container is {actual} bytes, expected {expected}")]
    InvalidSize { expected: u64, actual: u64 },
    #[error("block {0} is outside the container")]
    InvalidBlock(BlockNumber),
    #[error("corrupt {kind} block {block}")]
    CorruptBlock { block: BlockNumber, kind: BlockKind },
    #[error("i/o fault: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// The POSIX error number a filesystem protocol layer reports for this
    /// error, as a positive value.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NoSpace => libc::ENOSPC,
            FsError::NameTooLong(_) => libc::ENAMETOOLONG,
            FsError::NotPermitted => libc::EPERM,
            FsError::OffsetTooLarge { .. } => libc::EFBIG,
            FsError::IsDirectory => libc::EISDIR,
            FsError::StoreNotFound(_)
            | FsError::StoreNotReadable(..)
            | FsError::InvalidSize { .. } => libc::ENXIO,
            FsError::StoreNotCreated(..)
            | FsError::InvalidBlock(_)
            | FsError::CorruptBlock { .. }
            | FsError::Io(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// What a stat call reports for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub kind: FileKind,
    pub size: u64,
    pub nlink: u32,
    pub perm: u16,
}

impl FileAttributes {
    fn directory() -> Self {
        Self {
            kind: FileKind::Directory,
            size: 0,
            nlink: 2,
            perm: 0o755,
        }
    }

    fn regular_file(size: u64) -> Self {
        Self {
            kind: FileKind::RegularFile,
            size,
            nlink: 1,
            perm: 0o666,
        }
    }
}

/// Result of a consistency walk over the whole container.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub directories: usize,
    pub files: usize,
    /// Blocks reachable from the root, the root itself excluded.
    pub reachable_blocks: usize,
    /// Reachable blocks whose bitmap bit is clear.
    pub unmarked: Vec<BlockNumber>,
    /// Blocks marked used that nothing reaches.
    pub leaked: Vec<BlockNumber>,
    /// Blocks reached more than once.
    pub shared: Vec<BlockNumber>,
    /// Files whose chain holds fewer bytes than their recorded size.
    pub short_files: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.unmarked.is_empty()
            && self.leaked.is_empty()
            && self.shared.is_empty()
            && self.short_files.is_empty()
    }
}

/// The operation table a filesystem protocol layer dispatches into.
///
/// Every call opens the container, loads what it needs, writes back what it
/// changed and closes the container again. Only the allocator cursor lives
/// across calls.
pub struct ChainFs<T: BlockStorage = DiskImage> {
    path: PathBuf,
    geometry: Geometry,
    allocator: BlockAllocator,
    medium: PhantomData<T>,
}

impl ChainFs<DiskImage> {
    /// Creates (or overwrites) a zero-filled container at `path` and marks the
    /// root and bitmap blocks as used.
    pub fn create<P: AsRef<Path>>(path: P, geometry: Geometry) -> Result<Self> {
        let path = path.as_ref();
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| FsError::StoreNotCreated(path.to_path_buf(), err))?;
        let mut dev = DiskImageBuilder::from(fd).with_geometry(geometry).build()?;
        format(&mut dev)?;

        info!(
            "formatted {} with {} blocks",
            path.display(),
            geometry.total_blocks()
        );
        Ok(Self::with_allocator(path, geometry, BlockAllocator::new()))
    }
}

/// Marks the blocks that are never handed out: the root and the bitmap.
pub fn format<T: BlockStorage>(dev: &mut T) -> Result<()> {
    let geometry = *dev.geometry();
    alloc::mark_used(dev, ROOT_BLOCK)?;
    for blocknr in geometry.bitmap_block()..geometry.total_blocks() {
        alloc::mark_used(dev, blocknr)?;
    }
    dev.sync_disk()?;
    Ok(())
}

impl<T: BlockStorage> ChainFs<T> {
    /// Checks once that the container at `path` exists, has the right size
    /// and holds a sane root directory.
    pub fn open<P: AsRef<Path>>(path: P, geometry: Geometry) -> Result<Self> {
        let path = path.as_ref();
        let mut dev = T::open_disk(path, &geometry)?;
        RootBlock::load(&mut dev, ROOT_BLOCK)?;
        debug!("opened {}", path.display());
        Ok(Self::with_allocator(path, geometry, BlockAllocator::new()))
    }

    /// Uses a caller-provided allocator, e.g. one with a preset cursor.
    pub fn with_allocator<P: AsRef<Path>>(
        path: P,
        geometry: Geometry,
        allocator: BlockAllocator,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            geometry,
            allocator,
            medium: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn open_disk(&self) -> Result<T> {
        T::open_disk(&self.path, &self.geometry)
    }

    pub fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
        debug!("getattr {}", path);
        let parsed = FsPath::parse(path);
        let directory = match parsed {
            FsPath::Root => return Ok(FileAttributes::directory()),
            FsPath::Invalid => return Err(FsError::NotFound),
            _ => parsed.directory().ok_or(FsError::NotFound)?,
        };

        let mut dev = self.open_disk()?;
        let root = RootBlock::load(&mut dev, ROOT_BLOCK)?;
        let entry = root.lookup_subdirectory(directory)?;
        let (basename, extension) = match parsed {
            FsPath::Directory(_) => return Ok(FileAttributes::directory()),
            FsPath::Bare { basename, .. } => (basename, ""),
            FsPath::File {
                basename,
                extension,
                ..
            } => (basename, extension),
            FsPath::Root | FsPath::Invalid => return Err(FsError::NotFound),
        };

        let dir = DirectoryBlock::load(&mut dev, entry.start_block)?;
        let file = dir.lookup_file(basename, extension)?;
        Ok(FileAttributes::regular_file(file.size))
    }

    /// Lists `.` and `..` followed by the subdirectories of `/` or the
    /// `basename.extension` names of the files in `/dir`.
    pub fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        debug!("readdir {}", path);
        let mut names = vec![".".to_string(), "..".to_string()];
        let parsed = FsPath::parse(path);
        if !matches!(parsed, FsPath::Root | FsPath::Directory(_)) {
            return Err(FsError::NotFound);
        }

        let mut dev = self.open_disk()?;
        let root = RootBlock::load(&mut dev, ROOT_BLOCK)?;
        match parsed {
            FsPath::Directory(directory) => {
                let entry = root.lookup_subdirectory(directory)?;
                let dir = DirectoryBlock::load(&mut dev, entry.start_block)?;
                names.extend(dir.entries().map(|file| file.file_name()));
            }
            _ => names.extend(root.entries().map(|entry| entry.name)),
        }
        Ok(names)
    }

    pub fn make_directory(&mut self, path: &str) -> Result<()> {
        debug!("mkdir {}", path);
        let directory = match FsPath::parse(path) {
            FsPath::Directory(directory) => directory,
            _ => return Err(FsError::NotPermitted),
        };
        dir::check_name(directory, MAX_FILENAME)?;

        let mut dev = self.open_disk()?;
        let mut root = RootBlock::load(&mut dev, ROOT_BLOCK)?;
        dir::create_subdirectory(&mut dev, &mut self.allocator, &mut root, directory)?;
        dev.sync_disk()?;
        Ok(())
    }

    pub fn make_file(&mut self, path: &str) -> Result<()> {
        debug!("mknod {}", path);
        let (directory, basename, extension) = match FsPath::parse(path) {
            FsPath::File {
                directory,
                basename,
                extension,
            } => (directory, basename, extension),
            _ => return Err(FsError::NotPermitted),
        };
        if directory.len() > MAX_FILENAME {
            return Err(FsError::NotFound);
        }
        dir::check_name(basename, MAX_FILENAME)?;
        dir::check_name(extension, MAX_EXTENSION)?;

        let mut dev = self.open_disk()?;
        let root = RootBlock::load(&mut dev, ROOT_BLOCK)?;
        let entry = root.lookup_subdirectory(directory)?;
        let mut dir = DirectoryBlock::load(&mut dev, entry.start_block)?;
        dir::create_file(
            &mut dev,
            &mut self.allocator,
            &mut dir,
            entry.start_block,
            basename,
            extension,
        )?;
        dev.sync_disk()?;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes of the file at `path` from `offset`.
    pub fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        debug!("read {} bytes at {} from {}", buf.len(), offset, path);
        if buf.is_empty() {
            return Err(FsError::NotPermitted);
        }
        let parsed = FsPath::parse(path);
        if parsed == FsPath::Root {
            return Err(FsError::IsDirectory);
        }

        let mut dev = self.open_disk()?;
        let root = RootBlock::load(&mut dev, ROOT_BLOCK)?;
        let (directory, basename, extension) = match parsed {
            FsPath::Directory(directory) => {
                root.lookup_subdirectory(directory)?;
                return Err(FsError::IsDirectory);
            }
            FsPath::File {
                directory,
                basename,
                extension,
            } => (directory, basename, extension),
            _ => return Err(FsError::NotFound),
        };

        let entry = root.lookup_subdirectory(directory)?;
        let dir = DirectoryBlock::load(&mut dev, entry.start_block)?;
        let file = dir.lookup_file(basename, extension)?;
        file::read(&mut dev, &file, buf, offset)
    }

    /// Writes `data` into the file at `path` from `offset` and grows its size
    /// when the write reaches past the old end.
    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> Result<usize> {
        debug!("write {} bytes at {} to {}", data.len(), offset, path);
        if data.is_empty() {
            return Err(FsError::NotPermitted);
        }
        let (directory, basename, extension) = match FsPath::parse(path) {
            FsPath::File {
                directory,
                basename,
                extension,
            } => (directory, basename, extension),
            _ => return Err(FsError::NotFound),
        };

        let mut dev = self.open_disk()?;
        let root = RootBlock::load(&mut dev, ROOT_BLOCK)?;
        let entry = root.lookup_subdirectory(directory)?;
        let mut dir = DirectoryBlock::load(&mut dev, entry.start_block)?;
        let file = dir.lookup_file(basename, extension)?;

        let written = file::write(&mut dev, &mut self.allocator, &file, data, offset)?;
        dir.grow_file(file.slot, offset + written as u64);
        dir.store(&mut dev, entry.start_block)?;
        dev.sync_disk()?;
        Ok(written)
    }

    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        debug!("rmdir {} ignored", path);
        Ok(())
    }

    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        debug!("unlink {} ignored", path);
        Ok(())
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        debug!("truncate {} to {} ignored", path, size);
        Ok(())
    }

    pub fn open_file(&self, path: &str) -> Result<()> {
        debug!("open {}", path);
        Ok(())
    }

    pub fn flush(&self, path: &str) -> Result<()> {
        debug!("flush {}", path);
        Ok(())
    }

    /// Walks every directory and file chain and compares what is reachable
    /// with the bitmap. The root and bitmap blocks are not part of the
    /// comparison.
    pub fn check(&self) -> Result<CheckReport> {
        let mut dev = self.open_disk()?;
        let data_blocks = self.geometry.data_blocks();
        let mut seen = vec![false; data_blocks];
        let mut report = CheckReport::default();

        let root = RootBlock::load(&mut dev, ROOT_BLOCK)?;
        for entry in root.entries() {
            report.directories += 1;
            if !visit(&mut seen, &mut report, entry.start_block)? {
                continue;
            }
            let dir = DirectoryBlock::load(&mut dev, entry.start_block)?;
            for file in dir.entries() {
                report.files += 1;
                let blocks = walk_chain(&mut dev, &mut seen, &mut report, &file)?;
                if (blocks * PAYLOAD_SIZE) < file.size as usize {
                    report
                        .short_files
                        .push(format!("{}/{}", entry.name, file.file_name()));
                }
            }
        }

        for (blocknr, &reached) in seen.iter().enumerate().skip(1) {
            match (reached, alloc::state(&mut dev, blocknr)?) {
                (true, State::Free) => report.unmarked.push(blocknr),
                (false, State::Used) => report.leaked.push(blocknr),
                _ => (),
            }
        }

        if !report.is_clean() {
            warn!("check of {} found inconsistencies", self.path.display());
        }
        Ok(report)
    }
}

/// Records a visit to `blocknr`. Returns false when the block was already
/// reached, so the caller stops following it.
fn visit(seen: &mut [bool], report: &mut CheckReport, blocknr: BlockNumber) -> Result<bool> {
    if blocknr == ROOT_BLOCK || blocknr >= seen.len() {
        return Err(FsError::InvalidBlock(blocknr));
    }
    if seen[blocknr] {
        report.shared.push(blocknr);
        return Ok(false);
    }
    seen[blocknr] = true;
    report.reachable_blocks += 1;
    Ok(true)
}

/// Follows one file chain and returns how many blocks it added.
fn walk_chain<T: BlockStorage>(
    dev: &mut T,
    seen: &mut [bool],
    report: &mut CheckReport,
    file: &FileEntry,
) -> Result<usize> {
    let mut next = Some(file.start_block);
    let mut blocks = 0;
    while let Some(blocknr) = next {
        if !visit(seen, report, blocknr)? {
            break;
        }
        blocks += 1;
        next = FileBlock::load(dev, blocknr)?.next();
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_SIZE;
    use tempfile::NamedTempFile;

    fn small_fs(blocks: u64) -> (NamedTempFile, ChainFs) {
        let tf = NamedTempFile::new().unwrap();
        let geometry = Geometry::new(blocks * BLOCK_SIZE as u64).unwrap();
        let fs = ChainFs::create(tf.path(), geometry).unwrap();
        (tf, fs)
    }

    #[test]
    fn create_marks_root_and_bitmap() {
        let (tf, fs) = small_fs(64);
        let mut dev = DiskImage::open_disk(tf.path(), fs.geometry()).unwrap();

        assert_eq!(alloc::state(&mut dev, 0).unwrap(), State::Used);
        assert_eq!(alloc::state(&mut dev, 63).unwrap(), State::Used);
        assert_eq!(alloc::state(&mut dev, 1).unwrap(), State::Free);
        assert!(RootBlock::load(&mut dev, ROOT_BLOCK).unwrap().is_empty());
    }

    #[test]
    fn attributes_of_directories_and_files() {
        let (_tf, mut fs) = small_fs(64);

        assert_eq!(fs.get_attributes("/").unwrap(), FileAttributes::directory());
        assert!(matches!(fs.get_attributes("/DOCS"), Err(FsError::NotFound)));

        fs.make_directory("/DOCS").unwrap();
        fs.make_file("/DOCS/notes.txt").unwrap();

        let attrs = fs.get_attributes("/DOCS").unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert_eq!((attrs.nlink, attrs.perm), (2, 0o755));

        let attrs = fs.get_attributes("/DOCS/notes.txt").unwrap();
        assert_eq!(attrs, FileAttributes::regular_file(0));
        assert_eq!((attrs.nlink, attrs.perm), (1, 0o666));

        assert!(matches!(fs.get_attributes("/DOCS/notes"), Err(FsError::NotFound)));
        assert!(matches!(fs.get_attributes("/DOCS/other.txt"), Err(FsError::NotFound)));
        assert!(matches!(fs.get_attributes("relative"), Err(FsError::NotFound)));
    }

    #[test]
    fn listings_start_with_dot_entries() {
        let (_tf, mut fs) = small_fs(64);
        assert_eq!(fs.list_directory("/").unwrap(), vec![".", ".."]);

        fs.make_directory("/a").unwrap();
        fs.make_directory("/b").unwrap();
        fs.make_file("/a/x.rs").unwrap();

        assert_eq!(fs.list_directory("/").unwrap(), vec![".", "..", "a", "b"]);
        assert_eq!(fs.list_directory("/a").unwrap(), vec![".", "..", "x.rs"]);
        assert_eq!(fs.list_directory("/b/").unwrap(), vec![".", ".."]);
        assert!(matches!(fs.list_directory("/a/x.rs"), Err(FsError::NotFound)));
        assert!(matches!(fs.list_directory("/c"), Err(FsError::NotFound)));
    }

    #[test]
    fn make_directory_rejects_bad_shapes() {
        let (_tf, mut fs) = small_fs(64);

        assert!(matches!(fs.make_directory("/"), Err(FsError::NotPermitted)));
        assert!(matches!(fs.make_directory("/a/b"), Err(FsError::NotPermitted)));
        assert!(matches!(fs.make_directory("/a/b.c"), Err(FsError::NotPermitted)));
        assert!(matches!(
            fs.make_directory("/ninechars"),
            Err(FsError::NameTooLong(_))
        ));

        fs.make_directory("/eightchr").unwrap();
        assert!(matches!(fs.make_directory("/eightchr"), Err(FsError::AlreadyExists)));
    }

    #[test]
    fn make_file_maps_errors_per_component() {
        let (_tf, mut fs) = small_fs(64);
        fs.make_directory("/d").unwrap();

        assert!(matches!(fs.make_file("/d"), Err(FsError::NotPermitted)));
        assert!(matches!(fs.make_file("/d/noext"), Err(FsError::NotPermitted)));
        assert!(matches!(fs.make_file("/ninechars/a.b"), Err(FsError::NotFound)));
        assert!(matches!(fs.make_file("/missing/a.b"), Err(FsError::NotFound)));
        assert!(matches!(
            fs.make_file("/d/ninechars.b"),
            Err(FsError::NameTooLong(_))
        ));
        assert!(matches!(fs.make_file("/d/a.four"), Err(FsError::NameTooLong(_))));

        fs.make_file("/d/a.b").unwrap();
        assert!(matches!(fs.make_file("/d/a.b"), Err(FsError::AlreadyExists)));
    }

    #[test]
    fn read_and_write_reject_non_files() {
        let (_tf, mut fs) = small_fs(64);
        fs.make_directory("/d").unwrap();
        fs.make_file("/d/f.txt").unwrap();
        let mut buf = [0; 16];

        assert!(matches!(fs.read("/", &mut buf, 0), Err(FsError::IsDirectory)));
        assert!(matches!(fs.read("/d", &mut buf, 0), Err(FsError::IsDirectory)));
        assert!(matches!(fs.read("/x", &mut buf, 0), Err(FsError::NotFound)));
        assert!(matches!(fs.read("/d/f", &mut buf, 0), Err(FsError::NotFound)));
        assert!(matches!(fs.read("/d/f.txt", &mut [], 0), Err(FsError::NotPermitted)));

        assert!(matches!(fs.write("/d", b"x", 0), Err(FsError::NotFound)));
        assert!(matches!(fs.write("/d/f", b"x", 0), Err(FsError::NotFound)));
        assert!(matches!(fs.write("/d/g.txt", b"x", 0), Err(FsError::NotFound)));
        assert!(matches!(fs.write("/d/f.txt", b"", 0), Err(FsError::NotPermitted)));
    }

    #[test]
    fn write_grows_size_and_reads_back() {
        let (_tf, mut fs) = small_fs(64);
        fs.make_directory("/d").unwrap();
        fs.make_file("/d/f.txt").unwrap();

        assert_eq!(fs.write("/d/f.txt", b"hello", 0).unwrap(), 5);
        assert_eq!(fs.write("/d/f.txt", b" world", 5).unwrap(), 6);
        assert_eq!(fs.get_attributes("/d/f.txt").unwrap().size, 11);

        // Overwriting inside the file leaves the size alone.
        fs.write("/d/f.txt", b"J", 0).unwrap();
        assert_eq!(fs.get_attributes("/d/f.txt").unwrap().size, 11);

        let mut buf = [0; 32];
        let n = fs.read("/d/f.txt", &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"Jello world");
        assert_eq!(fs.read("/d/f.txt", &mut buf, 11).unwrap(), 0);
        assert!(matches!(
            fs.read("/d/f.txt", &mut buf, 12),
            Err(FsError::OffsetTooLarge { offset: 12, size: 11 })
        ));
        assert!(matches!(
            fs.write("/d/f.txt", b"x", 12),
            Err(FsError::OffsetTooLarge { .. })
        ));
    }

    #[test]
    fn stubs_change_nothing() {
        let (_tf, mut fs) = small_fs(64);
        fs.make_directory("/d").unwrap();
        fs.make_file("/d/f.txt").unwrap();
        fs.write("/d/f.txt", b"data", 0).unwrap();

        fs.remove_file("/d/f.txt").unwrap();
        fs.remove_directory("/d").unwrap();
        fs.truncate("/d/f.txt", 0).unwrap();
        fs.open_file("/d/f.txt").unwrap();
        fs.flush("/d/f.txt").unwrap();

        assert_eq!(fs.get_attributes("/d/f.txt").unwrap().size, 4);
        assert_eq!(fs.list_directory("/d").unwrap(), vec![".", "..", "f.txt"]);
    }

    #[test]
    fn open_validates_the_container() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nothing");
        match ChainFs::<DiskImage>::open(&missing, Geometry::default()) {
            Err(err @ FsError::StoreNotFound(_)) => assert_eq!(err.errno(), libc::ENXIO),
            Err(err) => panic!("unexpected error {:?}", err),
            Ok(_) => panic!("opened a missing container"),
        }

        let (tf, _) = small_fs(64);
        let wrong = Geometry::new(128 * BLOCK_SIZE as u64).unwrap();
        assert!(matches!(
            ChainFs::<DiskImage>::open(tf.path(), wrong),
            Err(FsError::InvalidSize { actual: 32768, .. })
        ));
    }

    #[test]
    fn create_reports_where_it_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("disk");

        match ChainFs::create(&path, Geometry::default()) {
            Err(err @ FsError::StoreNotCreated(..)) => {
                assert_eq!(err.errno(), libc::EIO);
                assert!(err.to_string().contains("cannot create"));
            }
            Err(err) => panic!("unexpected error {:?}", err),
            Ok(_) => panic!("created a container in a missing directory"),
        }
    }

    #[test]
    fn errno_mapping() {
        let cases = [
            (FsError::NotFound, libc::ENOENT),
            (FsError::AlreadyExists, libc::EEXIST),
            (FsError::NoSpace, libc::ENOSPC),
            (FsError::NameTooLong("x".into()), libc::ENAMETOOLONG),
            (FsError::NotPermitted, libc::EPERM),
            (FsError::OffsetTooLarge { offset: 2, size: 1 }, libc::EFBIG),
            (FsError::IsDirectory, libc::EISDIR),
            (FsError::InvalidSize { expected: 1, actual: 2 }, libc::ENXIO),
            (FsError::InvalidBlock(7), libc::EIO),
            (
                FsError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
                libc::EIO,
            ),
        ];
        for (err, errno) in cases {
            assert_eq!(err.errno(), errno, "{}", err);
        }
    }

    #[test]
    fn check_reports_bitmap_mismatches() {
        let (tf, mut fs) = small_fs(64);
        fs.make_directory("/d").unwrap();
        fs.make_file("/d/f.txt").unwrap();
        fs.write("/d/f.txt", &[7; 600], 0).unwrap();

        let report = fs.check().unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!((report.directories, report.files), (1, 1));
        assert_eq!(report.reachable_blocks, 3);

        let mut dev = DiskImage::open_disk(tf.path(), fs.geometry()).unwrap();
        alloc::mark_used(&mut dev, 40).unwrap();
        alloc::mark_free(&mut dev, 3).unwrap();
        drop(dev);

        let report = fs.check().unwrap();
        assert_eq!(report.leaked, vec![40]);
        assert_eq!(report.unmarked, vec![3]);
        assert!(!report.is_clean());
    }
}
