/// A protocol path split into the two-level naming scheme.
///
/// Parsing follows the `/dir/base.ext` shape: the first component names a
/// subdirectory, the second is split at its first `.` into basename and
/// extension. Lengths are not checked here since each operation reports
/// overlong names differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsPath<'a> {
    /// `/`
    Root,
    /// `/dir` or `/dir/`
    Directory(&'a str),
    /// `/dir/base` or `/dir/base.` without an extension.
    Bare { directory: &'a str, basename: &'a str },
    /// `/dir/base.ext`
    File {
        directory: &'a str,
        basename: &'a str,
        extension: &'a str,
    },
    /// Anything else: relative paths, empty components, deeper nesting.
    Invalid,
}

impl<'a> FsPath<'a> {
    pub fn parse(path: &'a str) -> Self {
        let rest = match path.strip_prefix('/') {
            Some(rest) => rest,
            None => return FsPath::Invalid,
        };
        if rest.is_empty() {
            return FsPath::Root;
        }

        let (directory, rest) = match rest.split_once('/') {
            Some((directory, rest)) => (directory, rest),
            None => (rest, ""),
        };
        if directory.is_empty() {
            return FsPath::Invalid;
        }

        let (basename, extension) = match rest.split_once('.') {
            Some((basename, extension)) => (basename, extension),
            None => (rest, ""),
        };
        // `/dir/` and `/dir/.ext` carry no file name at all.
        if basename.is_empty() {
            return FsPath::Directory(directory);
        }
        if basename.contains('/') || extension.contains('/') {
            return FsPath::Invalid;
        }
        if extension.is_empty() {
            return FsPath::Bare {
                directory,
                basename,
            };
        }
        FsPath::File {
            directory,
            basename,
            extension,
        }
    }

    /// The subdirectory the path points into, if any.
    pub fn directory(&self) -> Option<&'a str> {
        match *self {
            FsPath::Directory(directory)
            | FsPath::Bare { directory, .. }
            | FsPath::File { directory, .. } => Some(directory),
            FsPath::Root | FsPath::Invalid => None,
        }
    }
}
