//! Directory capability trait and the local-filesystem implementation.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use mime::Mime;
use tracing::warn;

////////////////////////////////////////////////////////////////////////////////
// #region Entries

/// Opaque address of one entry inside a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryLocator {
    /// Plain filesystem path.
    Path(PathBuf),
    /// Provider-addressed document (e.g. a content-tree URI).
    Uri(String),
}

/// One listed child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_directory: bool,
    pub last_modified: Option<SystemTime>,
    pub locator: EntryLocator,
}

impl FileEntry {
    /// Lowercased extension without the dot, if the name has one.
    pub fn extension_lowercase(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() && ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

/// Stable identity of a directory, used to visit each directory once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumDirectoryIdentity {
    /// Device and inode of the resolved directory.
    Inode { n_dev: u64, n_ino: u64 },
    /// Canonical path, where inodes are unavailable.
    Path(PathBuf),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Capability

/// Capability view of a directory the engine reads from or writes into.
///
/// Entries handed to `open_read`, `open_write`, `delete` and
/// `set_last_modified` come from this handle's tree (its own listing, a
/// listing of a directory opened through it, or `create_file`).
pub trait DirectoryHandle: Send + Sync {
    /// Human-readable name for logs and messages.
    fn display_name(&self) -> String;

    fn exists(&self) -> bool;

    fn can_read(&self) -> bool;

    /// Immediate children, files and directories alike.
    fn list_children(&self) -> io::Result<Vec<FileEntry>>;

    /// Handle for a child directory returned by `list_children`.
    fn open_directory(&self, entry: &FileEntry) -> io::Result<Box<dyn DirectoryHandle>>;

    fn open_read(&self, entry: &FileEntry) -> io::Result<Box<dyn Read + Send>>;

    /// Create an empty file named `name` directly under this directory.
    fn create_file(&self, mime_type: &Mime, name: &str) -> io::Result<FileEntry>;

    fn open_write(&self, entry: &FileEntry) -> io::Result<Box<dyn Write + Send>>;

    fn delete(&self, entry: &FileEntry) -> io::Result<()>;

    /// Identity of this directory after following links. Providers whose
    /// trees cannot contain cycles keep the default `None`.
    fn identity(&self) -> Option<EnumDirectoryIdentity> {
        None
    }

    /// Providers without writable timestamps keep the default no-op.
    fn set_last_modified(&self, _entry: &FileEntry, _time: SystemTime) -> io::Result<()> {
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LocalDirectory

/// `DirectoryHandle` over a plain filesystem directory.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    path_dir: PathBuf,
}

impl LocalDirectory {
    pub fn new<P: AsRef<Path>>(path_dir: P) -> Self {
        Self {
            path_dir: path_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path_dir
    }

    fn resolve<'a>(&self, entry: &'a FileEntry) -> io::Result<&'a Path> {
        match &entry.locator {
            EntryLocator::Path(path) => Ok(path),
            EntryLocator::Uri(uri) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Not a filesystem entry: {uri}"),
            )),
        }
    }

    fn derive_child_path(&self, name: &str) -> io::Result<PathBuf> {
        let mut iter_components = Path::new(name).components();
        let b_is_single_normal = matches!(iter_components.next(), Some(Component::Normal(_)))
            && iter_components.next().is_none();
        if !b_is_single_normal {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Unsafe destination file name: {name:?}"),
            ));
        }
        Ok(self.path_dir.join(name))
    }
}

impl DirectoryHandle for LocalDirectory {
    fn display_name(&self) -> String {
        self.path_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path_dir.display().to_string())
    }

    fn exists(&self) -> bool {
        self.path_dir.is_dir()
    }

    fn can_read(&self) -> bool {
        fs::read_dir(&self.path_dir).is_ok()
    }

    #[cfg(unix)]
    fn identity(&self) -> Option<EnumDirectoryIdentity> {
        use std::os::unix::fs::MetadataExt;
        let stat_dir = fs::metadata(&self.path_dir).ok()?;
        Some(EnumDirectoryIdentity::Inode {
            n_dev: stat_dir.dev(),
            n_ino: stat_dir.ino(),
        })
    }

    #[cfg(not(unix))]
    fn identity(&self) -> Option<EnumDirectoryIdentity> {
        fs::canonicalize(&self.path_dir)
            .ok()
            .map(EnumDirectoryIdentity::Path)
    }

    fn list_children(&self) -> io::Result<Vec<FileEntry>> {
        let mut l_entries = Vec::new();
        for entry_res in fs::read_dir(&self.path_dir)? {
            let entry = entry_res?;
            let path_entry = entry.path();
            let c_name = entry.file_name().to_string_lossy().to_string();

            // Follow symlinks so a linked directory is walked like a real one.
            let meta_entry = match fs::metadata(&path_entry) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping unreadable entry {} ({e})", path_entry.display());
                    continue;
                }
            };
            let b_is_dir = meta_entry.is_dir();
            if !b_is_dir && !meta_entry.is_file() {
                warn!("Special file skipped: {}", path_entry.display());
                continue;
            }

            l_entries.push(FileEntry {
                name: c_name,
                is_directory: b_is_dir,
                last_modified: meta_entry.modified().ok(),
                locator: EntryLocator::Path(path_entry),
            });
        }
        Ok(l_entries)
    }

    fn open_directory(&self, entry: &FileEntry) -> io::Result<Box<dyn DirectoryHandle>> {
        let path_dir_sub = self.resolve(entry)?;
        Ok(Box::new(LocalDirectory::new(path_dir_sub)))
    }

    fn open_read(&self, entry: &FileEntry) -> io::Result<Box<dyn Read + Send>> {
        let file = fs::File::open(self.resolve(entry)?)?;
        Ok(Box::new(file))
    }

    fn create_file(&self, _mime_type: &Mime, name: &str) -> io::Result<FileEntry> {
        let path_file_dst = self.derive_child_path(name)?;
        // `create_new` also refuses an existing symlink at the target name.
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path_file_dst)?;
        Ok(FileEntry {
            name: name.to_string(),
            is_directory: false,
            last_modified: None,
            locator: EntryLocator::Path(path_file_dst),
        })
    }

    fn open_write(&self, entry: &FileEntry) -> io::Result<Box<dyn Write + Send>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.resolve(entry)?)?;
        Ok(Box::new(file))
    }

    fn delete(&self, entry: &FileEntry) -> io::Result<()> {
        fs::remove_file(self.resolve(entry)?)
    }

    fn set_last_modified(&self, entry: &FileEntry, time: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(self.resolve(entry)?, FileTime::from_system_time(time))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
