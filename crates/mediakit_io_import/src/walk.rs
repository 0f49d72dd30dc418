//! Recursive file enumeration with cooperative cancellation.

use std::collections::HashSet;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::handle::{DirectoryHandle, EnumDirectoryIdentity, FileEntry};
use crate::spec::ImportError;
use crate::util::is_device_provider_error;

/// List every file under `dir_root`, at any depth.
///
/// Within one directory, files come before sub-directory contents, each group
/// sorted by name. Cancellation is polled before each directory's listing and
/// before each descent; a cancelled walk returns what it gathered so far.
/// A directory reached twice through links is walked once.
/// Listing failures abort the walk.
pub fn list_all_files(
    dir_root: &dyn DirectoryHandle,
    token: &CancellationToken,
) -> Result<Vec<FileEntry>, ImportError> {
    let mut l_files = Vec::new();
    let mut set_visited_dirs = HashSet::new();
    walk_directory(dir_root, token, &mut set_visited_dirs, &mut l_files)?;
    Ok(l_files)
}

fn walk_directory(
    dir: &dyn DirectoryHandle,
    token: &CancellationToken,
    set_visited_dirs: &mut HashSet<EnumDirectoryIdentity>,
    l_files: &mut Vec<FileEntry>,
) -> Result<(), ImportError> {
    if token.is_cancelled() {
        debug!("File discovery cancelled");
        return Ok(());
    }
    if let Some(identity_dir) = dir.identity()
        && !set_visited_dirs.insert(identity_dir)
    {
        warn!("Symlink loop detected: {}", dir.display_name());
        return Ok(());
    }

    let l_entries = dir.list_children().map_err(classify_scan_error)?;
    debug!(
        "Scanning directory: {} ({} items)",
        dir.display_name(),
        l_entries.len()
    );

    let (mut l_dirs, mut l_files_here): (Vec<_>, Vec<_>) =
        l_entries.into_iter().partition(|entry| entry.is_directory);
    l_dirs.sort_by(|a, b| a.name.cmp(&b.name));
    l_files_here.sort_by(|a, b| a.name.cmp(&b.name));
    l_files.append(&mut l_files_here);

    for entry_dir in l_dirs {
        if token.is_cancelled() {
            debug!("File discovery cancelled");
            return Ok(());
        }
        let dir_sub = dir.open_directory(&entry_dir).map_err(classify_scan_error)?;
        walk_directory(dir_sub.as_ref(), token, set_visited_dirs, l_files)?;
    }
    Ok(())
}

fn classify_scan_error(err: io::Error) -> ImportError {
    if is_device_provider_error(&err) {
        ImportError::DeviceScanFailed { source: err }
    } else if err.kind() == io::ErrorKind::PermissionDenied {
        ImportError::ScanDenied { source: err }
    } else {
        ImportError::ScanFailed { source: err }
    }
}
