//! Split candidates into "already present" and "to copy".

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handle::{DirectoryHandle, FileEntry};

/// One candidate paired with the destination name it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecImportTask {
    pub entry: FileEntry,
    pub name_dst: String,
}

/// Result of reconciling candidates against a destination listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecPartition {
    pub l_to_copy: Vec<SpecImportTask>,
    pub l_existing: Vec<SpecImportTask>,
}

impl SpecPartition {
    pub fn len(&self) -> usize {
        self.l_to_copy.len() + self.l_existing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify each candidate by whether its destination name is already taken.
///
/// `dir_dst` is listed once. A failed listing is treated as an empty
/// destination. Candidates that map to a name an earlier candidate will
/// create count as existing, so one run never creates a name twice.
/// Cancellation is polled every `n_per_cancel_check` candidates; a cancelled
/// run returns the partition gathered so far.
pub fn partition<F>(
    l_candidates: Vec<FileEntry>,
    dir_dst: &dyn DirectoryHandle,
    mut name_of: F,
    n_per_cancel_check: usize,
    token: &CancellationToken,
) -> SpecPartition
where
    F: FnMut(&FileEntry) -> String,
{
    let mut set_names_dst = match dir_dst.list_children() {
        Ok(l_entries) => l_entries
            .into_iter()
            .map(|entry| entry.name)
            .collect::<HashSet<_>>(),
        Err(e) => {
            warn!(
                "Failed to list destination {} ({e}); treating it as empty",
                dir_dst.display_name()
            );
            HashSet::new()
        }
    };

    let n_per_cancel_check = n_per_cancel_check.max(1);
    let n_candidates = l_candidates.len();
    let mut spec_partition = SpecPartition::default();
    for (idx, entry) in l_candidates.into_iter().enumerate() {
        if idx % n_per_cancel_check == 0 && token.is_cancelled() {
            debug!("Reconciliation cancelled after {idx} of {n_candidates} candidates");
            return spec_partition;
        }

        let name_dst = name_of(&entry);
        let b_is_new = set_names_dst.insert(name_dst.clone());
        let spec_task = SpecImportTask { entry, name_dst };
        if b_is_new {
            spec_partition.l_to_copy.push(spec_task);
        } else {
            spec_partition.l_existing.push(spec_task);
        }
    }

    info!(
        "Pre-calculation: {} total, {} exist, {} to copy",
        n_candidates,
        spec_partition.l_existing.len(),
        spec_partition.l_to_copy.len()
    );
    spec_partition
}
