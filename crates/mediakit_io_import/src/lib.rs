//! `mediakit_io_import` v1:
//! Media import engine for camera and phone storage.
//!
//! Modules:
//! - `copy`      : validation, orchestration and the background importer
//! - `handle`    : directory-provider abstraction and the local implementation
//! - `walk`      : recursive file enumeration
//! - `naming`    : date-prefixed destination names
//! - `reconcile` : existing/to-copy partition
//! - `report`    : progress model and stream
//! - `spec`      : enums/options/errors
//! - `util`      : extension filter, MIME lookup, timing helpers

pub mod copy;
pub mod handle;
pub mod naming;
pub mod reconcile;
pub mod report;
pub mod spec;
pub mod util;
pub mod walk;

#[cfg(test)]
mod test_util;

pub use copy::{EnumImportOutcome, MediaImporter, SpecImportRequest, run_import};
pub use handle::{
    DirectoryHandle, EntryLocator, EnumDirectoryIdentity, FileEntry, LocalDirectory,
};
pub use naming::compute_destination_name;
pub use reconcile::{SpecImportTask, SpecPartition, partition};
pub use report::{CopyProgress, ProgressPublisher, ProgressReporter, ProgressSink};
pub use spec::{
    EnumFileTypeCategory, EnumImportErrorKind, ImportError, SpecExtensionSet, SpecImportOptions,
};
pub use util::{filter_by_extension, mime_type_for};
pub use walk::list_all_files;
