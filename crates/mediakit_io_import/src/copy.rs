//! Import engine: validate, scan, reconcile, copy.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::handle::{DirectoryHandle, FileEntry};
use crate::naming::compute_destination_name;
use crate::reconcile::{SpecImportTask, partition};
use crate::report::{CopyProgress, ProgressReporter, ProgressSink};
use crate::spec::{ImportError, SpecExtensionSet, SpecImportOptions};
use crate::util::{
    estimate_seconds_remaining, filter_by_extension, is_device_provider_error, mime_type_for,
};
use crate::walk::list_all_files;

pub const MESSAGE_SCANNING_SOURCE: &str = "Scanning source directory...";
pub const MESSAGE_CHECKING_DESTINATION: &str = "Checking for existing files in destination...";

const LABEL_SOURCE: &str = "Source";
const LABEL_DESTINATION: &str = "Destination";

////////////////////////////////////////////////////////////////////////////////
// #region Request

/// Everything one import run needs. Handles may be absent when the caller
/// never picked a directory; that is reported as a validation error.
#[derive(Clone)]
pub struct SpecImportRequest {
    pub dir_source: Option<Arc<dyn DirectoryHandle>>,
    pub dir_destination: Option<Arc<dyn DirectoryHandle>>,
    pub set_extensions: SpecExtensionSet,
}

impl SpecImportRequest {
    pub fn new(
        dir_source: Arc<dyn DirectoryHandle>,
        dir_destination: Arc<dyn DirectoryHandle>,
        set_extensions: SpecExtensionSet,
    ) -> Self {
        Self {
            dir_source: Some(dir_source),
            dir_destination: Some(dir_destination),
            set_extensions,
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumImportOutcome {
    Complete {
        existing_files: usize,
        files_to_copy: usize,
    },
    Cancelled,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Engine

/// Run one import to completion on the calling thread.
///
/// Every run ends with exactly one terminal state published to `sink`.
pub fn run_import(
    request: &SpecImportRequest,
    options: &SpecImportOptions,
    token: &CancellationToken,
    sink: &mut dyn ProgressSink,
) {
    let progress_terminal = match import_media(request, options, token, sink) {
        Ok(EnumImportOutcome::Complete {
            existing_files,
            files_to_copy,
        }) => {
            info!("Import complete: {files_to_copy} copied, {existing_files} already present");
            CopyProgress::Complete {
                existing_files,
                files_to_copy,
            }
        }
        Ok(EnumImportOutcome::Cancelled) => {
            info!("Import cancelled");
            CopyProgress::Cancelled
        }
        Err(e) => {
            error!("Import failed ({:?}): {e}", e.kind());
            CopyProgress::Error {
                message: e.to_string(),
            }
        }
    };
    sink.publish(progress_terminal);
}

fn import_media(
    request: &SpecImportRequest,
    options: &SpecImportOptions,
    token: &CancellationToken,
    sink: &mut dyn ProgressSink,
) -> Result<EnumImportOutcome, ImportError> {
    if request.set_extensions.is_empty() {
        return Err(ImportError::EmptyExtensionSet);
    }
    let dir_source = probe_directory(request.dir_source.as_deref(), LABEL_SOURCE)?;
    let dir_dst = probe_directory(request.dir_destination.as_deref(), LABEL_DESTINATION)?;

    sink.publish(CopyProgress::Scanning {
        message: MESSAGE_SCANNING_SOURCE.to_string(),
    });
    let l_files = list_all_files(dir_source, token)?;
    if token.is_cancelled() {
        return Ok(EnumImportOutcome::Cancelled);
    }
    let l_candidates = filter_by_extension(l_files, &request.set_extensions)?;
    info!("Found {} matching files", l_candidates.len());
    if l_candidates.is_empty() {
        return Err(ImportError::NoMatchingFiles {
            label: request.set_extensions.label(),
        });
    }

    sink.publish(CopyProgress::Scanning {
        message: MESSAGE_CHECKING_DESTINATION.to_string(),
    });
    let spec_partition = partition(
        l_candidates,
        dir_dst,
        |entry| {
            compute_destination_name(
                entry,
                || dir_source.open_read(entry),
                options.n_bytes_exif_probe,
            )
        },
        options.n_candidates_per_cancel_check,
        token,
    );
    if token.is_cancelled() {
        return Ok(EnumImportOutcome::Cancelled);
    }

    let n_existing = spec_partition.l_existing.len();
    let n_to_copy = spec_partition.l_to_copy.len();
    if n_to_copy == 0 {
        return Ok(EnumImportOutcome::Complete {
            existing_files: n_existing,
            files_to_copy: 0,
        });
    }

    sink.publish(CopyProgress::Ready {
        total_files: n_to_copy,
        existing_files: n_existing,
        files_to_copy: n_to_copy,
    });
    copy_all(
        dir_source,
        dir_dst,
        &spec_partition.l_to_copy,
        n_existing,
        options,
        token,
        sink,
    )
}

/// Presence, readability and a probe listing, in that order.
fn probe_directory<'a>(
    dir: Option<&'a dyn DirectoryHandle>,
    label: &'static str,
) -> Result<&'a dyn DirectoryHandle, ImportError> {
    let Some(dir) = dir else {
        return Err(ImportError::DirectoryMissing { label });
    };
    if !dir.exists() {
        return Err(ImportError::DirectoryNotFound { label });
    }
    if !dir.can_read() {
        return Err(ImportError::DirectoryNotReadable { label });
    }
    match dir.list_children() {
        Ok(l_entries) => {
            debug!(
                "{label} directory accessible, contains {} items",
                l_entries.len()
            );
            Ok(dir)
        }
        Err(e) if is_device_provider_error(&e) => {
            Err(ImportError::DeviceProbeFailed { label, source: e })
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(ImportError::ProbeDenied { label, source: e })
        }
        Err(e) => Err(ImportError::ProbeFailed { label, source: e }),
    }
}

fn copy_all(
    dir_source: &dyn DirectoryHandle,
    dir_dst: &dyn DirectoryHandle,
    l_to_copy: &[SpecImportTask],
    n_existing: usize,
    options: &SpecImportOptions,
    token: &CancellationToken,
    sink: &mut dyn ProgressSink,
) -> Result<EnumImportOutcome, ImportError> {
    let n_total = l_to_copy.len();
    let time_start = Instant::now();

    for (idx, spec_task) in l_to_copy.iter().enumerate() {
        if token.is_cancelled() {
            info!("Copy cancelled after {idx} of {n_total} files");
            return Ok(EnumImportOutcome::Cancelled);
        }
        copy_one(dir_source, dir_dst, spec_task, options)?;
        // The file in flight is kept; only its progress update is skipped.
        if token.is_cancelled() {
            info!("Copy cancelled after {} of {n_total} files", idx + 1);
            return Ok(EnumImportOutcome::Cancelled);
        }

        let n_done = idx + 1;
        sink.publish(CopyProgress::Copying {
            current_file: n_done,
            total_files: n_total,
            progress: n_done as f32 / n_total as f32,
            current_file_name: spec_task.entry.name.clone(),
            estimated_seconds_remaining: estimate_seconds_remaining(
                time_start.elapsed(),
                n_done,
                n_total,
            ),
            existing_files: n_existing,
            files_to_copy: n_total,
        });
    }

    Ok(EnumImportOutcome::Complete {
        existing_files: n_existing,
        files_to_copy: n_total,
    })
}

/// Create, stream, stamp. A partially written file is deleted on failure.
fn copy_one(
    dir_source: &dyn DirectoryHandle,
    dir_dst: &dyn DirectoryHandle,
    spec_task: &SpecImportTask,
    options: &SpecImportOptions,
) -> Result<(), ImportError> {
    let entry = &spec_task.entry;
    let mime_type = mime_type_for(entry);
    let entry_dst = dir_dst
        .create_file(&mime_type, &spec_task.name_dst)
        .map_err(|e| classify_copy_error(&entry.name, e))?;

    let n_bytes = match transfer_bytes(dir_source, dir_dst, entry, &entry_dst) {
        Ok(n) => n,
        Err(e) => {
            if let Err(e_delete) = dir_dst.delete(&entry_dst) {
                warn!(
                    "Failed to remove partial file {} ({e_delete})",
                    spec_task.name_dst
                );
            }
            return Err(classify_copy_error(&entry.name, e));
        }
    };

    if options.if_preserve_modified_time
        && let Some(time) = entry.last_modified
        && let Err(e) = dir_dst.set_last_modified(&entry_dst, time)
    {
        warn!(
            "Failed to preserve modified time of {} ({e})",
            spec_task.name_dst
        );
    }
    debug!(
        "Copied {} -> {} ({n_bytes} bytes, {mime_type})",
        entry.name, spec_task.name_dst
    );
    Ok(())
}

fn transfer_bytes(
    dir_source: &dyn DirectoryHandle,
    dir_dst: &dyn DirectoryHandle,
    entry_src: &FileEntry,
    entry_dst: &FileEntry,
) -> io::Result<u64> {
    let mut reader = dir_source.open_read(entry_src)?;
    let mut writer = dir_dst.open_write(entry_dst)?;
    let n_bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(n_bytes)
}

fn classify_copy_error(name: &str, err: io::Error) -> ImportError {
    if err.kind() == io::ErrorKind::PermissionDenied || is_device_provider_error(&err) {
        ImportError::FileAccessDenied {
            name: name.to_string(),
            source: err,
        }
    } else {
        ImportError::FileCopyFailed {
            name: name.to_string(),
            source: err,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MediaImporter

struct ImportWorker {
    token: CancellationToken,
    join_handle: JoinHandle<()>,
}

/// Background front-end: one import at a time, observable through a
/// last-value-wins progress stream.
///
/// Starting a new import cancels the running one; the new worker waits for
/// the old one to exit before touching any directory.
pub struct MediaImporter {
    reporter: Arc<ProgressReporter>,
    spec_options: SpecImportOptions,
    worker: Mutex<Option<ImportWorker>>,
}

impl Default for MediaImporter {
    fn default() -> Self {
        Self::new(SpecImportOptions::default())
    }
}

impl MediaImporter {
    pub fn new(spec_options: SpecImportOptions) -> Self {
        Self {
            reporter: ProgressReporter::new(),
            spec_options,
            worker: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CopyProgress> {
        self.reporter.subscribe()
    }

    pub fn progress(&self) -> CopyProgress {
        self.reporter.current()
    }

    /// Whether a worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|worker| !worker.join_handle.is_finished())
    }

    /// Launch an import in the background. Outcomes, including validation
    /// failures, arrive on the progress stream.
    pub fn start_copying(&self, request: SpecImportRequest) {
        let mut slot_worker = self.lock_worker();
        let worker_prev = slot_worker.take();
        if let Some(worker) = &worker_prev {
            info!("Superseding running import");
            worker.token.cancel();
        }

        let token = CancellationToken::new();
        let mut publisher = self.reporter.begin(token.clone());
        let spec_options = self.spec_options.clone();
        let token_worker = token.clone();
        let join_prev = worker_prev.map(|worker| worker.join_handle);

        let res_spawn = thread::Builder::new()
            .name(self.spec_options.name_worker_thread.clone())
            .spawn(move || {
                if let Some(join_prev) = join_prev
                    && join_prev.join().is_err()
                {
                    warn!("Previous import worker panicked");
                }
                run_import(&request, &spec_options, &token_worker, &mut publisher);
            });

        match res_spawn {
            Ok(join_handle) => {
                *slot_worker = Some(ImportWorker { token, join_handle });
            }
            Err(e) => {
                let err = ImportError::WorkerSpawnFailed(e);
                error!("{err}");
                self.reporter.begin(token).publish(CopyProgress::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Request cancellation. The worker publishes `Cancelled` at its next
    /// checkpoint; a file already being copied is finished first.
    pub fn cancel(&self) {
        if let Some(worker) = self.lock_worker().as_ref() {
            info!("Cancelling import");
            worker.token.cancel();
        }
    }

    /// Block until the current worker, if any, has exited.
    pub fn join(&self) {
        let worker = self.lock_worker().take();
        if let Some(worker) = worker
            && worker.join_handle.join().is_err()
        {
            warn!("Import worker panicked");
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<ImportWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancels the running import and waits for its worker, so no file is
/// written after the importer is gone. A file in flight is finished first.
impl Drop for MediaImporter {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
