//! Fixtures shared by the unit tests.

use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::SystemTime;

use chrono::{Local, NaiveDate, NaiveDateTime};
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use filetime::FileTime;
use mime::Mime;
use tokio_util::sync::CancellationToken;

use crate::handle::{
    DirectoryHandle, EntryLocator, EnumDirectoryIdentity, FileEntry, LocalDirectory,
};
use crate::report::{CopyProgress, ProgressSink};

////////////////////////////////////////////////////////////////////////////////
// #region Files

pub(crate) fn system_time_from_local(dt: NaiveDateTime) -> Option<SystemTime> {
    dt.and_local_timezone(Local).single().map(SystemTime::from)
}

pub(crate) fn local_noon(y: i32, m: u32, d: u32) -> SystemTime {
    let dt = NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .expect("valid date");
    system_time_from_local(dt).expect("unambiguous local time")
}

pub(crate) fn write_file(path: &Path, raw: &[u8], modified: Option<SystemTime>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, raw).expect("write file");
    if let Some(time) = modified {
        filetime::set_file_mtime(path, FileTime::from_system_time(time)).expect("set mtime");
    }
}

/// Big-endian TIFF blob carrying the given date tags.
pub(crate) fn tiff_with_exif(date_original: Option<&str>, date_time: Option<&str>) -> Vec<u8> {
    let mut l_fields = Vec::new();
    if let Some(txt) = date_time {
        l_fields.push(Field {
            tag: Tag::DateTime,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![txt.as_bytes().to_vec()]),
        });
    }
    if let Some(txt) = date_original {
        l_fields.push(Field {
            tag: Tag::DateTimeOriginal,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![txt.as_bytes().to_vec()]),
        });
    }

    let mut writer = Writer::new();
    for field in &l_fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).expect("write exif");
    buf.into_inner()
}

/// Minimal JPEG: SOI, one APP1 Exif segment, EOI.
pub(crate) fn jpeg_with_exif(date_original: Option<&str>, date_time: Option<&str>) -> Vec<u8> {
    let raw_tiff = tiff_with_exif(date_original, date_time);
    let n_len = u16::try_from(raw_tiff.len() + 8).expect("segment fits");

    let mut raw = vec![0xFF, 0xD8, 0xFF, 0xE1];
    raw.extend_from_slice(&n_len.to_be_bytes());
    raw.extend_from_slice(b"Exif\0\0");
    raw.extend_from_slice(&raw_tiff);
    raw.extend_from_slice(&[0xFF, 0xD9]);
    raw
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Sinks

/// Keeps every published state in order.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub(crate) l_progress: Vec<CopyProgress>,
}

impl ProgressSink for RecordingSink {
    fn publish(&mut self, progress: CopyProgress) {
        self.l_progress.push(progress);
    }
}

impl RecordingSink {
    pub(crate) fn last(&self) -> &CopyProgress {
        self.l_progress.last().expect("at least one state")
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FaultyDirectory

pub(crate) enum EnumFault {
    /// Root listing succeeds `n_ok_calls` times, then fails.
    ListRoot {
        n_ok_calls: usize,
        kind: io::ErrorKind,
        message: String,
    },
    /// Listing the named sub-directory fails.
    ListSubdirectory(String, io::ErrorKind, String),
    /// Every listing cancels the token first.
    CancelOnList(CancellationToken),
    /// Reading the named file yields `n_bytes_ok` bytes, then fails.
    ReadFile {
        name: String,
        n_bytes_ok: usize,
        kind: io::ErrorKind,
    },
    /// Writing a file whose name ends with the suffix fails after `n_bytes_ok` bytes.
    WriteFile {
        name_suffix: String,
        n_bytes_ok: usize,
    },
    /// Opening a matching file for writing cancels the token.
    CancelOnWrite(String, CancellationToken),
    /// Opening a matching file for writing signals `tx_reached` and waits on `rx_resume`.
    GateOnWrite {
        name_suffix: String,
        tx_reached: mpsc::Sender<()>,
        rx_resume: Mutex<mpsc::Receiver<()>>,
    },
}

/// `LocalDirectory` wrapper that injects provider failures.
pub(crate) struct FaultyDirectory {
    inner: LocalDirectory,
    name_dir: Option<String>,
    l_faults: Arc<Vec<EnumFault>>,
    n_root_lists: Arc<AtomicUsize>,
    l_created: Arc<Mutex<Vec<(String, String)>>>,
}

impl FaultyDirectory {
    pub(crate) fn new(inner: LocalDirectory) -> Self {
        Self {
            inner,
            name_dir: None,
            l_faults: Arc::new(Vec::new()),
            n_root_lists: Arc::new(AtomicUsize::new(0)),
            l_created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_fault(mut self, fault: EnumFault) -> Self {
        Arc::get_mut(&mut self.l_faults)
            .expect("faults are added before the handle is shared")
            .push(fault);
        self
    }

    /// `(name, mime essence)` of every file created through this handle.
    pub(crate) fn created(&self) -> Vec<(String, String)> {
        self.l_created.lock().expect("lock").clone()
    }
}

struct FailingReader {
    inner: Box<dyn Read + Send>,
    n_left: usize,
    kind: io::ErrorKind,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.n_left == 0 {
            return Err(io::Error::new(self.kind, "device disconnected"));
        }
        let n_max = buf.len().min(self.n_left);
        let n_read = self.inner.read(&mut buf[..n_max])?;
        self.n_left -= n_read;
        Ok(n_read)
    }
}

struct FailingWriter {
    inner: Box<dyn Write + Send>,
    n_left: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.n_left == 0 {
            return Err(io::Error::other("no space left on device"));
        }
        let n_max = buf.len().min(self.n_left);
        let n_written = self.inner.write(&buf[..n_max])?;
        self.n_left -= n_written;
        Ok(n_written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl DirectoryHandle for FaultyDirectory {
    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    fn exists(&self) -> bool {
        self.inner.exists()
    }

    fn can_read(&self) -> bool {
        self.inner.can_read()
    }

    fn identity(&self) -> Option<EnumDirectoryIdentity> {
        self.inner.identity()
    }

    fn list_children(&self) -> io::Result<Vec<FileEntry>> {
        for fault in self.l_faults.iter() {
            match fault {
                EnumFault::CancelOnList(token) => token.cancel(),
                EnumFault::ListRoot {
                    n_ok_calls,
                    kind,
                    message,
                } if self.name_dir.is_none() => {
                    if self.n_root_lists.fetch_add(1, Ordering::SeqCst) >= *n_ok_calls {
                        return Err(io::Error::new(*kind, message.clone()));
                    }
                }
                EnumFault::ListSubdirectory(name, kind, message)
                    if self.name_dir.as_deref() == Some(name.as_str()) =>
                {
                    return Err(io::Error::new(*kind, message.clone()));
                }
                _ => {}
            }
        }
        self.inner.list_children()
    }

    fn open_directory(&self, entry: &FileEntry) -> io::Result<Box<dyn DirectoryHandle>> {
        let EntryLocator::Path(path) = &entry.locator else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a path"));
        };
        Ok(Box::new(FaultyDirectory {
            inner: LocalDirectory::new(path),
            name_dir: Some(entry.name.clone()),
            l_faults: Arc::clone(&self.l_faults),
            n_root_lists: Arc::clone(&self.n_root_lists),
            l_created: Arc::clone(&self.l_created),
        }))
    }

    fn open_read(&self, entry: &FileEntry) -> io::Result<Box<dyn Read + Send>> {
        let reader = self.inner.open_read(entry)?;
        for fault in self.l_faults.iter() {
            if let EnumFault::ReadFile {
                name,
                n_bytes_ok,
                kind,
            } = fault
                && *name == entry.name
            {
                return Ok(Box::new(FailingReader {
                    inner: reader,
                    n_left: *n_bytes_ok,
                    kind: *kind,
                }));
            }
        }
        Ok(reader)
    }

    fn create_file(&self, mime_type: &Mime, name: &str) -> io::Result<FileEntry> {
        let entry = self.inner.create_file(mime_type, name)?;
        self.l_created
            .lock()
            .expect("lock")
            .push((name.to_string(), mime_type.essence_str().to_string()));
        Ok(entry)
    }

    fn open_write(&self, entry: &FileEntry) -> io::Result<Box<dyn Write + Send>> {
        let writer = self.inner.open_write(entry)?;
        for fault in self.l_faults.iter() {
            match fault {
                EnumFault::WriteFile {
                    name_suffix,
                    n_bytes_ok,
                } if entry.name.ends_with(name_suffix.as_str()) => {
                    return Ok(Box::new(FailingWriter {
                        inner: writer,
                        n_left: *n_bytes_ok,
                    }));
                }
                EnumFault::CancelOnWrite(name_suffix, token)
                    if entry.name.ends_with(name_suffix.as_str()) =>
                {
                    token.cancel();
                }
                EnumFault::GateOnWrite {
                    name_suffix,
                    tx_reached,
                    rx_resume,
                } if entry.name.ends_with(name_suffix.as_str()) => {
                    tx_reached.send(()).expect("test waits for gate");
                    rx_resume
                        .lock()
                        .expect("lock")
                        .recv()
                        .expect("test resumes gate");
                }
                _ => {}
            }
        }
        Ok(writer)
    }

    fn delete(&self, entry: &FileEntry) -> io::Result<()> {
        self.inner.delete(entry)
    }

    fn set_last_modified(&self, entry: &FileEntry, time: SystemTime) -> io::Result<()> {
        self.inner.set_last_modified(entry, time)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
