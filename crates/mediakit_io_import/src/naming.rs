//! Date-prefixed destination names.

use std::io::{self, Cursor, Read};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Tag, Value};
use tracing::debug;

use crate::handle::FileEntry;

/// Extensions probed for embedded capture metadata.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tiff", "tif", "webp", "gif", "bmp", "dng", "cr2", "nef", "arw", "raf",
    "orf", "rw2", "pef", "srw",
];

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const PREFIX_DATE_FORMAT: &str = "%Y%m%d";

/// Destination name `{yyyyMMdd}-{original name}`.
///
/// The date is the embedded capture date for images, else the entry's
/// last-modified time, else the current time. `open_stream` is only called for
/// image extensions; any failure while reading metadata falls through to the
/// next source.
pub fn compute_destination_name<F, R>(
    entry: &FileEntry,
    open_stream: F,
    n_bytes_probe: u64,
) -> String
where
    F: FnOnce() -> io::Result<R>,
    R: Read,
{
    compute_destination_name_at(entry, open_stream, n_bytes_probe, Local::now().naive_local())
}

pub(crate) fn compute_destination_name_at<F, R>(
    entry: &FileEntry,
    open_stream: F,
    n_bytes_probe: u64,
    dt_now: NaiveDateTime,
) -> String
where
    F: FnOnce() -> io::Result<R>,
    R: Read,
{
    let dt_capture = resolve_capture_date(entry, open_stream, n_bytes_probe).unwrap_or(dt_now);
    format!("{}-{}", dt_capture.format(PREFIX_DATE_FORMAT), entry.name)
}

fn resolve_capture_date<F, R>(
    entry: &FileEntry,
    open_stream: F,
    n_bytes_probe: u64,
) -> Option<NaiveDateTime>
where
    F: FnOnce() -> io::Result<R>,
    R: Read,
{
    let b_is_image = entry
        .extension_lowercase()
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
    if b_is_image
        && let Some(dt) = read_exif_capture_date(&entry.name, open_stream, n_bytes_probe)
    {
        return Some(dt);
    }

    entry
        .last_modified
        .filter(|time| *time > UNIX_EPOCH)
        .map(|time| DateTime::<Local>::from(time).naive_local())
}

fn read_exif_capture_date<F, R>(
    name: &str,
    open_stream: F,
    n_bytes_probe: u64,
) -> Option<NaiveDateTime>
where
    F: FnOnce() -> io::Result<R>,
    R: Read,
{
    let mut raw_head = Vec::new();
    if let Err(e) =
        open_stream().and_then(|reader| reader.take(n_bytes_probe).read_to_end(&mut raw_head))
    {
        debug!("Metadata read failed for {name} ({e}); using file time");
        return None;
    }

    let exif_data = match exif::Reader::new().read_from_container(&mut Cursor::new(raw_head)) {
        Ok(v) => v,
        Err(e) => {
            debug!("No capture metadata in {name} ({e}); using file time");
            return None;
        }
    };

    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .find_map(|tag| parse_exif_datetime(&exif_data.get_field(tag, In::PRIMARY)?.value))
}

fn parse_exif_datetime(value: &Value) -> Option<NaiveDateTime> {
    let Value::Ascii(l_parts) = value else {
        return None;
    };
    let txt = std::str::from_utf8(l_parts.first()?).ok()?;
    NaiveDateTime::parse_from_str(txt.trim_end_matches('\0').trim(), EXIF_DATE_FORMAT).ok()
}
