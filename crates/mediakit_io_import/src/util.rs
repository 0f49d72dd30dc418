use std::io;
use std::sync::LazyLock;
use std::time::Duration;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use mime::Mime;
use regex::Regex;

use crate::handle::FileEntry;
use crate::spec::{ImportError, SpecExtensionSet};

////////////////////////////////////////////////////////////////////////////////
// #region ExtensionFilter

/// Compiled case-insensitive suffix matcher for an extension set.
#[derive(Debug, Clone)]
pub(crate) struct ExtensionMatcher {
    glob_set: GlobSet,
}

impl ExtensionMatcher {
    pub(crate) fn compile(set_extensions: &SpecExtensionSet) -> Result<Self, ImportError> {
        if set_extensions.is_empty() {
            return Err(ImportError::EmptyExtensionSet);
        }

        let mut builder = GlobSetBuilder::new();
        for ext in set_extensions.iter() {
            let glob = GlobBuilder::new(&format!("*{}", globset::escape(ext)))
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| ImportError::InvalidExtension {
                    extension: ext.to_string(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
        }
        let glob_set = builder.build().map_err(|e| ImportError::InvalidExtension {
            extension: set_extensions.label(),
            message: e.to_string(),
        })?;
        Ok(Self { glob_set })
    }

    pub(crate) fn is_match(&self, name: &str) -> bool {
        self.glob_set.is_match(name)
    }
}

/// Keep only non-directory entries whose name ends with a configured extension.
pub fn filter_by_extension(
    l_files: Vec<FileEntry>,
    set_extensions: &SpecExtensionSet,
) -> Result<Vec<FileEntry>, ImportError> {
    let matcher = ExtensionMatcher::compile(set_extensions)?;
    Ok(l_files
        .into_iter()
        .filter(|entry| !entry.is_directory && matcher.is_match(&entry.name))
        .collect())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MimeTypes

const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
    ("dng", "image/x-adobe-dng"),
    ("cr2", "image/x-canon-cr2"),
    ("nef", "image/x-nikon-nef"),
    ("arw", "image/x-sony-arw"),
    ("raf", "image/x-fuji-raf"),
    ("orf", "image/x-olympus-orf"),
    ("rw2", "image/x-panasonic-rw2"),
    ("pef", "image/x-pentax-pef"),
    ("srw", "image/x-samsung-srw"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("webm", "video/webm"),
    ("m4v", "video/x-m4v"),
    ("3gp", "video/3gpp"),
];

/// MIME type for a destination entry, derived from the source extension.
pub fn mime_type_for(entry: &FileEntry) -> Mime {
    let Some(c_ext) = entry.extension_lowercase() else {
        return mime::APPLICATION_OCTET_STREAM;
    };
    MIME_BY_EXTENSION
        .iter()
        .find(|(ext, _)| *ext == c_ext)
        .and_then(|(_, essence)| essence.parse().ok())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ErrorClassification

static RE_DEVICE_PROVIDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)MtpDocumentsProvider|\bmtp\b|\bptp\b").ok());

/// Whether an I/O failure carries the signature of a removable-media /
/// transfer-protocol provider.
pub(crate) fn is_device_provider_error(err: &io::Error) -> bool {
    let Some(re) = RE_DEVICE_PROVIDER.as_ref() else {
        return false;
    };
    re.is_match(&err.to_string())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Timing

/// Remaining seconds extrapolated from the average time per copied file.
pub(crate) fn estimate_seconds_remaining(
    elapsed: Duration,
    n_files_done: usize,
    n_files_total: usize,
) -> u64 {
    if n_files_done == 0 {
        return 0;
    }
    let n_ms_per_file = elapsed.as_millis() / n_files_done as u128;
    let n_files_left = n_files_total.saturating_sub(n_files_done) as u128;
    (n_ms_per_file * n_files_left / 1000) as u64
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
