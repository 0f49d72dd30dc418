//! Import specification models and top-level error types.

use std::collections::BTreeSet;
use std::io;

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Preset groups of media extensions offered to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumFileTypeCategory {
    /// Common image formats (JPG, PNG, GIF, BMP, ...).
    NormalImages,
    /// Camera raw formats (CR2, NEF, ARW, ...).
    RawImages,
    /// Video containers (MP4, MOV, MKV, ...).
    Videos,
}

impl EnumFileTypeCategory {
    /// Every preset, in display order.
    pub const ALL: [Self; 3] = [Self::NormalImages, Self::RawImages, Self::Videos];

    /// Dot-prefixed lowercase extensions of this preset.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::NormalImages => &[
                ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".tiff", ".tif",
            ],
            Self::RawImages => &[
                ".cr2", ".nef", ".arw", ".dng", ".raf", ".orf", ".rw2", ".pef", ".srw",
            ],
            Self::Videos => &[
                ".mp4", ".mov", ".avi", ".mkv", ".wmv", ".flv", ".webm", ".m4v", ".3gp",
            ],
        }
    }
}

/// Coarse error taxonomy used by callers to pick remediation UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumImportErrorKind {
    /// Missing/inaccessible directory or empty extension set.
    Validation,
    /// Listing or probing refused by a permission or provider restriction.
    Access,
    /// Byte-stream transfer of a single file failed.
    ContentIo,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsInit

/// Normalized set of dot-prefixed lowercase extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecExtensionSet {
    set_extensions: BTreeSet<String>,
}

impl SpecExtensionSet {
    /// Build from raw caller input.
    ///
    /// Entries are trimmed and lowercased, a missing leading dot is added and
    /// blank entries are dropped.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set_extensions = extensions
            .into_iter()
            .filter_map(|ext| {
                let c_ext = ext.as_ref().trim().to_lowercase();
                let c_ext = c_ext.trim_start_matches('.');
                if c_ext.is_empty() {
                    return None;
                }
                Some(format!(".{c_ext}"))
            })
            .collect();
        Self { set_extensions }
    }

    /// Union of the extensions of the given presets.
    pub fn from_categories(categories: &[EnumFileTypeCategory]) -> Self {
        Self::new(
            categories
                .iter()
                .flat_map(|category| category.extensions().iter().copied()),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.set_extensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set_extensions.len()
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.set_extensions.contains(extension)
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.set_extensions.iter().map(String::as_str)
    }

    /// Upper-cased label such as `JPG/PNG`, used in user-facing messages.
    pub fn label(&self) -> String {
        self.iter()
            .map(|ext| ext.trim_start_matches('.').to_uppercase())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Input options for an import run.
#[derive(Debug, Clone)]
pub struct SpecImportOptions {
    /// Poll cancellation once per this many reconciled candidates.
    pub n_candidates_per_cancel_check: usize,
    /// Bytes read from the head of an image when looking for capture metadata.
    pub n_bytes_exif_probe: u64,
    /// Stamp copied files with the source last-modified time.
    pub if_preserve_modified_time: bool,
    /// Name of the background worker thread.
    pub name_worker_thread: String,
}

impl Default for SpecImportOptions {
    fn default() -> Self {
        Self {
            n_candidates_per_cancel_check: 32,
            n_bytes_exif_probe: 512 * 1024,
            if_preserve_modified_time: true,
            name_worker_thread: "mediakit-import".to_string(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Failures that end an import run with a terminal `Error` state.
///
/// The `Display` text is what observers receive as the error message.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{label} directory is not accessible")]
    DirectoryMissing { label: &'static str },

    #[error("{label} directory does not exist")]
    DirectoryNotFound { label: &'static str },

    #[error("{label} directory is not readable")]
    DirectoryNotReadable { label: &'static str },

    #[error("No file extensions selected")]
    EmptyExtensionSet,

    #[error("Invalid file extension {extension:?}: {message}")]
    InvalidExtension { extension: String, message: String },

    #[error(
        "MTP device access issue with {label} directory. Please ensure the device is properly connected and try selecting the directory again."
    )]
    DeviceProbeFailed {
        label: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Access denied to {label} directory. Please check permissions.")]
    ProbeDenied {
        label: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Error accessing {label} directory: {source}")]
    ProbeFailed {
        label: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(
        "MTP device access issue. Please ensure the device is properly connected and try selecting the directory again."
    )]
    DeviceScanFailed {
        #[source]
        source: io::Error,
    },

    #[error("Permission denied. Please grant storage permissions in app settings and try again.")]
    ScanDenied {
        #[source]
        source: io::Error,
    },

    #[error("Error during scanning: {source}")]
    ScanFailed {
        #[source]
        source: io::Error,
    },

    #[error("No {label} files found in source directory")]
    NoMatchingFiles { label: String },

    #[error("Access denied to file: {name}. This may be due to MTP device restrictions.")]
    FileAccessDenied {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to copy file {name}: {source}")]
    FileCopyFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start import worker: {0}")]
    WorkerSpawnFailed(#[source] io::Error),
}

impl ImportError {
    pub fn kind(&self) -> EnumImportErrorKind {
        match self {
            Self::DirectoryMissing { .. }
            | Self::DirectoryNotFound { .. }
            | Self::DirectoryNotReadable { .. }
            | Self::EmptyExtensionSet
            | Self::InvalidExtension { .. }
            | Self::NoMatchingFiles { .. } => EnumImportErrorKind::Validation,
            Self::DeviceProbeFailed { .. }
            | Self::ProbeDenied { .. }
            | Self::ProbeFailed { .. }
            | Self::DeviceScanFailed { .. }
            | Self::ScanDenied { .. }
            | Self::ScanFailed { .. } => EnumImportErrorKind::Access,
            Self::FileAccessDenied { .. }
            | Self::FileCopyFailed { .. }
            | Self::WorkerSpawnFailed(_) => EnumImportErrorKind::ContentIo,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
