use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::{RecordType, Subset};

#[derive(Debug, Error, Diagnostic)]
pub enum PdbbindError {
    #[error("unknown PDBbind release: {0}")]
    UnknownRelease(u16),

    #[error("unknown PDBbind subset `{subset}` for release {release}")]
    UnknownSubset { release: u16, subset: String },

    #[error("invalid dataset reference: {0} (expected <release>:<subset>, e.g. 2016:refined)")]
    InvalidDatasetRef(String),

    #[error("invalid record type: {0}")]
    InvalidRecordType(String),

    #[error("{record_type} are not supported for the {subset} subset")]
    UnsupportedRecordType {
        record_type: RecordType,
        subset: Subset,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("download request failed: {0}")]
    Http(String),

    #[error("download of {url} returned status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("download of {path} ended at {actual} bytes, expected {expected}")]
    IncompleteDownload {
        path: Utf8PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),

    #[error("index {path} line {line} has no column {column}")]
    IndexRowTooShort {
        path: Utf8PathBuf,
        line: usize,
        column: usize,
    },

    #[error("archive not downloaded: {0}")]
    ArchiveMissing(Utf8PathBuf),

    #[error("no integrity manifest for {0}")]
    ManifestMissing(Utf8PathBuf),

    #[error("checksum mismatch for {path}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        path: Utf8PathBuf,
        expected: String,
        actual: String,
    },

    #[error("timed out waiting for dataset directory lock {0}")]
    LockTimeout(Utf8PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
