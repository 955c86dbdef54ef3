use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::DatasetCatalog;
use crate::domain::{Credentials, DatasetRef, RecordType};
use crate::download::{ArchiveTransport, Downloader};
use crate::error::PdbbindError;
use crate::fs_util::ArchiveExtractor;
use crate::index::{self, COMMENT_PREFIX};
use crate::layout::{DatasetLayout, PathResolver};
use crate::store::{ArchiveState, DatasetStore, sha256_file};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);

/// Record identifier (PDB code) to resolved value.
pub type RecordMap<V> = BTreeMap<String, V>;

#[derive(Debug, Clone, Serialize)]
pub struct PrepareResult {
    pub dataset: DatasetRef,
    pub items: Vec<PrepareItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareItem {
    pub file_name: String,
    pub url: String,
    pub archive_path: Utf8PathBuf,
    pub extracted_dir: Utf8PathBuf,
    pub downloaded: bool,
    pub extracted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Records {
    Paths(RecordMap<Utf8PathBuf>),
    Values(RecordMap<Vec<String>>),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::Paths(map) => map.len(),
            Records::Values(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub dataset: DatasetRef,
    pub record_type: RecordType,
    pub records: Records,
    /// Identifiers listed in the index whose expected file is not on disk.
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub dataset: DatasetRef,
    pub archives: Vec<ArchiveStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStatus {
    pub file_name: String,
    pub url: String,
    #[serde(flatten)]
    pub state: ArchiveState,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    pub dataset: DatasetRef,
    pub archives: Vec<VerifiedArchive>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedArchive {
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSinkKind {
    Prepare,
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub progress: Option<Progress>,
}

impl ProgressEvent {
    pub fn phase(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
            progress: None,
        }
    }

    pub fn progress(message: impl Into<String>, progress: Progress) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
            progress: Some(progress),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Acquires datasets into one directory and answers record queries against
/// the extracted trees. Record queries never download; call `prepare` first.
pub struct DatasetManager<T: ArchiveTransport> {
    store: DatasetStore,
    catalog: DatasetCatalog,
    downloader: Downloader<T>,
    credentials: Option<Credentials>,
    lock_timeout: Duration,
}

impl<T: ArchiveTransport> DatasetManager<T> {
    pub fn new(store: DatasetStore, catalog: DatasetCatalog, downloader: Downloader<T>) -> Self {
        Self {
            store,
            catalog,
            downloader,
            credentials: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn downloader(&self) -> &Downloader<T> {
        &self.downloader
    }

    /// Download then extract every archive of `dataset`, one at a time in
    /// registry order. Cheap once everything is on disk.
    pub fn prepare(
        &self,
        dataset: &DatasetRef,
        sink: &dyn ProgressSink,
    ) -> Result<PrepareResult, PdbbindError> {
        let specs = self.catalog.resolve(dataset)?;
        sink.event(ProgressEvent::phase(format!(
            "phase=Resolve; {dataset} ships in {} archive(s)",
            specs.len()
        )));

        let _lock = self.store.lock(self.lock_timeout)?;
        let mut items = Vec::with_capacity(specs.len());
        for spec in &specs {
            let outcome = self.downloader.fetch(
                spec,
                self.store.root(),
                self.credentials.as_ref(),
                sink,
            )?;
            let already_extracted = ArchiveExtractor::destination(&outcome.path)?
                .as_std_path()
                .exists();
            let extracted_dir = ArchiveExtractor::extract(&outcome.path, sink)?;
            items.push(PrepareItem {
                file_name: spec.file_name.clone(),
                url: spec.url.clone(),
                archive_path: outcome.path,
                extracted_dir,
                downloaded: outcome.downloaded,
                extracted: !already_extracted,
            });
        }

        sink.event(ProgressEvent::phase(format!("phase=Done; {dataset} ready")));
        info!(%dataset, "dataset prepared");
        Ok(PrepareResult {
            dataset: *dataset,
            items,
        })
    }

    /// Identifier to the index values that follow it (the activity column).
    pub fn activities(
        &self,
        dataset: &DatasetRef,
    ) -> Result<RecordMap<Vec<String>>, PdbbindError> {
        self.locate_activities(dataset)
    }

    pub fn ligands(&self, dataset: &DatasetRef) -> Result<RecordMap<Utf8PathBuf>, PdbbindError> {
        self.locate_paths(dataset, RecordType::Ligands)
            .map(|(records, _)| records)
    }

    pub fn proteins(&self, dataset: &DatasetRef) -> Result<RecordMap<Utf8PathBuf>, PdbbindError> {
        self.locate_paths(dataset, RecordType::Proteins)
            .map(|(records, _)| records)
    }

    pub fn pockets(&self, dataset: &DatasetRef) -> Result<RecordMap<Utf8PathBuf>, PdbbindError> {
        self.locate_paths(dataset, RecordType::Pockets)
            .map(|(records, _)| records)
    }

    pub fn locate_records(
        &self,
        dataset: &DatasetRef,
        record_type: RecordType,
    ) -> Result<RecordReport, PdbbindError> {
        let (records, dropped) = match record_type {
            RecordType::Activities => {
                let records = self.locate_activities(dataset)?;
                (Records::Values(records), Vec::new())
            }
            _ => {
                let (records, dropped) = self.locate_paths(dataset, record_type)?;
                (Records::Paths(records), dropped)
            }
        };
        Ok(RecordReport {
            dataset: *dataset,
            record_type,
            records,
            dropped,
        })
    }

    pub fn status(&self, dataset: &DatasetRef) -> Result<StatusResult, PdbbindError> {
        let archives = self
            .catalog
            .resolve(dataset)?
            .into_iter()
            .map(|spec| ArchiveStatus {
                state: self.store.archive_state(&spec.file_name),
                file_name: spec.file_name,
                url: spec.url,
            })
            .collect();
        Ok(StatusResult {
            dataset: *dataset,
            archives,
        })
    }

    /// Re-hash every downloaded archive of `dataset` against its sidecar manifest.
    pub fn verify(
        &self,
        dataset: &DatasetRef,
        sink: &dyn ProgressSink,
    ) -> Result<VerifyResult, PdbbindError> {
        let specs = self.catalog.resolve(dataset)?;
        let mut archives = Vec::with_capacity(specs.len());
        for spec in specs {
            let path = self.store.archive_path(&spec.file_name);
            if !path.as_std_path().is_file() {
                return Err(PdbbindError::ArchiveMissing(path));
            }
            let manifest_path = self.store.manifest_path(&spec.file_name);
            let manifest = DatasetStore::read_manifest(&manifest_path)?
                .ok_or_else(|| PdbbindError::ManifestMissing(path.clone()))?;

            sink.event(ProgressEvent::phase(format!(
                "phase=Verify; hashing {}",
                spec.file_name
            )));
            let (size, sha256) = sha256_file(&path)?;
            if size != manifest.size || sha256 != manifest.sha256 {
                return Err(PdbbindError::ChecksumMismatch {
                    path,
                    expected: manifest.sha256,
                    actual: sha256,
                });
            }
            archives.push(VerifiedArchive {
                file_name: spec.file_name,
                size,
                sha256,
            });
        }
        Ok(VerifyResult {
            dataset: *dataset,
            archives,
        })
    }

    fn locate_activities(
        &self,
        dataset: &DatasetRef,
    ) -> Result<RecordMap<Vec<String>>, PdbbindError> {
        let layout = PathResolver::layout(dataset)?;
        let DatasetLayout::Refined {
            index_file,
            id_column,
            value_columns,
            ..
        } = layout
        else {
            return Err(PdbbindError::UnsupportedRecordType {
                record_type: RecordType::Activities,
                subset: dataset.subset,
            });
        };

        let index_path = self.store.root().join(index_file);
        if !index_path.as_std_path().is_file() {
            warn!(index = %index_path, %dataset, "index file not found, is the dataset prepared?");
            return Ok(RecordMap::new());
        }

        let columns = std::iter::once(id_column)
            .chain(value_columns.iter().copied())
            .collect::<Vec<_>>();
        let mut records = RecordMap::new();
        for mut row in index::read_tuples(&index_path, &columns, COMMENT_PREFIX)? {
            let values = row.split_off(1);
            if let Some(id) = row.pop() {
                records.insert(id, values);
            }
        }
        Ok(records)
    }

    fn locate_paths(
        &self,
        dataset: &DatasetRef,
        record_type: RecordType,
    ) -> Result<(RecordMap<Utf8PathBuf>, Vec<String>), PdbbindError> {
        let (suffix, extension) = record_type.naming().ok_or(PdbbindError::UnsupportedRecordType {
            record_type,
            subset: dataset.subset,
        })?;
        let layout = PathResolver::layout(dataset)?;

        match &layout {
            DatasetLayout::Casf { .. } => {
                let dir = self.store.root().join(layout.casf_dir(dataset, record_type)?);
                let records = walk_matching(&dir, &format!("{suffix}{extension}"))?;
                Ok((records, Vec::new()))
            }
            DatasetLayout::Refined {
                record_dir,
                index_file,
                id_column,
                ..
            } => {
                let index_path = self.store.root().join(index_file);
                if !index_path.as_std_path().is_file() {
                    warn!(index = %index_path, %dataset, "index file not found");
                    return Ok((RecordMap::new(), Vec::new()));
                }

                let record_dir = self.store.root().join(record_dir);
                let ids = index::read_columns(&index_path, &[*id_column], COMMENT_PREFIX)?
                    .pop()
                    .unwrap_or_default();
                let mut records = RecordMap::new();
                let mut dropped = Vec::new();
                for id in ids {
                    let path = PathResolver::record_path(&record_dir, &id, suffix, extension);
                    if path.as_std_path().is_file() {
                        records.insert(id, path);
                    } else {
                        warn!(path = %path, "record file not found");
                        dropped.push(id);
                    }
                }
                Ok((records, dropped))
            }
        }
    }
}

/// Files under `root` (recursively) whose name ends with `pattern`, keyed by
/// the name with `pattern` removed. A missing `root` yields nothing.
fn walk_matching(root: &Utf8Path, pattern: &str) -> Result<RecordMap<Utf8PathBuf>, PdbbindError> {
    let mut records = RecordMap::new();
    if !root.as_std_path().is_dir() {
        return Ok(records);
    }
    let mut stack = vec![root.to_owned()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(format!("read {dir}: {err}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                PdbbindError::Filesystem(format!("non-utf8 path {}", path.display()))
            })?;
            let file_type = entry
                .file_type()
                .map_err(|err| PdbbindError::Filesystem(format!("stat {path}: {err}")))?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            // Linked directories are listed but never descended into.
            if file_type.is_symlink() && path.as_std_path().is_dir() {
                continue;
            }
            let id = path
                .file_name()
                .and_then(|name| name.strip_suffix(pattern))
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            if let Some(id) = id {
                records.insert(id, path);
            }
        }
    }
    Ok(records)
}
