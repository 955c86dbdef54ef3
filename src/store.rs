use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::error::PdbbindError;
use crate::fs_util::archive_dir_name;

const PART_SUFFIX: &str = ".part";
const MANIFEST_SUFFIX: &str = ".manifest.json";
const LOCK_FILE: &str = ".pdbbind.lock";
const LOCK_POLL: Duration = Duration::from_millis(50);

/// The dataset directory. All download and extraction state lives here and is
/// re-derived from the filesystem on every call.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: Utf8PathBuf,
}

impl DatasetStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn default_root() -> Result<Utf8PathBuf, PdbbindError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("pdbbind-manager"))
                    .ok()
            })
            .ok_or_else(|| {
                PdbbindError::Filesystem("unable to resolve dataset directory".to_string())
            })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn archive_path(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(file_name)
    }

    pub fn part_path(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(format!("{file_name}{PART_SUFFIX}"))
    }

    pub fn manifest_path(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(format!("{file_name}{MANIFEST_SUFFIX}"))
    }

    pub fn extracted_dir(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(archive_dir_name(file_name))
    }

    pub fn ensure_root(&self) -> Result<(), PdbbindError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))
    }

    pub fn archive_state(&self, file_name: &str) -> ArchiveState {
        let extracted = self.extracted_dir(file_name);
        if let Some(bytes) = file_len(&self.archive_path(file_name)) {
            if extracted.as_std_path().is_dir() {
                return ArchiveState::Extracted { bytes };
            }
            return ArchiveState::Downloaded { bytes };
        }
        if let Some(bytes) = file_len(&self.part_path(file_name)) {
            return ArchiveState::Partial { bytes };
        }
        ArchiveState::Missing
    }

    /// Take the exclusive lock on the dataset directory, waiting up to `timeout`.
    /// The lock file stays on disk; the OS lock on it is dropped with the
    /// process, so a killed run never blocks the next one.
    pub fn lock(&self, timeout: Duration) -> Result<DirectoryLock, PdbbindError> {
        self.ensure_root()?;
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(format!("open {path}: {err}")))?;
        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => {
                    debug!(lock = %path, "acquired dataset directory lock");
                    return Ok(DirectoryLock { path, file });
                }
                Err(TryLockError::WouldBlock) => {
                    if started.elapsed() >= timeout {
                        return Err(PdbbindError::LockTimeout(path));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(TryLockError::Error(err)) => {
                    return Err(PdbbindError::Filesystem(format!("lock {path}: {err}")));
                }
            }
        }
    }

    pub fn write_manifest(path: &Utf8Path, manifest: &ArchiveManifest) -> Result<(), PdbbindError> {
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_manifest(path: &Utf8Path) -> Result<Option<ArchiveManifest>, PdbbindError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        let manifest = serde_json::from_str(&content)
            .map_err(|err| PdbbindError::Filesystem(format!("parse manifest {path}: {err}")))?;
        Ok(Some(manifest))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PdbbindError> {
        let parent = path
            .parent()
            .ok_or_else(|| PdbbindError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("pdbbind-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Download/extraction progress of one archive, as seen on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ArchiveState {
    Missing,
    Partial { bytes: u64 },
    Downloaded { bytes: u64 },
    Extracted { bytes: u64 },
}

/// Sidecar written next to a finished download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub url: String,
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
    pub downloaded_at: String,
    pub tool: String,
}

/// Held for the duration of `prepare`; unlocked on drop or process exit.
#[derive(Debug)]
pub struct DirectoryLock {
    path: Utf8PathBuf,
    file: File,
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(lock = %self.path, %err, "failed to release dataset directory lock");
        }
    }
}

pub fn sha256_file(path: &Utf8Path) -> Result<(u64, String), PdbbindError> {
    let mut file = File::open(path.as_std_path())
        .map_err(|err| PdbbindError::Filesystem(format!("open {path}: {err}")))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }
    Ok((size, format!("{:x}", hasher.finalize())))
}

fn file_len(path: &Utf8Path) -> Option<u64> {
    fs::metadata(path.as_std_path())
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn temp_store() -> (tempfile::TempDir, DatasetStore) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("pdbbind")).unwrap();
        (temp, DatasetStore::new(root))
    }

    #[test]
    fn layout_paths() {
        let store = DatasetStore::new(Utf8PathBuf::from("/data/pdbbind"));
        assert_eq!(
            store.part_path("CASF-2016.tar.gz").as_str(),
            "/data/pdbbind/CASF-2016.tar.gz.part"
        );
        assert_eq!(
            store.manifest_path("CASF-2016.tar.gz").as_str(),
            "/data/pdbbind/CASF-2016.tar.gz.manifest.json"
        );
        assert_eq!(
            store.extracted_dir("PDBbind2013-txt-format.tar").as_str(),
            "/data/pdbbind/PDBbind2013-txt-format"
        );
    }

    #[test]
    fn archive_state_follows_filesystem() {
        let (_temp, store) = temp_store();
        store.ensure_root().unwrap();
        let name = "CASF-2016.tar.gz";
        assert_eq!(store.archive_state(name), ArchiveState::Missing);

        fs::write(store.part_path(name).as_std_path(), b"abc").unwrap();
        assert_eq!(store.archive_state(name), ArchiveState::Partial { bytes: 3 });

        fs::rename(store.part_path(name).as_std_path(), store.archive_path(name).as_std_path())
            .unwrap();
        assert_eq!(store.archive_state(name), ArchiveState::Downloaded { bytes: 3 });

        fs::create_dir_all(store.extracted_dir(name).as_std_path()).unwrap();
        assert_eq!(store.archive_state(name), ArchiveState::Extracted { bytes: 3 });
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let (_temp, store) = temp_store();
        let guard = store.lock(Duration::from_millis(10)).unwrap();
        let err = store.lock(Duration::from_millis(60)).unwrap_err();
        assert_matches!(err, PdbbindError::LockTimeout(_));
        drop(guard);
        assert!(store.lock(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn leftover_lock_file_is_not_held() {
        let (_temp, store) = temp_store();
        store.ensure_root().unwrap();
        fs::write(store.root().join(".pdbbind.lock").as_std_path(), b"4242\n").unwrap();

        let guard = store.lock(Duration::ZERO).unwrap();
        drop(guard);
        assert!(store.root().join(".pdbbind.lock").as_std_path().exists());
    }

    #[test]
    fn manifest_round_trip_and_hash() {
        let (_temp, store) = temp_store();
        store.ensure_root().unwrap();
        let archive = store.archive_path("a.tar");
        fs::write(archive.as_std_path(), b"hello").unwrap();
        let (size, digest) = sha256_file(&archive).unwrap();
        assert_eq!(size, 5);
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let manifest = ArchiveManifest {
            url: "http://example.org/a.tar".to_string(),
            file_name: "a.tar".to_string(),
            size,
            sha256: digest,
            downloaded_at: "2024-01-01T00:00:00+00:00".to_string(),
            tool: "pdbbind-manager/test".to_string(),
        };
        let path = store.manifest_path("a.tar");
        DatasetStore::write_manifest(&path, &manifest).unwrap();
        assert_eq!(DatasetStore::read_manifest(&path).unwrap(), Some(manifest));
        assert_eq!(
            DatasetStore::read_manifest(&store.manifest_path("b.tar")).unwrap(),
            None
        );
    }
}
