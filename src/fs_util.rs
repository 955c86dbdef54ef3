use std::fs::{self, File};
use std::io::{self, BufReader, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::app::{Progress, ProgressEvent, ProgressSink};
use crate::error::PdbbindError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Tar,
    Zip,
}

impl ArchiveFormat {
    pub fn from_file_name(name: &str) -> Result<Self, PdbbindError> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Ok(ArchiveFormat::Tar)
        } else if name.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else {
            Err(PdbbindError::UnsupportedArchive(name.to_string()))
        }
    }
}

/// Directory an archive unpacks into: its file name without container suffixes.
pub fn archive_dir_name(file_name: &str) -> &str {
    if let Some(stem) = file_name.strip_suffix(".tgz") {
        return stem;
    }
    if let Some(stem) = file_name.strip_suffix(".zip") {
        return stem;
    }
    let stem = file_name.strip_suffix(".gz").unwrap_or(file_name);
    stem.strip_suffix(".tar").unwrap_or(stem)
}

pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Path the archive is (or will be) unpacked into.
    pub fn destination(archive_path: &Utf8Path) -> Result<Utf8PathBuf, PdbbindError> {
        let file_name = archive_path
            .file_name()
            .ok_or_else(|| PdbbindError::Archive(format!("no file name in {archive_path}")))?;
        let parent = archive_path.parent().unwrap_or(Utf8Path::new(""));
        Ok(parent.join(archive_dir_name(file_name)))
    }

    /// Unpack `archive_path` next to itself. An existing destination directory
    /// counts as done, even if an earlier run was interrupted half way.
    pub fn extract(
        archive_path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<Utf8PathBuf, PdbbindError> {
        let destination = Self::destination(archive_path)?;
        if destination.as_std_path().exists() {
            debug!(%destination, "archive already extracted");
            return Ok(destination);
        }

        let format = ArchiveFormat::from_file_name(archive_path.as_str())?;
        info!(archive = %archive_path, %destination, "extracting archive");
        sink.event(ProgressEvent::phase(format!(
            "phase=Extract; extracting {archive_path}"
        )));

        let file = File::open(archive_path.as_std_path()).map_err(|err| {
            PdbbindError::Archive(format!("open archive {archive_path}: {err}"))
        })?;
        fs::create_dir_all(destination.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        let unpacked = match format {
            ArchiveFormat::TarGz => unpack_tar(
                Archive::new(GzDecoder::new(BufReader::new(file))),
                &destination,
                sink,
            ),
            ArchiveFormat::Tar => unpack_tar(Archive::new(BufReader::new(file)), &destination, sink),
            ArchiveFormat::Zip => unpack_zip(file, &destination, sink),
        };
        let members = match unpacked {
            Ok(members) => members,
            Err(err) => {
                // A leftover destination would be taken as a finished extraction.
                if let Err(cleanup) = fs::remove_dir_all(destination.as_std_path()) {
                    warn!(%destination, %cleanup, "failed to remove partial extraction");
                }
                return Err(err);
            }
        };
        info!(archive = %archive_path, members, "extraction finished");
        Ok(destination)
    }
}

fn unpack_tar<R: Read>(
    mut archive: Archive<R>,
    destination: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<u64, PdbbindError> {
    let entries = archive
        .entries()
        .map_err(|err| PdbbindError::Archive(err.to_string()))?;
    let mut done = 0u64;
    for entry in entries {
        let mut entry = entry.map_err(|err| PdbbindError::Archive(err.to_string()))?;
        let name = entry
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let unpacked = entry
            .unpack_in(destination.as_std_path())
            .map_err(|err| PdbbindError::Archive(format!("unpack {name}: {err}")))?;
        if !unpacked {
            debug!(member = %name, "skipped archive member outside destination");
        }
        done += 1;
        sink.event(ProgressEvent::progress(
            format!("extract.member {name}"),
            Progress { done, total: None },
        ));
    }
    Ok(done)
}

fn unpack_zip(
    file: File,
    destination: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<u64, PdbbindError> {
    let mut archive = ZipArchive::new(file).map_err(|err| PdbbindError::Archive(err.to_string()))?;
    let total = archive.len() as u64;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| PdbbindError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => destination.as_std_path().join(path),
            None => {
                return Err(PdbbindError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        } else {
            if let Some(parent) = entry_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
            }
            let mut outfile = File::create(&entry_path)
                .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
            io::copy(&mut entry, &mut outfile)
                .map_err(|err| PdbbindError::Archive(err.to_string()))?;
        }
        sink.event(ProgressEvent::progress(
            format!("extract.member {}", entry.name()),
            Progress {
                done: i as u64 + 1,
                total: Some(total),
            },
        ));
    }
    Ok(total)
}
