use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RANGE, USER_AGENT};
use tracing::{debug, info, warn};

use crate::app::{Progress, ProgressEvent, ProgressSink};
use crate::domain::{ArchiveSpec, Credentials};
use crate::error::PdbbindError;
use crate::store::{ArchiveManifest, DatasetStore, sha256_file};

pub const CHUNK_SIZE: usize = 1024 * 1024;

const STATUS_OK: u16 = 200;
const STATUS_PARTIAL_CONTENT: u16 = 206;

/// Response head plus a streaming body.
pub struct TransportResponse {
    pub status: u16,
    /// Bytes remaining in this response, if the server declared it.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

pub trait ArchiveTransport: Send + Sync {
    /// GET `url`, asking for bytes `offset..` when `offset > 0`.
    fn get(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        offset: u64,
    ) -> Result<TransportResponse, PdbbindError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// `timeout` bounds connecting and every read, so a stalled body fails
    /// instead of hanging while the directory lock is held.
    pub fn new(timeout: Duration) -> Result<Self, PdbbindError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("pdbbind-manager/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PdbbindError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| PdbbindError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ArchiveTransport for HttpTransport {
    fn get(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        offset: u64,
    ) -> Result<TransportResponse, PdbbindError> {
        let mut request = self.client.get(url);
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request
            .send()
            .map_err(|err| PdbbindError::Http(err.to_string()))?;
        Ok(TransportResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub path: Utf8PathBuf,
    /// False when the archive was already present and nothing was fetched.
    pub downloaded: bool,
}

/// Resumable archive fetcher. The length of the `.part` file is the only
/// resume checkpoint; only the renamed final file counts as downloaded.
pub struct Downloader<T: ArchiveTransport> {
    transport: T,
    chunk_size: usize,
}

impl<T: ArchiveTransport> Downloader<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fetch(
        &self,
        spec: &ArchiveSpec,
        destination: &Utf8Path,
        credentials: Option<&Credentials>,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, PdbbindError> {
        let store = DatasetStore::new(destination.to_owned());
        store.ensure_root()?;

        let target = store.archive_path(&spec.file_name);
        if target.as_std_path().exists() {
            debug!(%target, "archive already downloaded");
            return Ok(FetchOutcome {
                path: target,
                downloaded: false,
            });
        }

        let part = store.part_path(&spec.file_name);
        let offset = fs::metadata(part.as_std_path())
            .map(|meta| meta.len())
            .unwrap_or(0);
        if offset > 0 {
            info!(url = %spec.url, offset, "resuming download");
            sink.event(ProgressEvent::phase(format!(
                "phase=Download; resuming {} from {offset} bytes",
                spec.file_name
            )));
        } else {
            info!(url = %spec.url, "downloading");
            sink.event(ProgressEvent::phase(format!(
                "phase=Download; downloading {}",
                spec.url
            )));
        }

        let start = Instant::now();
        let response = self.transport.get(&spec.url, credentials, offset)?;
        let offset = match response.status {
            STATUS_PARTIAL_CONTENT => offset,
            STATUS_OK => {
                if offset > 0 {
                    warn!(url = %spec.url, "server ignored range request, restarting download");
                }
                0
            }
            status => {
                return Err(PdbbindError::HttpStatus {
                    status,
                    url: spec.url.clone(),
                });
            }
        };

        let expected = response.content_length.map(|remaining| offset + remaining);
        let written = self.stream_to_part(response.body, &part, offset, expected, sink)?;
        if let Some(expected) = expected {
            if written > expected {
                // Past the declared end every range request would fail; start over next time.
                warn!(%part, expected, written, "download overran declared length, discarding");
                fs::remove_file(part.as_std_path())
                    .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
            }
            if written != expected {
                return Err(PdbbindError::IncompleteDownload {
                    path: part,
                    expected,
                    actual: written,
                });
            }
        }

        fs::rename(part.as_std_path(), target.as_std_path())
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        sink.event(ProgressEvent {
            message: format!("download.complete bytes={written}"),
            elapsed: Some(start.elapsed()),
            progress: None,
        });

        self.write_manifest(spec, &store, &target)?;
        Ok(FetchOutcome {
            path: target,
            downloaded: true,
        })
    }

    fn stream_to_part(
        &self,
        mut body: Box<dyn Read + Send>,
        part: &Utf8Path,
        offset: u64,
        total: Option<u64>,
        sink: &dyn ProgressSink,
    ) -> Result<u64, PdbbindError> {
        let mut file = if offset > 0 {
            OpenOptions::new().append(true).open(part.as_std_path())
        } else {
            File::create(part.as_std_path())
        }
        .map_err(|err| PdbbindError::Filesystem(format!("open {part}: {err}")))?;

        let mut written = offset;
        sink.event(ProgressEvent::progress(
            "download.progress",
            Progress {
                done: written,
                total,
            },
        ));

        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(PdbbindError::Http(err.to_string())),
            };
            file.write_all(&buffer[..read])
                .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
            written += read as u64;
            sink.event(ProgressEvent::progress(
                "download.progress",
                Progress {
                    done: written,
                    total,
                },
            ));
        }
        file.sync_all()
            .map_err(|err| PdbbindError::Filesystem(err.to_string()))?;
        Ok(written)
    }

    fn write_manifest(
        &self,
        spec: &ArchiveSpec,
        store: &DatasetStore,
        target: &Utf8Path,
    ) -> Result<(), PdbbindError> {
        let (size, sha256) = sha256_file(target)?;
        let manifest = ArchiveManifest {
            url: spec.url.clone(),
            file_name: spec.file_name.clone(),
            size,
            sha256,
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("pdbbind-manager/{}", env!("CARGO_PKG_VERSION")),
        };
        DatasetStore::write_manifest(&store.manifest_path(&spec.file_name), &manifest)
    }
}
