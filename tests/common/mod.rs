#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use pdbbind_manager::app::DatasetManager;
use pdbbind_manager::catalog::DatasetCatalog;
use pdbbind_manager::domain::{Credentials, DatasetRef, Subset};
use pdbbind_manager::download::{ArchiveTransport, Downloader, TransportResponse};
use pdbbind_manager::error::PdbbindError;
use pdbbind_manager::output::JsonOutput;
use pdbbind_manager::store::DatasetStore;

/// In-memory server keyed by archive file name. Records every requested offset.
#[derive(Default)]
pub struct MockTransport {
    payloads: HashMap<String, Vec<u8>>,
    ignore_range: bool,
    /// Serve at most this many bytes per response while declaring the full length.
    cut_after: Option<usize>,
    /// Declare this many bytes fewer than are actually sent.
    understate: u64,
    pub offsets: Mutex<Vec<u64>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, file_name: &str, payload: Vec<u8>) -> Self {
        self.payloads.insert(file_name.to_string(), payload);
        self
    }

    pub fn ignoring_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    pub fn cut_after(mut self, bytes: usize) -> Self {
        self.cut_after = Some(bytes);
        self
    }

    pub fn understating_length(mut self, bytes: u64) -> Self {
        self.understate = bytes;
        self
    }

    pub fn requests(&self) -> Vec<u64> {
        self.offsets.lock().unwrap().clone()
    }
}

impl ArchiveTransport for MockTransport {
    fn get(
        &self,
        url: &str,
        _credentials: Option<&Credentials>,
        offset: u64,
    ) -> Result<TransportResponse, PdbbindError> {
        self.offsets.lock().unwrap().push(offset);
        let name = url.rsplit('/').next().unwrap_or(url);
        let Some(payload) = self.payloads.get(name) else {
            return Ok(TransportResponse {
                status: 404,
                content_length: None,
                body: Box::new(Cursor::new(Vec::new())),
            });
        };

        let (status, start) = if offset > 0 && !self.ignore_range {
            (206, offset as usize)
        } else {
            (200, 0)
        };
        let mut body = payload[start..].to_vec();
        let content_length = Some(body.len() as u64 - self.understate);
        if let Some(cut) = self.cut_after {
            body.truncate(cut);
        }
        Ok(TransportResponse {
            status,
            content_length,
            body: Box::new(Cursor::new(body)),
        })
    }
}

pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Two complexes; `2xyz` has no pocket file.
pub fn casf_2016_archive() -> Vec<u8> {
    tar_gz(&[
        ("CASF/protein/1abc/1abc_protein.pdb", b"ATOM 1abc\n"),
        ("CASF/protein/1abc/1abc_pocket.pdb", b"ATOM pocket\n"),
        ("CASF/protein/2xyz/2xyz_protein.pdb", b"ATOM 2xyz\n"),
        ("CASF/ligand/docking/1abc/1abc_ligand.mol2", b"@<TRIPOS>MOLECULE\n"),
        ("CASF/ligand/docking/2xyz/2xyz_ligand.mol2", b"@<TRIPOS>MOLECULE\n"),
    ])
}

pub const REFINED_2016_INDEX: &str = "\
# ==============================================================================
# List of the protein-ligand complexes in the PDBbind refined set v.2016
# PDB code, resolution, release year, -logKd/Ki, Kd/Ki, reference, ligand name
# ==============================================================================
1abc  2.00  1999   5.22  Ki=6uM      // 1abc.pdf (LIG)
2xyz  1.80  2003   8.10  Kd=7.9nM    // 2xyz.pdf (INH)
";

/// Index lists both complexes, but only `1abc` ships structure files.
pub fn refined_2016_archive() -> Vec<u8> {
    tar_gz(&[
        (
            "refined-set/index/INDEX_refined_data.2016",
            REFINED_2016_INDEX.as_bytes(),
        ),
        ("refined-set/1abc/1abc_ligand.mol2", b"@<TRIPOS>MOLECULE\n"),
        ("refined-set/1abc/1abc_protein.pdb", b"ATOM 1abc\n"),
        ("refined-set/1abc/1abc_pocket.pdb", b"ATOM pocket\n"),
        ("refined-set/2xyz/2xyz_ligand.mol2", b"@<TRIPOS>MOLECULE\n"),
    ])
}

pub const BASE_URL: &str = "http://mock.local/download/";

pub fn manager(root: &Utf8PathBuf, transport: MockTransport) -> DatasetManager<MockTransport> {
    DatasetManager::new(
        DatasetStore::new(root.clone()),
        DatasetCatalog::new(BASE_URL),
        Downloader::new(transport),
    )
}

/// Manager over a directory that already holds `2016:casf` and `2016:refined`.
pub fn prepared_2016(root: &Utf8PathBuf) -> DatasetManager<MockTransport> {
    let transport = MockTransport::new()
        .with_payload("CASF-2016.tar.gz", casf_2016_archive())
        .with_payload("pdbbind_v2016_refined.tar.gz", refined_2016_archive());
    let manager = manager(root, transport);
    for dataset in [
        DatasetRef::new(2016, Subset::Casf),
        DatasetRef::new(2016, Subset::Refined),
    ] {
        manager.prepare(&dataset, &JsonOutput).unwrap();
    }
    manager
}
