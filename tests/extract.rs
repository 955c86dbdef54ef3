mod common;

use std::fs;
use std::io::{Cursor, Write};

use assert_matches::assert_matches;

use common::{casf_2016_archive, utf8_tempdir};
use pdbbind_manager::error::PdbbindError;
use pdbbind_manager::fs_util::ArchiveExtractor;
use pdbbind_manager::output::JsonOutput;

#[test]
fn unpacks_tar_gz_next_to_archive() {
    let (_temp, root) = utf8_tempdir();
    let archive = root.join("CASF-2016.tar.gz");
    fs::write(archive.as_std_path(), casf_2016_archive()).unwrap();

    let destination = ArchiveExtractor::extract(&archive, &JsonOutput).unwrap();
    assert_eq!(destination, root.join("CASF-2016"));
    let protein = destination.join("CASF/protein/1abc/1abc_protein.pdb");
    assert_eq!(fs::read_to_string(protein.as_std_path()).unwrap(), "ATOM 1abc\n");
}

#[test]
fn existing_destination_is_left_alone() {
    let (_temp, root) = utf8_tempdir();
    let archive = root.join("CASF-2016.tar.gz");
    fs::write(archive.as_std_path(), casf_2016_archive()).unwrap();
    fs::create_dir(root.join("CASF-2016").as_std_path()).unwrap();

    let destination = ArchiveExtractor::extract(&archive, &JsonOutput).unwrap();
    assert_eq!(fs::read_dir(destination.as_std_path()).unwrap().count(), 0);
}

#[test]
fn unpacks_zip_archives() {
    let (_temp, root) = utf8_tempdir();
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("index/INDEX_general_PL.2020", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"1abc 2.0 1999 5.2\n").unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    let archive = root.join("index-2020.zip");
    fs::write(archive.as_std_path(), bytes).unwrap();

    let destination = ArchiveExtractor::extract(&archive, &JsonOutput).unwrap();
    assert_eq!(destination, root.join("index-2020"));
    assert!(
        destination
            .join("index/INDEX_general_PL.2020")
            .as_std_path()
            .is_file()
    );
}

#[test]
fn corrupt_archive_is_an_archive_error() {
    let (_temp, root) = utf8_tempdir();
    let archive = root.join("CASF-2016.tar.gz");
    fs::write(archive.as_std_path(), b"definitely not gzip").unwrap();

    let err = ArchiveExtractor::extract(&archive, &JsonOutput).unwrap_err();
    assert_matches!(err, PdbbindError::Archive(_));
    assert!(!root.join("CASF-2016").as_std_path().exists());
}

#[test]
fn missing_archive_leaves_no_destination() {
    let (_temp, root) = utf8_tempdir();
    let archive = root.join("CASF-2016.tar.gz");

    let err = ArchiveExtractor::extract(&archive, &JsonOutput).unwrap_err();
    assert_matches!(err, PdbbindError::Archive(_));
    assert!(!root.join("CASF-2016").as_std_path().exists());

    let err = ArchiveExtractor::extract(&archive, &JsonOutput).unwrap_err();
    assert_matches!(err, PdbbindError::Archive(_));
}

#[test]
fn unknown_extension_is_rejected() {
    let (_temp, root) = utf8_tempdir();
    let archive = root.join("CASF-2016.rar");
    fs::write(archive.as_std_path(), b"rar").unwrap();

    let err = ArchiveExtractor::extract(&archive, &JsonOutput).unwrap_err();
    assert_matches!(err, PdbbindError::UnsupportedArchive(_));
}
