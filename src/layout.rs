use camino::{Utf8Path, Utf8PathBuf};

use crate::catalog::DatasetCatalog;
use crate::domain::{DatasetRef, RecordType, Subset};
use crate::error::PdbbindError;
use crate::fs_util::archive_dir_name;

const CASF_LIGAND_DIR: &str = "CASF/ligand/docking";
const CASF_PROTEIN_DIR: &str = "CASF/protein";

const REFINED_ID_COLUMN: usize = 0;
/// -logKd/Ki
const REFINED_VALUE_COLUMNS: &[usize] = &[3];

/// Where a refined-set index file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLocation {
    /// Relative to the release's record directory.
    RecordDir(&'static str),
    /// Inside the extracted tree of another archive of the same release.
    SiblingArchive {
        archive: &'static str,
        file: &'static str,
    },
}

struct RefinedRule {
    release: u16,
    record_dir: &'static str,
    index: IndexLocation,
}

const REFINED_RULES: &[RefinedRule] = &[
    RefinedRule {
        release: 2007,
        record_dir: "v2007",
        index: IndexLocation::RecordDir("INDEX.2007.refined.data"),
    },
    RefinedRule {
        release: 2013,
        record_dir: "v2013-refined",
        index: IndexLocation::SiblingArchive {
            archive: "PDBbind2013-txt-format.tar",
            file: "INDEX_refined_data.2013",
        },
    },
    RefinedRule {
        release: 2016,
        record_dir: "refined-set",
        index: IndexLocation::RecordDir("index/INDEX_refined_data.2016"),
    },
    RefinedRule {
        release: 2019,
        record_dir: "refined-set",
        index: IndexLocation::RecordDir("index/INDEX_refined_data.2019"),
    },
    RefinedRule {
        release: 2020,
        record_dir: "refined-set",
        index: IndexLocation::RecordDir("index/INDEX_refined_data.2020"),
    },
];

/// On-disk layout of an extracted dataset, relative to the dataset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetLayout {
    /// Benchmark layout: records are found by walking fixed directories.
    Casf {
        ligand_dir: Utf8PathBuf,
        protein_dir: Utf8PathBuf,
    },
    /// Standard layout: records are joined against the release index file.
    Refined {
        record_dir: Utf8PathBuf,
        index_file: Utf8PathBuf,
        id_column: usize,
        value_columns: &'static [usize],
    },
}

impl DatasetLayout {
    /// Directory walked for a record type under the CASF layout.
    pub fn casf_dir(
        &self,
        dataset: &DatasetRef,
        record_type: RecordType,
    ) -> Result<&Utf8Path, PdbbindError> {
        let unsupported = || PdbbindError::UnsupportedRecordType {
            record_type,
            subset: dataset.subset,
        };
        match self {
            DatasetLayout::Casf {
                ligand_dir,
                protein_dir,
            } => match record_type {
                RecordType::Ligands => Ok(ligand_dir),
                RecordType::Proteins | RecordType::Pockets => Ok(protein_dir),
                RecordType::Activities => Err(unsupported()),
            },
            DatasetLayout::Refined { .. } => Err(unsupported()),
        }
    }
}

pub struct PathResolver;

impl PathResolver {
    pub fn layout(dataset: &DatasetRef) -> Result<DatasetLayout, PdbbindError> {
        let archives = DatasetCatalog::archive_names(dataset)?;
        let root = archives
            .first()
            .map(|name| Utf8PathBuf::from(archive_dir_name(name)))
            .ok_or(PdbbindError::UnknownRelease(dataset.release))?;

        match dataset.subset {
            Subset::Casf => Ok(DatasetLayout::Casf {
                ligand_dir: root.join(CASF_LIGAND_DIR),
                protein_dir: root.join(CASF_PROTEIN_DIR),
            }),
            Subset::Refined => {
                let rule = REFINED_RULES
                    .iter()
                    .find(|rule| rule.release == dataset.release)
                    .ok_or(PdbbindError::UnknownRelease(dataset.release))?;
                let record_dir = root.join(rule.record_dir);
                let index_file = match rule.index {
                    IndexLocation::RecordDir(file) => record_dir.join(file),
                    IndexLocation::SiblingArchive { archive, file } => {
                        Utf8PathBuf::from(archive_dir_name(archive)).join(file)
                    }
                };
                Ok(DatasetLayout::Refined {
                    record_dir,
                    index_file,
                    id_column: REFINED_ID_COLUMN,
                    value_columns: REFINED_VALUE_COLUMNS,
                })
            }
        }
    }

    /// `<record_dir>/<id>/<id><suffix><extension>`
    pub fn record_path(
        record_dir: &Utf8Path,
        id: &str,
        suffix: &str,
        extension: &str,
    ) -> Utf8PathBuf {
        record_dir.join(id).join(format!("{id}{suffix}{extension}"))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn casf_layout_paths() {
        let dataset = DatasetRef::new(2016, Subset::Casf);
        let layout = PathResolver::layout(&dataset).unwrap();
        assert_eq!(
            layout
                .casf_dir(&dataset, RecordType::Proteins)
                .unwrap()
                .as_str(),
            "CASF-2016/CASF/protein"
        );
        assert_eq!(
            layout
                .casf_dir(&dataset, RecordType::Ligands)
                .unwrap()
                .as_str(),
            "CASF-2016/CASF/ligand/docking"
        );
        let err = layout
            .casf_dir(&dataset, RecordType::Activities)
            .unwrap_err();
        assert_matches!(err, PdbbindError::UnsupportedRecordType { .. });
    }

    #[test]
    fn refined_layout_paths() {
        let layout = PathResolver::layout(&DatasetRef::new(2020, Subset::Refined)).unwrap();
        assert_eq!(
            layout,
            DatasetLayout::Refined {
                record_dir: "PDBbind_v2020_refined/refined-set".into(),
                index_file: "PDBbind_v2020_refined/refined-set/index/INDEX_refined_data.2020"
                    .into(),
                id_column: 0,
                value_columns: &[3],
            }
        );
    }

    #[test]
    fn refined_2013_index_lives_in_sibling_archive() {
        let layout = PathResolver::layout(&DatasetRef::new(2013, Subset::Refined)).unwrap();
        let DatasetLayout::Refined {
            record_dir,
            index_file,
            ..
        } = layout
        else {
            panic!("expected refined layout");
        };
        assert_eq!(record_dir.as_str(), "pdbbind_v2013_refined_set/v2013-refined");
        assert_eq!(
            index_file.as_str(),
            "PDBbind2013-txt-format/INDEX_refined_data.2013"
        );
    }

    #[test]
    fn every_catalog_entry_has_a_layout() {
        for entry in DatasetCatalog::entries() {
            let dataset = DatasetRef::new(entry.release, entry.subset);
            assert!(PathResolver::layout(&dataset).is_ok(), "{dataset}");
        }
    }

    #[test]
    fn record_path_template() {
        let path =
            PathResolver::record_path(Utf8Path::new("refined-set"), "1abc", "_ligand", ".mol2");
        assert_eq!(path.as_str(), "refined-set/1abc/1abc_ligand.mol2");
    }
}
