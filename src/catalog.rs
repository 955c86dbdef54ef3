use serde::Serialize;

use crate::domain::{ArchiveSpec, DatasetRef, Subset};
use crate::error::PdbbindError;

pub const DEFAULT_BASE_URL: &str = "http://www.pdbbind.org.cn/download/";

struct ReleaseEntry {
    release: u16,
    subsets: &'static [(Subset, &'static [&'static str])],
}

// Adding a release also needs a matching rule in `layout::PathResolver`.
const RELEASES: &[ReleaseEntry] = &[
    ReleaseEntry {
        release: 2007,
        subsets: &[
            (Subset::Casf, &["CASF-2007.tar.gz"]),
            (Subset::Refined, &["pdbbind_v2007.tar.gz"]),
        ],
    },
    ReleaseEntry {
        release: 2013,
        subsets: &[
            (
                Subset::Casf,
                &["CASF-2013-updated.tar.gz", "PDBbind2013-txt-format.tar"],
            ),
            (Subset::Refined, &["pdbbind_v2013_refined_set.tar.gz"]),
        ],
    },
    ReleaseEntry {
        release: 2016,
        subsets: &[
            (Subset::Casf, &["CASF-2016.tar.gz"]),
            (Subset::Refined, &["pdbbind_v2016_refined.tar.gz"]),
        ],
    },
    ReleaseEntry {
        release: 2019,
        subsets: &[(Subset::Refined, &["pdbbind_v2019_refined.tar.gz"])],
    },
    ReleaseEntry {
        release: 2020,
        subsets: &[(Subset::Refined, &["PDBbind_v2020_refined.tar.gz"])],
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub release: u16,
    pub subset: Subset,
    pub archives: Vec<String>,
}

/// Static registry of PDBbind releases and the archives each subset ships in.
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    base_url: String,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl DatasetCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Archive names for a dataset, in registry order.
    pub fn archive_names(dataset: &DatasetRef) -> Result<&'static [&'static str], PdbbindError> {
        let entry = RELEASES
            .iter()
            .find(|entry| entry.release == dataset.release)
            .ok_or(PdbbindError::UnknownRelease(dataset.release))?;
        entry
            .subsets
            .iter()
            .find(|(subset, _)| *subset == dataset.subset)
            .map(|(_, archives)| *archives)
            .ok_or_else(|| PdbbindError::UnknownSubset {
                release: dataset.release,
                subset: dataset.subset.to_string(),
            })
    }

    pub fn resolve(&self, dataset: &DatasetRef) -> Result<Vec<ArchiveSpec>, PdbbindError> {
        let names = Self::archive_names(dataset)?;
        Ok(names
            .iter()
            .map(|name| ArchiveSpec {
                url: format!("{}{}", self.base_url, name),
                file_name: name.to_string(),
            })
            .collect())
    }

    pub fn entries() -> Vec<CatalogEntry> {
        RELEASES
            .iter()
            .flat_map(|entry| {
                entry.subsets.iter().map(|(subset, archives)| CatalogEntry {
                    release: entry.release,
                    subset: *subset,
                    archives: archives.iter().map(|name| name.to_string()).collect(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn resolve_keeps_registry_order() {
        let catalog = DatasetCatalog::default();
        let specs = catalog
            .resolve(&DatasetRef::new(2013, Subset::Casf))
            .unwrap();
        let names: Vec<_> = specs.iter().map(|spec| spec.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["CASF-2013-updated.tar.gz", "PDBbind2013-txt-format.tar"]
        );
        assert_eq!(
            specs[0].url,
            "http://www.pdbbind.org.cn/download/CASF-2013-updated.tar.gz"
        );
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let catalog = DatasetCatalog::new("http://mirror.local/pdbbind");
        let specs = catalog
            .resolve(&DatasetRef::new(2020, Subset::Refined))
            .unwrap();
        assert_eq!(
            specs[0].url,
            "http://mirror.local/pdbbind/PDBbind_v2020_refined.tar.gz"
        );
    }

    #[test]
    fn unknown_release_and_subset() {
        let catalog = DatasetCatalog::default();
        let err = catalog
            .resolve(&DatasetRef::new(2042, Subset::Refined))
            .unwrap_err();
        assert_matches!(err, PdbbindError::UnknownRelease(2042));

        let err = catalog
            .resolve(&DatasetRef::new(2019, Subset::Casf))
            .unwrap_err();
        assert_matches!(err, PdbbindError::UnknownSubset { release: 2019, .. });
    }
}
