//! Read-only view over the storage tiers.
//!
//! File names remain the source of truth: a scan pairs every artifact with
//! the sidecar of the same stem and reports anything that does not pair up.

use crate::columnar::OutputFormat;
use crate::error::Result;
use crate::metadata::MetadataRecord;
use crate::naming::{METADATA_SUFFIX, NamingKey, StorageLayout, Tier};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An artifact and its sidecar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub key: NamingKey,
    pub tier: Tier,
    pub output: OutputFormat,
    pub data_path: PathBuf,
    pub metadata_path: PathBuf,
    pub record: MetadataRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum CatalogIssue {
    MissingMetadata { tier: Tier, artifact: PathBuf },
    MissingArtifact { tier: Tier, metadata: PathBuf },
    MalformedMetadata {
        tier: Tier,
        metadata: PathBuf,
        message: String,
    },
}

impl std::fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingMetadata { tier, artifact } => {
                write!(f, "[{tier}] {} has no metadata", artifact.display())
            }
            Self::MissingArtifact { tier, metadata } => {
                write!(f, "[{tier}] {} has no data artifact", metadata.display())
            }
            Self::MalformedMetadata {
                tier,
                metadata,
                message,
            } => write!(f, "[{tier}] {} is malformed: {message}", metadata.display()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    issues: Vec<CatalogIssue>,
}

struct Artifact {
    key: NamingKey,
    output: OutputFormat,
    path: PathBuf,
}

impl Catalog {
    /// Walk every tier and its metadata directory.
    pub fn scan(layout: &StorageLayout) -> Result<Self> {
        let mut catalog = Self::default();
        for tier in Tier::ALL {
            catalog.scan_tier(layout, tier);
        }
        catalog.entries.sort_by(|a, b| {
            (a.tier, a.key.origin(), a.key.timestamp()).cmp(&(b.tier, b.key.origin(), b.key.timestamp()))
        });
        Ok(catalog)
    }

    fn scan_tier(&mut self, layout: &StorageLayout, tier: Tier) {
        let mut artifacts: BTreeMap<String, Vec<Artifact>> = BTreeMap::new();
        for path in files(layout.tier_dir(tier), Some(1)) {
            // Temporary files and anything outside the convention are ignored.
            let Ok((key, output)) = NamingKey::from_artifact_path(&path) else {
                continue;
            };
            artifacts.entry(key.stem()).or_default().push(Artifact { key, output, path });
        }

        let mut sidecars: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in files(&layout.metadata_root(tier), None) {
            let is_sidecar = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(METADATA_SUFFIX));
            if !is_sidecar {
                continue;
            }
            if let Ok(key) = NamingKey::from_metadata_path(&path) {
                sidecars.insert(key.stem(), path);
            }
        }

        for (stem, metadata_path) in sidecars {
            let Some(candidates) = artifacts.remove(&stem) else {
                self.issues.push(CatalogIssue::MissingArtifact {
                    tier,
                    metadata: metadata_path,
                });
                continue;
            };
            let record = match MetadataRecord::from_path(&metadata_path) {
                Ok(record) => record,
                Err(e) => {
                    self.issues.push(CatalogIssue::MalformedMetadata {
                        tier,
                        metadata: metadata_path,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let mut paired = false;
            for artifact in candidates {
                let name = artifact
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
                if !paired && name.as_deref() == Some(record.data_file.as_str()) {
                    paired = true;
                    self.entries.push(CatalogEntry {
                        key: artifact.key,
                        tier,
                        output: artifact.output,
                        data_path: artifact.path,
                        metadata_path: metadata_path.clone(),
                        record: record.clone(),
                    });
                } else {
                    self.issues.push(CatalogIssue::MissingMetadata {
                        tier,
                        artifact: artifact.path,
                    });
                }
            }
            if !paired {
                self.issues.push(CatalogIssue::MissingArtifact {
                    tier,
                    metadata: metadata_path,
                });
            }
        }

        for artifact in artifacts.into_values().flatten() {
            self.issues.push(CatalogIssue::MissingMetadata {
                tier,
                artifact: artifact.path,
            });
        }
    }

    /// Paired entries, optionally restricted to one tier.
    pub fn entries(&self, tier: Option<Tier>) -> impl Iterator<Item = &CatalogEntry> + '_ {
        self.entries
            .iter()
            .filter(move |e| tier.is_none_or(|t| e.tier == t))
    }

    pub fn by_origin<'a>(
        &'a self,
        tier: Option<Tier>,
        origin: &'a str,
    ) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.entries(tier).filter(move |e| e.key.origin() == origin)
    }

    /// Most recent entry for an origin in a tier.
    pub fn latest(&self, tier: Tier, origin: &str) -> Option<&CatalogEntry> {
        self.entries(Some(tier))
            .filter(|e| e.key.origin() == origin)
            .max_by_key(|e| e.key.timestamp())
    }

    pub fn issues(&self) -> &[CatalogIssue] {
        &self.issues
    }

    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn files(root: &Path, max_depth: Option<usize>) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }
    walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}
