//! Naming Key and storage layout.
//!
//! Every run derives both of its file names from one [`NamingKey`]:
//! `{origin}_{format}_{timestamp}.{ext}` for the artifact and
//! `{origin}_{format}_{timestamp}_metadata.json` for its sidecar. Because both
//! names come from the same key, the pair can always be found again from either
//! file.

use crate::columnar::OutputFormat;
use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Timestamp rendering used in file names (UTC, millisecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S_%3f";

/// Second-precision rendering produced by earlier releases; still parsed.
pub const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Suffix appended to the stem for sidecar files.
pub const METADATA_SUFFIX: &str = "_metadata.json";

const TIMESTAMP_LEN: usize = 21;
const LEGACY_TIMESTAMP_LEN: usize = 17;

/// The `(origin, format, timestamp)` tuple both file names derive from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamingKey {
    origin: String,
    format: String,
    timestamp: DateTime<Utc>,
}

impl NamingKey {
    /// Build a key, validating both identifiers. The timestamp is truncated to
    /// milliseconds so the key survives a render/parse round trip.
    pub fn new(
        origin: impl Into<String>,
        format: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let origin = origin.into();
        let format = format.into();
        validate_origin(&origin)?;
        validate_format(&format)?;
        Ok(Self {
            origin,
            format,
            timestamp: timestamp.trunc_subsecs(3),
        })
    }

    pub fn now(origin: impl Into<String>, format: impl Into<String>) -> Result<Self> {
        Self::new(origin, format, Utc::now())
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn timestamp_str(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn stem(&self) -> String {
        format!("{}_{}_{}", self.origin, self.format, self.timestamp_str())
    }

    pub fn artifact_file_name(&self, output: OutputFormat) -> String {
        format!("{}.{}", self.stem(), output.extension())
    }

    pub fn metadata_file_name(&self) -> String {
        format!("{}{METADATA_SUFFIX}", self.stem())
    }

    /// Inverse of [`stem`](Self::stem). The origin may itself contain `_`.
    pub fn parse_stem(stem: &str) -> Result<Self> {
        let invalid = || PipelineError::invalid_input(format!("'{stem}' is not a naming key"));

        let (head, timestamp) = [
            (TIMESTAMP_LEN, TIMESTAMP_FORMAT),
            (LEGACY_TIMESTAMP_LEN, LEGACY_TIMESTAMP_FORMAT),
        ]
        .iter()
        .find_map(|&(len, fmt)| split_timestamp(stem, len, fmt))
        .ok_or_else(invalid)?;

        let (origin, format) = head.rsplit_once('_').ok_or_else(invalid)?;
        Self::new(origin, format, timestamp)
    }

    /// Recover the key and output format from an artifact path.
    pub fn from_artifact_path(path: &Path) -> Result<(Self, OutputFormat)> {
        let invalid =
            || PipelineError::invalid_input(format!("'{}' is not a data artifact", path.display()));
        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
        let output = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(OutputFormat::from_extension)
            .ok_or_else(invalid)?;
        Ok((Self::parse_stem(stem)?, output))
    }

    /// Recover the key from a sidecar path.
    pub fn from_metadata_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|n| n.strip_suffix(METADATA_SUFFIX))
            .ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "'{}' is not a metadata sidecar",
                    path.display()
                ))
            })?;
        Self::parse_stem(name)
    }
}

impl std::fmt::Display for NamingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stem())
    }
}

fn split_timestamp(stem: &str, len: usize, fmt: &str) -> Option<(String, DateTime<Utc>)> {
    let split = stem.len().checked_sub(len + 1)?;
    let head = stem.get(..split)?;
    let rest = stem.get(split..)?;
    let raw = rest.strip_prefix('_')?;
    let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
    Some((head.to_string(), naive.and_utc()))
}

fn validate_origin(origin: &str) -> Result<()> {
    if origin.is_empty() {
        return Err(PipelineError::invalid_input("origin must not be empty"));
    }
    if !origin
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PipelineError::invalid_input(format!(
            "origin '{origin}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

fn validate_format(format: &str) -> Result<()> {
    if format.is_empty()
        || !format
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(PipelineError::invalid_input(format!(
            "format '{format}' must be lowercase letters and digits only"
        )));
    }
    Ok(())
}

/// Storage tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Bronze, Tier::Silver, Tier::Gold];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            other => Err(PipelineError::invalid_input(format!("unknown tier '{other}'"))),
        }
    }
}

/// Resolved storage directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub bronze: PathBuf,
    pub silver: PathBuf,
    pub gold: PathBuf,
    pub metadata: PathBuf,
    pub partition_by_date: bool,
}

impl StorageLayout {
    /// Resolve the configured directories; relative paths are joined to `root`.
    pub fn from_config(storage: &StorageConfig, root: &Path) -> Self {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        Self {
            bronze: resolve(&storage.bronze_dir),
            silver: resolve(&storage.silver_dir),
            gold: resolve(&storage.gold_dir),
            metadata: resolve(&storage.metadata_dir),
            partition_by_date: storage.partition_metadata_by_date,
        }
    }

    pub fn tier_dir(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Bronze => &self.bronze,
            Tier::Silver => &self.silver,
            Tier::Gold => &self.gold,
        }
    }

    /// Root of the sidecars for a tier (`metadata/<tier>`).
    pub fn metadata_root(&self, tier: Tier) -> PathBuf {
        self.metadata.join(tier.as_str())
    }

    /// Directory holding the sidecar for a key produced at `timestamp`.
    pub fn metadata_dir(&self, tier: Tier, timestamp: DateTime<Utc>) -> PathBuf {
        let root = self.metadata_root(tier);
        if self.partition_by_date {
            root.join(format!("{:04}", timestamp.year()))
                .join(format!("{:02}", timestamp.month()))
                .join(format!("{:02}", timestamp.day()))
        } else {
            root
        }
    }

    pub fn artifact_path(&self, key: &NamingKey, tier: Tier, output: OutputFormat) -> PathBuf {
        self.tier_dir(tier).join(key.artifact_file_name(output))
    }

    pub fn metadata_path(&self, key: &NamingKey, tier: Tier) -> PathBuf {
        self.metadata_dir(tier, key.timestamp())
            .join(key.metadata_file_name())
    }

    /// Create every tier directory and the metadata root. Existing directories
    /// are left untouched.
    pub fn ensure_dirs(&self) -> Result<()> {
        let mut dirs: Vec<PathBuf> = Tier::ALL
            .iter()
            .map(|t| self.tier_dir(*t).to_path_buf())
            .collect();
        dirs.push(self.metadata.clone());
        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| PipelineError::write(&dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 4).unwrap() + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn test_stem_and_file_names() {
        let key = NamingKey::new("demo", "csv", ts()).unwrap();
        assert_eq!(key.stem(), "demo_csv_2026-03-07_090504_042");
        assert_eq!(
            key.artifact_file_name(OutputFormat::Parquet),
            "demo_csv_2026-03-07_090504_042.parquet"
        );
        assert_eq!(
            key.metadata_file_name(),
            "demo_csv_2026-03-07_090504_042_metadata.json"
        );
    }

    #[test]
    fn test_parse_stem_with_underscored_origin() {
        let key = NamingKey::new("sales_eu-west", "api", ts()).unwrap();
        let parsed = NamingKey::parse_stem(&key.stem()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.origin(), "sales_eu-west");
    }

    #[test]
    fn test_parse_legacy_stem() {
        let parsed = NamingKey::parse_stem("products_api_2024-01-15_143000").unwrap();
        assert_eq!(parsed.origin(), "products");
        assert_eq!(parsed.format(), "api");
        assert_eq!(
            parsed.timestamp(),
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(NamingKey::new("", "csv", ts()).is_err());
        assert!(NamingKey::new("bad/origin", "csv", ts()).is_err());
        assert!(NamingKey::new("demo", "CSV", ts()).is_err());
        assert!(NamingKey::new("demo", "web_scraping", ts()).is_err());
        assert!(NamingKey::parse_stem("demo.csv").is_err());
    }

    #[test]
    fn test_from_paths() {
        let key = NamingKey::new("demo", "csv", ts()).unwrap();
        let artifact = PathBuf::from("/data/bronze").join(key.artifact_file_name(OutputFormat::Jsonl));
        let (parsed, output) = NamingKey::from_artifact_path(&artifact).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(output, OutputFormat::Jsonl);

        let sidecar = PathBuf::from("/metadata").join(key.metadata_file_name());
        assert_eq!(NamingKey::from_metadata_path(&sidecar).unwrap(), key);
        assert!(NamingKey::from_metadata_path(&artifact).is_err());
    }

    #[test]
    fn test_metadata_partitioning() {
        let mut layout = StorageLayout::from_config(&StorageConfig::default(), Path::new("/ws"));
        let key = NamingKey::new("demo", "csv", ts()).unwrap();
        assert_eq!(
            layout.metadata_path(&key, Tier::Bronze),
            PathBuf::from("/ws/metadata/bronze/2026/03/07/demo_csv_2026-03-07_090504_042_metadata.json")
        );
        layout.partition_by_date = false;
        assert_eq!(
            layout.metadata_path(&key, Tier::Silver),
            PathBuf::from("/ws/metadata/silver/demo_csv_2026-03-07_090504_042_metadata.json")
        );
        assert_eq!(
            layout.artifact_path(&key, Tier::Bronze, OutputFormat::Parquet),
            PathBuf::from("/ws/data/bronze/demo_csv_2026-03-07_090504_042.parquet")
        );
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::from_config(&StorageConfig::default(), dir.path());
        layout.ensure_dirs().unwrap();
        layout.ensure_dirs().unwrap();
        assert!(layout.bronze.is_dir());
        assert!(layout.silver.is_dir());
        assert!(layout.gold.is_dir());
        assert!(layout.metadata.is_dir());
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("Silver".parse::<Tier>().unwrap(), Tier::Silver);
        assert!("platinum".parse::<Tier>().is_err());
    }
}
