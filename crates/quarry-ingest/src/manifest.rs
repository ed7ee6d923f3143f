//! Manifest file handling
//!
//! A manifest declares the datasets to ingest plus run settings. The on-disk
//! form ([`ManifestFile`]) is permissive; it only becomes a [`Manifest`] by
//! passing [`ManifestFile::validate`], which reports every problem at once.

use crate::error::{IngestError, Result};
use quarry_common::checksum::short_fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Length of the manifest audit fingerprint
const MANIFEST_HASH_LEN: usize = 16;

// ============================================================================
// Sources
// ============================================================================

/// Upstream catalog a dataset is fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// CKAN-style open data catalog
    #[serde(rename = "data.gov")]
    DataGov,
    /// Federal Reserve Economic Data time series
    #[serde(rename = "fred")]
    Fred,
}

impl SourceKind {
    /// Tag used in manifests and stored records
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::DataGov => "data.gov",
            SourceKind::Fred => "fred",
        }
    }

    /// Directory name used for artifacts ("." is not path friendly)
    pub fn dir_name(&self) -> String {
        self.as_str().replace('.', "_")
    }

    /// Environment variable consulted for this source's API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            SourceKind::DataGov => "DATA_GOV_API_KEY",
            SourceKind::Fred => "FRED_API_KEY",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "data.gov" | "data_gov" | "datagov" => Ok(SourceKind::DataGov),
            "fred" => Ok(SourceKind::Fred),
            other => Err(IngestError::config(format!("Unsupported source: {other}"))),
        }
    }
}

/// How a catalog dataset is located
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogLocator {
    /// Exact package id or name
    DatasetId(String),
    /// Search query; the first hit is used
    Query(String),
}

/// Source-specific locator for a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Catalog(CatalogLocator),
    Fred { series_id: String },
}

impl Locator {
    pub fn source(&self) -> SourceKind {
        match self {
            Locator::Catalog(_) => SourceKind::DataGov,
            Locator::Fred { .. } => SourceKind::Fred,
        }
    }
}

// ============================================================================
// Validated manifest
// ============================================================================

/// Descriptive metadata carried by a dataset spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMetadata {
    pub update_cadence: Option<String>,
    pub license: Option<String>,
    pub description: Option<String>,
    pub fields_of_interest: Vec<String>,
}

/// One dataset to ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub id: String,
    pub locator: Locator,
    /// Declared payload format (descriptive; fetchers report the real one)
    pub format: String,
    pub metadata: SpecMetadata,
}

impl DatasetSpec {
    pub fn source(&self) -> SourceKind {
        self.locator.source()
    }

    /// Title registered for the dataset
    pub fn title(&self) -> &str {
        self.metadata.description.as_deref().unwrap_or(&self.id)
    }
}

/// Metadata store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreType {
    /// SQLite database (`metadata.db`)
    #[default]
    #[serde(rename = "structured-db", alias = "duckdb", alias = "sqlite", alias = "db")]
    StructuredDb,
    /// JSON document (`metadata.json`)
    #[serde(rename = "flat-file", alias = "files", alias = "json")]
    FlatFile,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::StructuredDb => "structured-db",
            StoreType::FlatFile => "flat-file",
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "structured-db" | "duckdb" | "sqlite" | "db" => Ok(StoreType::StructuredDb),
            "flat-file" | "files" | "json" => Ok(StoreType::FlatFile),
            other => Err(IngestError::config(format!("Unknown store type: {other}"))),
        }
    }
}

/// Run settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub store_type: StoreType,
    pub log_level: String,
    /// API keys by source tag (e.g. "fred")
    pub api_keys: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            store_type: StoreType::default(),
            log_level: "INFO".to_string(),
            api_keys: BTreeMap::new(),
        }
    }
}

/// A validated manifest; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub sources: Vec<DatasetSpec>,
    pub settings: Settings,
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ManifestFile::load(path)?.validate()
    }

    /// Replace the output directory (CLI `--data-dir`)
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.output_dir = dir.into();
        self
    }

    /// Stable fingerprint of the whole manifest, recorded for audit
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(short_fingerprint(&canonical, MANIFEST_HASH_LEN))
    }
}

// ============================================================================
// On-disk form
// ============================================================================

/// Dataset entry as written in a manifest file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: String,
    pub dataset_id: Option<String>,
    pub series_id: Option<String>,
    pub query: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    pub update_cadence: Option<String>,
    pub license: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub fields_of_interest: Vec<String>,
}

fn default_format() -> String {
    "JSON".to_string()
}

/// Settings block as written in a manifest file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsEntry {
    pub output_dir: Option<PathBuf>,
    pub store_type: Option<StoreType>,
    pub log_level: Option<String>,
    pub api_keys: Option<BTreeMap<String, String>>,
}

impl From<SettingsEntry> for Settings {
    fn from(entry: SettingsEntry) -> Self {
        let defaults = Settings::default();
        Self {
            output_dir: entry.output_dir.unwrap_or(defaults.output_dir),
            store_type: entry.store_type.unwrap_or(defaults.store_type),
            log_level: entry.log_level.unwrap_or(defaults.log_level),
            api_keys: entry.api_keys.unwrap_or_default(),
        }
    }
}

/// Manifest as parsed from YAML or JSON, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sources: Vec<SpecEntry>,
    #[serde(default)]
    pub settings: Option<SettingsEntry>,
}

impl ManifestFile {
    /// Load from a file, choosing the parser by extension
    ///
    /// `.yaml`/`.yml` are YAML, `.json` is JSON; anything else tries YAML first
    /// and then JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IngestError::ManifestLoad(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str::<Option<Self>>(content)
            .map(Option::unwrap_or_default)
            .map_err(|e| IngestError::ManifestLoad(format!("Failed to parse YAML: {e}")))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| IngestError::ManifestLoad(format!("Failed to parse JSON: {e}")))
    }

    /// Validate into a [`Manifest`], collecting every error
    pub fn validate(self) -> Result<Manifest> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Manifest must have a name".to_string());
        }

        if self.sources.is_empty() {
            errors.push("Manifest must have at least one source".to_string());
        }

        let mut seen_ids = HashSet::new();
        let mut specs = Vec::with_capacity(self.sources.len());

        for (index, entry) in self.sources.into_iter().enumerate() {
            let label = if entry.id.trim().is_empty() {
                errors.push(format!("Dataset spec #{} missing id", index + 1));
                format!("#{}", index + 1)
            } else {
                if !seen_ids.insert(entry.id.clone()) {
                    errors.push(format!("Duplicate dataset id: {}", entry.id));
                }
                entry.id.clone()
            };

            match build_locator(&entry, &label) {
                Ok(locator) => specs.push(DatasetSpec {
                    id: entry.id,
                    locator,
                    format: entry.format,
                    metadata: SpecMetadata {
                        update_cadence: entry.update_cadence,
                        license: entry.license,
                        description: entry.description,
                        fields_of_interest: entry.fields_of_interest,
                    },
                }),
                Err(message) => errors.push(message),
            }
        }

        if !errors.is_empty() {
            return Err(IngestError::Validation(errors));
        }

        Ok(Manifest {
            name: self.name,
            description: self.description.unwrap_or_default(),
            sources: specs,
            settings: self.settings.unwrap_or_default().into(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn build_locator(entry: &SpecEntry, label: &str) -> std::result::Result<Locator, String> {
    if entry.source.trim().is_empty() {
        return Err(format!("Dataset {label} missing source"));
    }

    let source: SourceKind = entry
        .source
        .parse()
        .map_err(|_| format!("Dataset {label} has unsupported source: {}", entry.source))?;

    match source {
        SourceKind::Fred => non_empty(&entry.series_id)
            .map(|series_id| Locator::Fred { series_id })
            .ok_or_else(|| format!("FRED dataset {label} requires series_id")),
        SourceKind::DataGov => non_empty(&entry.dataset_id)
            .map(CatalogLocator::DatasetId)
            .or_else(|| non_empty(&entry.query).map(CatalogLocator::Query))
            .map(Locator::Catalog)
            .ok_or_else(|| format!("data.gov dataset {label} requires dataset_id or query")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PHASE1: &str = r#"
name: phase1
description: Economic indicators
sources:
  - id: hospitals
    source: data.gov
    query: hospital general information
    format: CSV
    license: public-domain
  - id: gdp
    source: fred
    series_id: GDP
    update_cadence: quarterly
settings:
  output_dir: ./out
  store_type: flat-file
  api_keys:
    fred: abc123
"#;

    #[test]
    fn test_parse_and_validate_yaml() {
        let manifest = ManifestFile::from_yaml(PHASE1).unwrap().validate().unwrap();

        assert_eq!(manifest.name, "phase1");
        assert_eq!(manifest.sources.len(), 2);
        assert_eq!(
            manifest.sources[0].locator,
            Locator::Catalog(CatalogLocator::Query("hospital general information".into()))
        );
        assert_eq!(
            manifest.sources[1].locator,
            Locator::Fred {
                series_id: "GDP".into()
            }
        );
        assert_eq!(manifest.sources[1].format, "JSON");
        assert_eq!(manifest.settings.store_type, StoreType::FlatFile);
        assert_eq!(manifest.settings.output_dir, PathBuf::from("./out"));
        assert_eq!(manifest.settings.api_keys.get("fred").unwrap(), "abc123");
        assert_eq!(manifest.settings.log_level, "INFO");
    }

    #[test]
    fn test_validation_reports_all_errors() {
        let yaml = r#"
name: broken
sources:
  - id: gdp
    source: fred
  - id: gdp
    source: data.gov
  - source: fred
    series_id: CPI
  - id: mystery
    source: worldbank
"#;
        let err = ManifestFile::from_yaml(yaml).unwrap().validate().unwrap_err();
        let IngestError::Validation(errors) = err else {
            panic!("expected validation error");
        };

        assert!(errors.contains(&"FRED dataset gdp requires series_id".to_string()));
        assert!(errors.contains(&"Duplicate dataset id: gdp".to_string()));
        assert!(errors.contains(&"data.gov dataset gdp requires dataset_id or query".to_string()));
        assert!(errors.contains(&"Dataset spec #3 missing id".to_string()));
        assert!(errors.iter().any(|e| e.contains("unsupported source: worldbank")));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_missing_name_and_sources() {
        let err = ManifestFile::from_yaml("description: empty\n")
            .unwrap()
            .validate()
            .unwrap_err();
        let IngestError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors,
            vec![
                "Manifest must have a name".to_string(),
                "Manifest must have at least one source".to_string()
            ]
        );
    }

    #[test]
    fn test_dataset_id_preferred_over_query() {
        let yaml = r#"
name: m
sources:
  - id: a
    source: data.gov
    dataset_id: pkg-1
    query: ignored
"#;
        let manifest = ManifestFile::from_yaml(yaml).unwrap().validate().unwrap();
        assert_eq!(
            manifest.sources[0].locator,
            Locator::Catalog(CatalogLocator::DatasetId("pkg-1".into()))
        );
    }

    #[test]
    fn test_store_type_aliases() {
        let yaml = "name: m\nsources: []\nsettings:\n  store_type: duckdb\n";
        let file = ManifestFile::from_yaml(yaml).unwrap();
        assert_eq!(
            file.settings.unwrap().store_type,
            Some(StoreType::StructuredDb)
        );
        assert_eq!("files".parse::<StoreType>().unwrap(), StoreType::FlatFile);
        assert!("parquet".parse::<StoreType>().is_err());
    }

    #[test]
    fn test_load_detects_format_by_extension() {
        let dir = TempDir::new().unwrap();

        let json_path = dir.path().join("m.json");
        fs::write(
            &json_path,
            r#"{"name": "j", "sources": [{"id": "gdp", "source": "fred", "series_id": "GDP"}]}"#,
        )
        .unwrap();
        assert_eq!(Manifest::load(&json_path).unwrap().name, "j");

        let yaml_path = dir.path().join("m.yml");
        fs::write(&yaml_path, PHASE1).unwrap();
        assert_eq!(Manifest::load(&yaml_path).unwrap().name, "phase1");

        let other_path = dir.path().join("manifest.conf");
        fs::write(&other_path, PHASE1).unwrap();
        assert_eq!(Manifest::load(&other_path).unwrap().sources.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Manifest::load("/nonexistent/manifest.yaml").unwrap_err();
        assert!(matches!(err, IngestError::ManifestLoad(_)));
        assert!(err.is_run_fatal());
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let manifest = ManifestFile::from_yaml(PHASE1).unwrap().validate().unwrap();
        let first = manifest.fingerprint().unwrap();
        assert_eq!(first.len(), 16);
        assert_eq!(first, manifest.clone().fingerprint().unwrap());

        let moved = manifest.with_output_dir("/elsewhere");
        assert_ne!(first, moved.fingerprint().unwrap());
    }

    #[test]
    fn test_source_kind_helpers() {
        assert_eq!(SourceKind::DataGov.dir_name(), "data_gov");
        assert_eq!(SourceKind::Fred.api_key_env(), "FRED_API_KEY");
        assert_eq!("FRED".parse::<SourceKind>().unwrap(), SourceKind::Fred);
    }
}
