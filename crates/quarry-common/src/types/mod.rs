//! Common types used across Quarry
//!
//! These are the records the version stores persist and the CLI reads back.

use crate::error::QuarryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Schema Types
// ============================================================================

/// Inferred type of a normalized field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Integer,
    Number,
    Date,
    String,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::String => "string",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldType {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(FieldType::Boolean),
            "integer" => Ok(FieldType::Integer),
            "number" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "string" => Ok(FieldType::String),
            "array" => Ok(FieldType::Array),
            "object" => Ok(FieldType::Object),
            other => Err(QuarryError::InvalidFieldType(other.to_string())),
        }
    }
}

/// One field of an inferred schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    pub nullable: bool,
}

/// Inferred schema of a normalized record batch
///
/// Fields keep the order in which they were first seen in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldSchema>,
    pub row_count: usize,
}

impl Schema {
    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Inferred type of a field, if the field exists
    pub fn type_of(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }
}

// ============================================================================
// Version Store Records
// ============================================================================

/// Aggregate status of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "completed_with_errors" => Ok(RunStatus::CompletedWithErrors),
            other => Err(QuarryError::InvalidStatus(other.to_string())),
        }
    }
}

/// A persisted ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub manifest_name: String,
    pub manifest_hash: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,

    /// Datasets that succeeded or were skipped
    pub datasets_processed: usize,
    pub datasets_failed: usize,
}

/// A registered dataset plus a view of its latest version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub source: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub latest_hash: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One append-only version of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Monotonic sequence assigned by the store; breaks retrieval-time ties
    pub sequence: i64,
    pub dataset_id: String,
    pub run_id: String,
    pub raw_path: String,
    pub normalized_path: Option<String>,
    pub content_hash: String,
    pub row_count: Option<usize>,
    pub retrieved_at: DateTime<Utc>,
    pub schema: Option<Schema>,
}

impl DatasetVersion {
    /// Ordering key for "latest version" selection
    pub fn recency_key(&self) -> (DateTime<Utc>, i64) {
        (self.retrieved_at, self.sequence)
    }
}
