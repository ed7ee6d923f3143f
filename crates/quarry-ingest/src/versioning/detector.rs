//! Content change detection

use super::store::VersionStore;
use crate::error::Result;
use quarry_common::checksum;
use std::sync::Arc;

/// Outcome of comparing fetched content against the latest version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDecision {
    pub fingerprint: String,
    pub previous: Option<String>,
    /// Whether the content should be normalized and persisted
    pub changed: bool,
}

impl ChangeDecision {
    /// First time this dataset has been seen
    pub fn is_new(&self) -> bool {
        self.previous.is_none()
    }
}

/// Compares content fingerprints with the store's latest version
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn VersionStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self { store }
    }

    /// 64-char lowercase hex SHA-256 of the content
    pub fn fingerprint(content: &[u8]) -> String {
        checksum::fingerprint(content)
    }

    pub async fn last_fingerprint(&self, dataset_id: &str) -> Result<Option<String>> {
        self.store.latest_hash(dataset_id).await
    }

    /// Decide whether `content` differs from the last recorded version
    ///
    /// With `force`, the content always counts as changed.
    pub async fn detect(&self, dataset_id: &str, content: &[u8], force: bool) -> Result<ChangeDecision> {
        let fingerprint = Self::fingerprint(content);
        let previous = self.last_fingerprint(dataset_id).await?;
        let changed = force || previous.as_deref() != Some(fingerprint.as_str());

        Ok(ChangeDecision {
            fingerprint,
            previous,
            changed,
        })
    }
}
