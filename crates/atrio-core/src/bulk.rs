//! Bulk write outcome value objects.
//!
//! Storage drivers report the outcome of bulk writes with
//! [`BulkInsertResult`]. A default-constructed result is the canonical
//! "nothing was written" outcome used when a save path is skipped on
//! purpose (for example, a profile that is not new).

use serde::{Deserialize, Serialize};

/// Outcome of a bulk insert against a storage driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkInsertResult {
    /// Number of documents accepted by the store.
    pub saved: u64,
    /// Driver-reported errors for rejected documents.
    pub errors: Vec<String>,
    /// Ids of the documents that were written.
    pub ids: Vec<String>,
}

impl BulkInsertResult {
    /// Creates an outcome for a successful write of the given ids.
    #[must_use]
    pub fn saved(ids: Vec<String>) -> Self {
        Self {
            saved: ids.len() as u64,
            errors: Vec::new(),
            ids,
        }
    }

    /// Returns true when nothing was written and nothing failed.
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        self.saved == 0 && self.errors.is_empty() && self.ids.is_empty()
    }

    /// Returns true when the driver reported any rejected document.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_the_no_op_outcome() {
        let result = BulkInsertResult::default();
        assert!(result.is_nothing());
        assert!(!result.has_errors());
    }

    #[test]
    fn saved_counts_ids() {
        let result = BulkInsertResult::saved(vec!["a".into(), "b".into()]);
        assert_eq!(result.saved, 2);
        assert!(!result.is_nothing());
    }

    #[test]
    fn serde_uses_camel_case() {
        let result = BulkInsertResult::saved(vec!["a".into()]);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"saved\":1"));
        assert!(json.contains("\"ids\":[\"a\"]"));
    }
}
