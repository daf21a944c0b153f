//! Profile merging and deduplication.
//!
//! When a profile accumulates merge keys (emails, device ids), the merger
//! looks for duplicate profiles sharing those keys, folds them into the
//! current profile and returns the duplicates marked inactive so the
//! pipeline can persist them in the background.

use async_trait::async_trait;

use crate::error::Result;
use crate::profile::Profile;

/// Trait for profile deduplication.
#[async_trait]
pub trait Merger: Send + Sync {
    /// Merges duplicates of the given profile, up to `limit` candidates.
    ///
    /// Returns `None` when the profile has no merge keys, otherwise the
    /// duplicate profiles to persist as disabled. The returned profiles
    /// must already carry `active = false`.
    async fn merge(&self, profile: &Profile, limit: usize) -> Result<Option<Vec<Profile>>>;
}

/// A no-op merger for testing that never finds duplicates.
#[derive(Debug, Default)]
pub struct NoOpMerger;

#[async_trait]
impl Merger for NoOpMerger {
    async fn merge(&self, _profile: &Profile, _limit: usize) -> Result<Option<Vec<Profile>>> {
        Ok(None)
    }
}

/// A merger for testing that returns a canned list of disabled duplicates.
#[derive(Debug, Default)]
pub struct StaticMerger {
    duplicates: Vec<Profile>,
}

impl StaticMerger {
    /// Creates a merger returning the given duplicates, marked inactive.
    #[must_use]
    pub fn new(duplicates: Vec<Profile>) -> Self {
        let duplicates = duplicates
            .into_iter()
            .map(|mut profile| {
                profile.disable();
                profile
            })
            .collect();
        Self { duplicates }
    }
}

#[async_trait]
impl Merger for StaticMerger {
    async fn merge(&self, _profile: &Profile, _limit: usize) -> Result<Option<Vec<Profile>>> {
        Ok(Some(self.duplicates.clone()))
    }
}

/// A merger that always fails.
#[derive(Debug)]
pub struct FailingMerger {
    message: String,
}

impl FailingMerger {
    /// Creates a merger failing with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Merger for FailingMerger {
    async fn merge(&self, _profile: &Profile, _limit: usize) -> Result<Option<Vec<Profile>>> {
        Err(atrio_core::error::Error::internal(self.message.clone()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_merger_disables_duplicates() {
        let duplicate = Profile::new();
        let merger = StaticMerger::new(vec![duplicate]);

        let profile = Profile::new();
        let duplicates = merger.merge(&profile, 2000).await.unwrap().unwrap();
        assert_eq!(duplicates.len(), 1);
        assert!(!duplicates[0].active);
    }

    #[tokio::test]
    async fn noop_merger_finds_nothing() {
        let profile = Profile::new();
        assert!(NoOpMerger.merge(&profile, 2000).await.unwrap().is_none());
    }
}
