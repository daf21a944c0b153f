//! Post-workflow profile segmentation.
//!
//! After flows have run, the segmenter re-evaluates segment membership for
//! the event types that executed. Like the workflow engine it is a
//! best-effort collaborator behind a trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::profile::Profile;

/// A segment definition evaluated against profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDefinition {
    /// Unique segment id.
    pub id: String,
    /// Segment name added to matching profiles.
    pub name: String,
    /// Event type that triggers re-evaluation of this segment.
    pub event_type: String,
    /// Membership condition.
    pub condition: Value,
}

/// Loads segment definitions for the segmenter.
#[async_trait]
pub trait SegmentLoader: Send + Sync {
    /// Segment definitions triggered by the given event type.
    async fn load_segments(&self, event_type: &str) -> Result<Vec<SegmentDefinition>>;
}

/// One segmentation decision made for the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationEntry {
    /// Event type that triggered the evaluation.
    pub event_type: String,
    /// Segment that was evaluated.
    pub segment: String,
    /// Whether the profile was added to the segment.
    pub added: bool,
}

/// All segmentation decisions made for one request.
pub type SegmentationResult = Vec<SegmentationEntry>;

/// Trait for segment re-evaluation.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Re-evaluates segment membership for the event types that had flows
    /// executed, mutating the profile in place.
    async fn segment(
        &self,
        profile: &mut Profile,
        ran_event_types: &[String],
        loader: &dyn SegmentLoader,
    ) -> Result<SegmentationResult>;
}

/// A no-op segmenter for testing that changes nothing.
#[derive(Debug, Default)]
pub struct NoOpSegmenter;

#[async_trait]
impl Segmenter for NoOpSegmenter {
    async fn segment(
        &self,
        _profile: &mut Profile,
        _ran_event_types: &[String],
        _loader: &dyn SegmentLoader,
    ) -> Result<SegmentationResult> {
        Ok(Vec::new())
    }
}

/// A segmenter for testing that applies a canned result to the profile.
#[derive(Debug, Default)]
pub struct StaticSegmenter {
    result: SegmentationResult,
}

impl StaticSegmenter {
    /// Creates a segmenter returning the given result.
    #[must_use]
    pub fn new(result: SegmentationResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl Segmenter for StaticSegmenter {
    async fn segment(
        &self,
        profile: &mut Profile,
        _ran_event_types: &[String],
        _loader: &dyn SegmentLoader,
    ) -> Result<SegmentationResult> {
        for entry in &self.result {
            if entry.added {
                profile.add_segment(entry.segment.clone());
            }
        }
        Ok(self.result.clone())
    }
}

/// A segmenter that always fails.
#[derive(Debug)]
pub struct FailingSegmenter {
    message: String,
}

impl FailingSegmenter {
    /// Creates a segmenter failing with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Segmenter for FailingSegmenter {
    async fn segment(
        &self,
        _profile: &mut Profile,
        _ran_event_types: &[String],
        _loader: &dyn SegmentLoader,
    ) -> Result<SegmentationResult> {
        Err(atrio_core::error::Error::internal(self.message.clone()).into())
    }
}
