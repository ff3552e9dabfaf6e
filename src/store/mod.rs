//! Persistence boundary for the progress engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::engine::badges::BadgeAward;
use crate::engine::progress::{LearnerProgress, ProgressDelta};
use crate::models::*;

mod memory;
mod pg;

#[cfg(test)]
pub use memory::Fixture;
pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to load fixture: {0}")]
    Fixture(String),

    #[error("stored value out of range: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn student(&self, id: StudentId) -> Result<Option<Student>, StoreError>;

    async fn assessment(&self, id: AssessmentId) -> Result<Option<Assessment>, StoreError>;

    async fn topic(&self, id: TopicId) -> Result<Option<Topic>, StoreError>;

    async fn conservation(&self, id: ConservationId) -> Result<Option<Conservation>, StoreError>;

    /// Topics of a conservation, in no particular order.
    async fn topics_in(&self, conservation: ConservationId) -> Result<Vec<Topic>, StoreError>;

    /// Conservations of a region, in no particular order.
    async fn conservations_in(&self, region: RegionId) -> Result<Vec<Conservation>, StoreError>;

    /// Full progress record; empty for a learner with no submissions.
    async fn progress(&self, student: StudentId) -> Result<LearnerProgress, StoreError>;

    async fn badge_catalog(&self) -> Result<Vec<Badge>, StoreError>;

    async fn awarded_badge_ids(&self, student: StudentId) -> Result<HashSet<BadgeId>, StoreError>;

    async fn earned_badges(&self, student: StudentId) -> Result<Vec<EarnedBadge>, StoreError>;

    async fn create_badge(&self, badge: Badge) -> Result<Badge, StoreError>;

    /// Creates `badge` unless one with the same name exists. Returns the
    /// stored badge and whether it was created.
    async fn ensure_badge(&self, badge: Badge) -> Result<(Badge, bool), StoreError>;

    /// Persists a submission's progress entries and badge awards together.
    /// Awards for a badge the learner already holds are skipped; the ids of
    /// awards actually inserted are returned.
    async fn record_submission(
        &self,
        student: StudentId,
        delta: &ProgressDelta,
        awards: &[BadgeAward],
        at: DateTime<Utc>,
    ) -> Result<Vec<BadgeId>, StoreError>;
}
