use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::engine::badges::BadgeAward;
use crate::engine::progress::{LearnerProgress, ProgressDelta};
use crate::models::*;

/// Seed content for an in-memory store.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
    pub students: Vec<Student>,
    pub conservations: Vec<Conservation>,
    pub topics: Vec<Topic>,
    pub assessments: Vec<Assessment>,
    pub badges: Vec<Badge>,
}

#[derive(Default)]
struct Inner {
    students: HashMap<StudentId, Student>,
    conservations: HashMap<ConservationId, Conservation>,
    topics: HashMap<TopicId, Topic>,
    assessments: HashMap<AssessmentId, Assessment>,
    badges: Vec<Badge>,
    awards: Vec<StudentBadge>,
    progress: HashMap<StudentId, LearnerProgress>,
}

/// Process-local store used when no database is configured.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(fixture: Fixture) -> Self {
        let inner = Inner {
            students: fixture.students.into_iter().map(|s| (s.id, s)).collect(),
            conservations: fixture.conservations.into_iter().map(|c| (c.id, c)).collect(),
            topics: fixture.topics.into_iter().map(|t| (t.id, t)).collect(),
            assessments: fixture.assessments.into_iter().map(|a| (a.id, a)).collect(),
            badges: fixture.badges,
            ..Inner::default()
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Loads seed content from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Fixture(format!("failed to read {}: {}", path.display(), e)))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .map_err(|e| StoreError::Fixture(format!("failed to parse {}: {}", path.display(), e)))?;
        tracing::info!(
            path = %path.display(),
            students = fixture.students.len(),
            topics = fixture.topics.len(),
            assessments = fixture.assessments.len(),
            "loaded fixture"
        );
        Ok(Self::with_fixture(fixture))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn student(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        Ok(self.inner.read().await.students.get(&id).cloned())
    }

    async fn assessment(&self, id: AssessmentId) -> Result<Option<Assessment>, StoreError> {
        Ok(self.inner.read().await.assessments.get(&id).cloned())
    }

    async fn topic(&self, id: TopicId) -> Result<Option<Topic>, StoreError> {
        Ok(self.inner.read().await.topics.get(&id).cloned())
    }

    async fn conservation(&self, id: ConservationId) -> Result<Option<Conservation>, StoreError> {
        Ok(self.inner.read().await.conservations.get(&id).cloned())
    }

    async fn topics_in(&self, conservation: ConservationId) -> Result<Vec<Topic>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .topics
            .values()
            .filter(|t| t.conservation_id == conservation)
            .cloned()
            .collect())
    }

    async fn conservations_in(&self, region: RegionId) -> Result<Vec<Conservation>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .conservations
            .values()
            .filter(|c| c.region_id == region)
            .cloned()
            .collect())
    }

    async fn progress(&self, student: StudentId) -> Result<LearnerProgress, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.progress.get(&student).cloned().unwrap_or_default())
    }

    async fn badge_catalog(&self) -> Result<Vec<Badge>, StoreError> {
        Ok(self.inner.read().await.badges.clone())
    }

    async fn awarded_badge_ids(&self, student: StudentId) -> Result<HashSet<BadgeId>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .awards
            .iter()
            .filter(|a| a.student_id == student)
            .map(|a| a.badge_id)
            .collect())
    }

    async fn earned_badges(&self, student: StudentId) -> Result<Vec<EarnedBadge>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .awards
            .iter()
            .filter(|a| a.student_id == student)
            .filter_map(|a| {
                inner
                    .badges
                    .iter()
                    .find(|b| b.id == a.badge_id)
                    .map(|badge| EarnedBadge {
                        badge: badge.clone(),
                        earned_at: a.earned_at,
                        score: a.score,
                    })
            })
            .collect())
    }

    async fn create_badge(&self, badge: Badge) -> Result<Badge, StoreError> {
        self.inner.write().await.badges.push(badge.clone());
        Ok(badge)
    }

    async fn ensure_badge(&self, badge: Badge) -> Result<(Badge, bool), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.badges.iter().find(|b| b.name == badge.name) {
            return Ok((existing.clone(), false));
        }
        inner.badges.push(badge.clone());
        Ok((badge, true))
    }

    async fn record_submission(
        &self,
        student: StudentId,
        delta: &ProgressDelta,
        awards: &[BadgeAward],
        at: DateTime<Utc>,
    ) -> Result<Vec<BadgeId>, StoreError> {
        // one write guard covers progress and awards
        let mut inner = self.inner.write().await;
        inner.progress.entry(student).or_default().merge(delta);

        let mut inserted = Vec::new();
        for award in awards {
            let held = inner
                .awards
                .iter()
                .any(|a| a.student_id == student && a.badge_id == award.badge.id);
            if held {
                continue;
            }
            inner.awards.push(StudentBadge {
                id: Uuid::new_v4(),
                student_id: student,
                badge_id: award.badge.id,
                earned_at: at,
                score: award.score,
            });
            inserted.push(award.badge.id);
        }
        Ok(inserted)
    }
}
