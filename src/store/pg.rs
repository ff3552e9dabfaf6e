use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, types::Json, PgConnection};
use std::collections::HashSet;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::db::Db;
use crate::engine::badges::BadgeAward;
use crate::engine::progress::{
    AssessmentAttempt, ConservationProgress, LearnerProgress, ProgressDelta, TopicProgress,
};
use crate::models::*;

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: AssessmentId,
    topic_id: Option<TopicId>,
    conservation_id: Option<ConservationId>,
    kind: String,
    questions: Json<Vec<Question>>,
    created_at: DateTime<Utc>,
}

impl From<AssessmentRow> for Assessment {
    fn from(row: AssessmentRow) -> Self {
        Assessment {
            id: row.id,
            topic_id: row.topic_id,
            conservation_id: row.conservation_id,
            kind: row.kind,
            questions: row.questions.0,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    assessment_id: AssessmentId,
    score: i32,
    total: i32,
    at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TopicProgressRow {
    topic_id: TopicId,
    completed: bool,
    last_passed: bool,
    last_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ConservationProgressRow {
    conservation_id: ConservationId,
    last_assessment_passed: bool,
    last_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EarnedRow {
    #[sqlx(flatten)]
    badge: Badge,
    earned_at: DateTime<Utc>,
    score: i32,
}

fn to_db(v: u32, what: &str) -> Result<i32, StoreError> {
    i32::try_from(v).map_err(|_| StoreError::Corrupt(format!("{what} {v} exceeds i32")))
}

fn from_db(v: i32, what: &str) -> Result<u32, StoreError> {
    u32::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative {what} {v}")))
}

const BADGE_COLUMNS: &str = "id, name, description, kind, icon_url, points, topic_id, \
                             conservation_id, required_score, created_at";

async fn insert_badge(conn: &mut PgConnection, badge: &Badge) -> Result<Badge, StoreError> {
    Ok(query_as::<_, Badge>(&format!(
        "INSERT INTO badges ({BADGE_COLUMNS}) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) \
         RETURNING {BADGE_COLUMNS}"
    ))
    .bind(badge.id)
    .bind(&badge.name)
    .bind(&badge.description)
    .bind(badge.badge_type)
    .bind(&badge.icon_url)
    .bind(badge.points)
    .bind(badge.topic_id)
    .bind(badge.conservation_id)
    .bind(badge.required_score)
    .bind(badge.created_at)
    .fetch_one(conn)
    .await?)
}

#[async_trait]
impl Store for PgStore {
    async fn student(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        Ok(query_as::<_, Student>(
            "SELECT id, full_name, email, region_id, approved, created_at FROM students WHERE id=$1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn assessment(&self, id: AssessmentId) -> Result<Option<Assessment>, StoreError> {
        let row = query_as::<_, AssessmentRow>(
            "SELECT id, topic_id, conservation_id, kind, questions, created_at \
             FROM assessments WHERE id=$1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Assessment::from))
    }

    async fn topic(&self, id: TopicId) -> Result<Option<Topic>, StoreError> {
        Ok(query_as::<_, Topic>(
            "SELECT id, conservation_id, title, description, position, created_at \
             FROM topics WHERE id=$1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn conservation(&self, id: ConservationId) -> Result<Option<Conservation>, StoreError> {
        Ok(query_as::<_, Conservation>(
            "SELECT id, region_id, title, description, position, created_at \
             FROM conservations WHERE id=$1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn topics_in(&self, conservation: ConservationId) -> Result<Vec<Topic>, StoreError> {
        Ok(query_as::<_, Topic>(
            "SELECT id, conservation_id, title, description, position, created_at \
             FROM topics WHERE conservation_id=$1 ORDER BY position, created_at",
        )
        .bind(conservation)
        .fetch_all(&self.db)
        .await?)
    }

    async fn conservations_in(&self, region: RegionId) -> Result<Vec<Conservation>, StoreError> {
        Ok(query_as::<_, Conservation>(
            "SELECT id, region_id, title, description, position, created_at \
             FROM conservations WHERE region_id=$1 ORDER BY position, created_at",
        )
        .bind(region)
        .fetch_all(&self.db)
        .await?)
    }

    async fn progress(&self, student: StudentId) -> Result<LearnerProgress, StoreError> {
        let attempts = query_as::<_, AttemptRow>(
            "SELECT assessment_id, score, total, at FROM assessment_attempts WHERE student_id=$1",
        )
        .bind(student)
        .fetch_all(&self.db)
        .await?;
        let topics = query_as::<_, TopicProgressRow>(
            "SELECT topic_id, completed, last_passed, last_at FROM topic_progress WHERE student_id=$1",
        )
        .bind(student)
        .fetch_all(&self.db)
        .await?;
        let conservations = query_as::<_, ConservationProgressRow>(
            "SELECT conservation_id, last_assessment_passed, last_at \
             FROM conservation_progress WHERE student_id=$1",
        )
        .bind(student)
        .fetch_all(&self.db)
        .await?;

        let mut progress = LearnerProgress::default();
        for row in attempts {
            progress.assessments.insert(
                row.assessment_id,
                AssessmentAttempt {
                    score: from_db(row.score, "score")?,
                    total: from_db(row.total, "total")?,
                    at: row.at,
                },
            );
        }
        progress.topics.extend(topics.into_iter().map(|row| {
            (
                row.topic_id,
                TopicProgress {
                    completed: row.completed,
                    last_passed: row.last_passed,
                    last_at: row.last_at,
                },
            )
        }));
        progress
            .conservations
            .extend(conservations.into_iter().map(|row| {
                (
                    row.conservation_id,
                    ConservationProgress {
                        last_assessment_passed: row.last_assessment_passed,
                        last_at: row.last_at,
                    },
                )
            }));
        Ok(progress)
    }

    async fn badge_catalog(&self) -> Result<Vec<Badge>, StoreError> {
        Ok(query_as::<_, Badge>(&format!(
            "SELECT {BADGE_COLUMNS} FROM badges ORDER BY points, created_at"
        ))
        .fetch_all(&self.db)
        .await?)
    }

    async fn awarded_badge_ids(&self, student: StudentId) -> Result<HashSet<BadgeId>, StoreError> {
        let ids: Vec<BadgeId> =
            query_scalar("SELECT badge_id FROM student_badges WHERE student_id=$1")
                .bind(student)
                .fetch_all(&self.db)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn earned_badges(&self, student: StudentId) -> Result<Vec<EarnedBadge>, StoreError> {
        let rows = query_as::<_, EarnedRow>(
            "SELECT b.id, b.name, b.description, b.kind, b.icon_url, b.points, b.topic_id, \
                    b.conservation_id, b.required_score, b.created_at, sb.earned_at, sb.score \
             FROM student_badges sb JOIN badges b ON b.id = sb.badge_id \
             WHERE sb.student_id=$1 ORDER BY sb.earned_at DESC",
        )
        .bind(student)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| EarnedBadge {
                badge: r.badge,
                earned_at: r.earned_at,
                score: r.score,
            })
            .collect())
    }

    async fn create_badge(&self, badge: Badge) -> Result<Badge, StoreError> {
        let mut conn = self.db.acquire().await?;
        insert_badge(&mut conn, &badge).await
    }

    async fn ensure_badge(&self, badge: Badge) -> Result<(Badge, bool), StoreError> {
        let mut tx = self.db.begin().await?;
        // serializes seeding of one name across instances; released on commit
        query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&badge.name)
            .execute(&mut *tx)
            .await?;
        let existing = query_as::<_, Badge>(&format!(
            "SELECT {BADGE_COLUMNS} FROM badges WHERE name=$1 ORDER BY created_at LIMIT 1"
        ))
        .bind(&badge.name)
        .fetch_optional(&mut *tx)
        .await?;
        let outcome = match existing {
            Some(found) => (found, false),
            None => (insert_badge(&mut tx, &badge).await?, true),
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn record_submission(
        &self,
        student: StudentId,
        delta: &ProgressDelta,
        awards: &[BadgeAward],
        at: DateTime<Utc>,
    ) -> Result<Vec<BadgeId>, StoreError> {
        let mut tx = self.db.begin().await?;

        let (assessment_id, attempt) = delta.assessment;
        query(
            r#"
            INSERT INTO assessment_attempts (student_id, assessment_id, score, total, at)
            VALUES ($1,$2,$3,$4,$5)
            ON CONFLICT (student_id, assessment_id)
            DO UPDATE SET score=EXCLUDED.score, total=EXCLUDED.total, at=EXCLUDED.at
            "#,
        )
        .bind(student)
        .bind(assessment_id)
        .bind(to_db(attempt.score, "score")?)
        .bind(to_db(attempt.total, "total")?)
        .bind(attempt.at)
        .execute(&mut *tx)
        .await?;

        if let Some((topic_id, entry)) = delta.topic {
            // completion never regresses, even if a concurrent writer raced us
            query(
                r#"
                INSERT INTO topic_progress (student_id, topic_id, completed, last_passed, last_at)
                VALUES ($1,$2,$3,$4,$5)
                ON CONFLICT (student_id, topic_id)
                DO UPDATE SET completed = topic_progress.completed OR EXCLUDED.completed,
                              last_passed = EXCLUDED.last_passed,
                              last_at = EXCLUDED.last_at
                "#,
            )
            .bind(student)
            .bind(topic_id)
            .bind(entry.completed)
            .bind(entry.last_passed)
            .bind(entry.last_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some((conservation_id, entry)) = delta.conservation {
            query(
                r#"
                INSERT INTO conservation_progress (student_id, conservation_id, last_assessment_passed, last_at)
                VALUES ($1,$2,$3,$4)
                ON CONFLICT (student_id, conservation_id)
                DO UPDATE SET last_assessment_passed =
                                  conservation_progress.last_assessment_passed OR EXCLUDED.last_assessment_passed,
                              last_at = EXCLUDED.last_at
                "#,
            )
            .bind(student)
            .bind(conservation_id)
            .bind(entry.last_assessment_passed)
            .bind(entry.last_at)
            .execute(&mut *tx)
            .await?;
        }

        let mut inserted = Vec::new();
        for award in awards {
            let id: Option<BadgeId> = query_scalar(
                r#"
                INSERT INTO student_badges (id, student_id, badge_id, earned_at, score)
                VALUES ($1,$2,$3,$4,$5)
                ON CONFLICT (student_id, badge_id) DO NOTHING
                RETURNING badge_id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(student)
            .bind(award.badge.id)
            .bind(at)
            .bind(award.score)
            .fetch_optional(&mut *tx)
            .await?;
            inserted.extend(id);
        }

        tx.commit().await?;
        Ok(inserted)
    }
}
