use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::badges::{self, BadgeSummary, SubmissionContext};
use super::grader::{self, GradeResult};
use super::locks::LearnerLocks;
use super::progress::LearnerProgress;
use super::unlock::{self, Eligibility, UnitState};
use super::EngineError;
use crate::models::*;
use crate::store::Store;

/// How many recent passed attempts the dashboard lists.
const RECENT_ACHIEVEMENTS: usize = 5;

#[derive(Debug, Clone)]
pub struct Submission {
    pub assessment_id: AssessmentId,
    pub student_id: StudentId,
    pub answers: Vec<Option<i64>>,
}

#[skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub ok: bool,
    pub score: u32,
    pub total: u32,
    pub passed: Option<bool>,
    pub badge_earned: Option<bool>,
    pub percentage: Option<u32>,
    pub badges: Option<Vec<Badge>>,
}

impl SubmissionResult {
    fn unknown_assessment() -> Self {
        Self {
            ok: false,
            score: 0,
            total: 0,
            passed: None,
            badge_earned: None,
            percentage: None,
            badges: None,
        }
    }

    fn graded(grade: &GradeResult, badges: Vec<Badge>) -> Self {
        Self {
            ok: true,
            score: grade.score,
            total: grade.total,
            passed: Some(grade.passed()),
            badge_earned: Some(grade.passed() && grade.excellent()),
            percentage: Some(grade.percentage()),
            badges: Some(badges),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TopicView {
    #[serde(flatten)]
    pub topic: Topic,
    pub unlocked: bool,
    pub completed: bool,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConservationStatus {
    #[serde(flatten)]
    pub eligibility: Eligibility,
    pub unlocked: bool,
    pub final_passed: bool,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConservationOverview {
    #[serde(flatten)]
    pub conservation: Conservation,
    pub progress: ConservationStatus,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub assessment_id: AssessmentId,
    pub score: u32,
    pub total: u32,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TotalProgress {
    pub completed_assessments: usize,
    pub total_conservations: usize,
    pub completed_conservations: usize,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub student: Student,
    pub conservations: Vec<ConservationOverview>,
    pub achievements: Vec<Achievement>,
    pub total_progress: TotalProgress,
}

pub struct ProgressEngine {
    store: Arc<dyn Store>,
    locks: LearnerLocks,
}

impl ProgressEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: LearnerLocks::new(),
        }
    }

    /// Grades a submission, records progress and awards any new badges.
    ///
    /// An unknown assessment is not an error: it yields `ok: false` with a
    /// zero score. An unknown learner is reported as `LearnerNotFound`.
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionResult, EngineError> {
        let _guard = self.locks.acquire(submission.student_id).await;

        let student = self.learner(submission.student_id).await?;
        let Some(assessment) = self.store.assessment(submission.assessment_id).await? else {
            warn!(
                student = %student.id,
                assessment = %submission.assessment_id,
                "submission for unknown assessment"
            );
            return Ok(SubmissionResult::unknown_assessment());
        };

        let grade = grader::grade(&assessment, &submission.answers);
        let now = Utc::now();

        let mut progress = self.store.progress(student.id).await?;
        let delta = progress.apply_submission(&assessment, &grade, now);

        let catalog = self.store.badge_catalog().await?;
        let held = self.store.awarded_badge_ids(student.id).await?;
        let ctx = SubmissionContext {
            grade,
            topic_id: assessment.topic_id,
            conservation_id: assessment.conservation_id,
        };
        let awards = badges::evaluate(&ctx, &catalog, &held);

        let inserted = self
            .store
            .record_submission(student.id, &delta, &awards, now)
            .await?;
        let earned: Vec<Badge> = awards
            .into_iter()
            .filter(|a| inserted.contains(&a.badge.id))
            .map(|a| a.badge)
            .collect();

        info!(
            student = %student.id,
            assessment = %assessment.id,
            score = grade.score,
            total = grade.total,
            passed = grade.passed(),
            badges = earned.len(),
            "graded submission"
        );
        Ok(SubmissionResult::graded(&grade, earned))
    }

    pub async fn progress(&self, student: StudentId) -> Result<LearnerProgress, EngineError> {
        let student = self.learner(student).await?;
        Ok(self.store.progress(student.id).await?)
    }

    /// Topics of a conservation in order, with unlock and completion flags.
    pub async fn topics_for(
        &self,
        student: StudentId,
        conservation: ConservationId,
    ) -> Result<Vec<TopicView>, EngineError> {
        let student = self.learner(student).await?;
        self.existing_conservation(conservation).await?;
        let topics = self.ordered_topics(conservation).await?;
        let progress = self.store.progress(student.id).await?;

        let states = unlock::unit_states(&topics, &progress);
        Ok(topics
            .into_iter()
            .zip(states)
            .map(|(topic, state)| TopicView {
                topic,
                unlocked: state.unlocked,
                completed: state.completed,
            })
            .collect())
    }

    /// The topics a learner may open right now, in order.
    pub async fn unlocked_topics(
        &self,
        student: StudentId,
        conservation: ConservationId,
    ) -> Result<Vec<TopicView>, EngineError> {
        let mut views = self.topics_for(student, conservation).await?;
        views.retain(|v| v.unlocked);
        Ok(views)
    }

    /// Whether a learner may open a single topic.
    pub async fn topic_access(
        &self,
        student: StudentId,
        topic: TopicId,
    ) -> Result<UnitState, EngineError> {
        let student = self.learner(student).await?;
        let topic = self
            .store
            .topic(topic)
            .await?
            .ok_or(EngineError::TopicNotFound(topic))?;
        let siblings = self.ordered_topics(topic.conservation_id).await?;
        let progress = self.store.progress(student.id).await?;
        Ok(UnitState {
            unlocked: unlock::is_unlocked(topic.id, &siblings, &progress),
            completed: progress.topic_completed(topic.id),
        })
    }

    pub async fn eligibility(
        &self,
        student: StudentId,
        conservation: ConservationId,
    ) -> Result<Eligibility, EngineError> {
        let student = self.learner(student).await?;
        self.existing_conservation(conservation).await?;
        let topics = self.store.topics_in(conservation).await?;
        let progress = self.store.progress(student.id).await?;
        Ok(unlock::final_assessment_eligibility(&topics, &progress))
    }

    pub async fn dashboard(&self, student: StudentId) -> Result<Dashboard, EngineError> {
        let student = self.learner(student).await?;
        let progress = self.store.progress(student.id).await?;

        let mut conservations = match student.region_id {
            Some(region) => self.store.conservations_in(region).await?,
            None => {
                debug!(student = %student.id, "learner has no region");
                Vec::new()
            }
        };
        unlock::order_siblings(&mut conservations);
        let states = unlock::unit_states(&conservations, &progress);

        let mut overview = Vec::with_capacity(conservations.len());
        for (conservation, state) in conservations.into_iter().zip(states) {
            let topics = self.store.topics_in(conservation.id).await?;
            let eligibility = unlock::final_assessment_eligibility(&topics, &progress);
            overview.push(ConservationOverview {
                conservation,
                progress: ConservationStatus {
                    eligibility,
                    unlocked: state.unlocked,
                    final_passed: state.completed,
                },
            });
        }

        let passed = progress.passed_attempts();
        let total_progress = TotalProgress {
            completed_assessments: passed.len(),
            total_conservations: overview.len(),
            completed_conservations: overview
                .iter()
                .filter(|c| c.progress.eligibility.eligible_for_final)
                .count(),
        };
        let achievements = passed
            .into_iter()
            .take(RECENT_ACHIEVEMENTS)
            .map(|(assessment_id, a)| Achievement {
                assessment_id,
                score: a.score,
                total: a.total,
                at: a.at,
            })
            .collect();

        Ok(Dashboard {
            student,
            conservations: overview,
            achievements,
            total_progress,
        })
    }

    pub async fn badge_summary(&self, student: StudentId) -> Result<BadgeSummary, EngineError> {
        let student = self.learner(student).await?;
        let earned = self.store.earned_badges(student.id).await?;
        Ok(badges::summarize(earned))
    }

    /// Catalog sorted by points, cheapest first.
    pub async fn catalog(&self) -> Result<Vec<Badge>, EngineError> {
        let mut catalog = self.store.badge_catalog().await?;
        catalog.sort_by(|a, b| a.points.cmp(&b.points).then(a.created_at.cmp(&b.created_at)));
        Ok(catalog)
    }

    pub async fn create_badge(&self, new: NewBadge) -> Result<Badge, EngineError> {
        let badge = self.store.create_badge(new.into_badge()).await?;
        info!(badge = %badge.id, kind = ?badge.badge_type, "created badge");
        Ok(badge)
    }

    /// Creates the default excellence badge if it is missing. Safe to run on
    /// every start.
    pub async fn seed_catalog(&self) -> Result<(), EngineError> {
        let default = NewBadge {
            name: "Assessment Excellence".into(),
            description: "Scored 80% or more on an assessment".into(),
            badge_type: BadgeType::AssessmentExcellence,
            icon_url: "/badges/assessment-excellence.svg".into(),
            points: 50,
            topic_id: None,
            conservation_id: None,
            required_score: grader::EXCELLENCE_PERCENT as i32,
        };
        let (badge, created) = self.store.ensure_badge(default.into_badge()).await?;
        if created {
            info!(badge = %badge.id, "seeded default badge catalog");
        } else {
            debug!(badge = %badge.id, "default badge already present");
        }
        Ok(())
    }

    async fn learner(&self, id: StudentId) -> Result<Student, EngineError> {
        self.store
            .student(id)
            .await?
            .ok_or(EngineError::LearnerNotFound(id))
    }

    async fn existing_conservation(
        &self,
        id: ConservationId,
    ) -> Result<Conservation, EngineError> {
        self.store
            .conservation(id)
            .await?
            .ok_or(EngineError::ConservationNotFound(id))
    }

    async fn ordered_topics(&self, conservation: ConservationId) -> Result<Vec<Topic>, EngineError> {
        let mut topics = self.store.topics_in(conservation).await?;
        unlock::order_siblings(&mut topics);
        Ok(topics)
    }
}
