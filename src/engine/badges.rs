//! Badge eligibility for a graded submission.
//!
//! Three independent rules run on every submission:
//!
//! - `ASSESSMENT_EXCELLENCE` at 80% or more, picking the catalog badge with the
//!   highest `requiredScore` that the percentage still meets.
//! - `TOPIC_COMPLETION` at 60% or more for the assessment's topic.
//! - `CONSERVATION_COMPLETION` at 60% or more for the assessment's conservation.
//!
//! A badge the learner already holds is never awarded again. Evaluation is
//! pure; the store enforces uniqueness of `(student, badge)` on insert.

use serde::Serialize;
use std::collections::HashSet;

use super::grader::{GradeResult, COMPLETION_PERCENT, EXCELLENCE_PERCENT};
use crate::models::{Badge, BadgeId, BadgeType, ConservationId, EarnedBadge, TopicId};

/// What the badge rules need to know about a submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionContext {
    pub grade: GradeResult,
    pub topic_id: Option<TopicId>,
    pub conservation_id: Option<ConservationId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BadgeAward {
    pub badge: Badge,
    /// Percentage recorded on the award.
    pub score: i32,
}

pub fn evaluate(
    ctx: &SubmissionContext,
    catalog: &[Badge],
    already_awarded: &HashSet<BadgeId>,
) -> Vec<BadgeAward> {
    let percentage = ctx.grade.percentage();
    let mut held: HashSet<BadgeId> = already_awarded.clone();
    let mut awards = Vec::new();

    let candidates = [
        (percentage >= EXCELLENCE_PERCENT)
            .then(|| excellence_badge(catalog, percentage))
            .flatten(),
        ctx.topic_id
            .filter(|_| percentage >= COMPLETION_PERCENT)
            .and_then(|topic| {
                first_matching(catalog, BadgeType::TopicCompletion, |b| {
                    b.topic_id == Some(topic)
                })
            }),
        ctx.conservation_id
            .filter(|_| percentage >= COMPLETION_PERCENT)
            .and_then(|conservation| {
                first_matching(catalog, BadgeType::ConservationCompletion, |b| {
                    b.conservation_id == Some(conservation)
                })
            }),
    ];

    for badge in candidates.into_iter().flatten() {
        if held.insert(badge.id) {
            awards.push(BadgeAward {
                badge: badge.clone(),
                score: percentage as i32,
            });
        }
    }
    awards
}

fn excellence_badge(catalog: &[Badge], percentage: u32) -> Option<&Badge> {
    catalog
        .iter()
        .filter(|b| b.badge_type == BadgeType::AssessmentExcellence)
        .filter(|b| i64::from(b.required_score) <= i64::from(percentage))
        .min_by(|a, b| {
            b.required_score
                .cmp(&a.required_score)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        })
}

fn first_matching(
    catalog: &[Badge],
    badge_type: BadgeType,
    pred: impl Fn(&Badge) -> bool,
) -> Option<&Badge> {
    catalog
        .iter()
        .filter(|b| b.badge_type == badge_type && pred(*b))
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSummary {
    pub total_badges: usize,
    pub total_points: i64,
    pub badges: Vec<EarnedBadge>,
}

/// Totals over a learner's badges, newest award first.
pub fn summarize(mut earned: Vec<EarnedBadge>) -> BadgeSummary {
    earned.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
    BadgeSummary {
        total_badges: earned.len(),
        total_points: earned.iter().map(|e| i64::from(e.badge.points)).sum(),
        badges: earned,
    }
}
