// Read-only unlock checks over ordered siblings.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::progress::LearnerProgress;
use crate::models::{Conservation, Topic};

/// A topic or conservation placed among its siblings by `order`.
pub trait LearningUnit {
    type Id: Copy + PartialEq;

    fn unit_id(&self) -> Self::Id;
    fn order(&self) -> i32;
    fn created_at(&self) -> DateTime<Utc>;
    /// Whether completing this unit unlocks its successor.
    fn is_complete(&self, progress: &LearnerProgress) -> bool;
}

impl LearningUnit for Topic {
    type Id = crate::models::TopicId;

    fn unit_id(&self) -> Self::Id {
        self.id
    }
    fn order(&self) -> i32 {
        self.order
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn is_complete(&self, progress: &LearnerProgress) -> bool {
        progress.topic_completed(self.id)
    }
}

impl LearningUnit for Conservation {
    type Id = crate::models::ConservationId;

    fn unit_id(&self) -> Self::Id {
        self.id
    }
    fn order(&self) -> i32 {
        self.order
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn is_complete(&self, progress: &LearnerProgress) -> bool {
        progress.conservation_passed(self.id)
    }
}

/// Sorts by `(order, created_at)` ascending.
pub fn order_siblings<U: LearningUnit>(units: &mut [U]) {
    units.sort_by(|a, b| {
        a.order()
            .cmp(&b.order())
            .then_with(|| a.created_at().cmp(&b.created_at()))
    });
}

/// The first sibling is always unlocked; any other unit needs its immediate
/// predecessor complete. Units not present in `ordered` are locked.
pub fn is_unlocked<U: LearningUnit>(
    unit: U::Id,
    ordered: &[U],
    progress: &LearnerProgress,
) -> bool {
    match ordered.iter().position(|u| u.unit_id() == unit) {
        Some(0) => true,
        Some(idx) => ordered[idx - 1].is_complete(progress),
        None => false,
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnitState {
    pub unlocked: bool,
    pub completed: bool,
}

/// Unlock / completion flags for every unit of an ordered sibling list.
pub fn unit_states<U: LearningUnit>(ordered: &[U], progress: &LearnerProgress) -> Vec<UnitState> {
    let mut previous_complete = true;
    ordered
        .iter()
        .map(|unit| {
            let completed = unit.is_complete(progress);
            let state = UnitState {
                unlocked: previous_complete,
                completed,
            };
            previous_complete = completed;
            state
        })
        .collect()
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub completed_topics: usize,
    pub total_topics: usize,
    pub eligible_for_final: bool,
}

/// A conservation's final assessment opens once it has topics and all are complete.
pub fn final_assessment_eligibility(topics: &[Topic], progress: &LearnerProgress) -> Eligibility {
    let completed_topics = topics.iter().filter(|t| t.is_complete(progress)).count();
    Eligibility {
        completed_topics,
        total_topics: topics.len(),
        eligible_for_final: !topics.is_empty() && completed_topics == topics.len(),
    }
}
