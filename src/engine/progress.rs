//! Typed per-learner progress record.
//!
//! Three independent maps replace string-prefixed keys: assessment attempts,
//! topic completion and conservation final-assessment results. Entries are
//! only ever inserted or overwritten, never removed.
//!
//! Topic completion is sticky: once a topic has been passed it stays
//! completed, and `last_passed` carries the outcome of the latest attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::grader::GradeResult;
use crate::models::{Assessment, AssessmentId, ConservationId, TopicId};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentAttempt {
    pub score: u32,
    pub total: u32,
    pub at: DateTime<Utc>,
}

impl AssessmentAttempt {
    pub fn passed(&self) -> bool {
        GradeResult {
            score: self.score,
            total: self.total,
        }
        .passed()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub completed: bool,
    pub last_passed: bool,
    pub last_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConservationProgress {
    pub last_assessment_passed: bool,
    pub last_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProgress {
    pub assessments: HashMap<AssessmentId, AssessmentAttempt>,
    pub topics: HashMap<TopicId, TopicProgress>,
    pub conservations: HashMap<ConservationId, ConservationProgress>,
}

/// Entries written by a single submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressDelta {
    pub assessment: (AssessmentId, AssessmentAttempt),
    pub topic: Option<(TopicId, TopicProgress)>,
    pub conservation: Option<(ConservationId, ConservationProgress)>,
}

impl LearnerProgress {
    pub fn topic_completed(&self, topic: TopicId) -> bool {
        self.topics.get(&topic).is_some_and(|t| t.completed)
    }

    pub fn conservation_passed(&self, conservation: ConservationId) -> bool {
        self.conservations
            .get(&conservation)
            .is_some_and(|c| c.last_assessment_passed)
    }

    /// Passed attempts, most recent first.
    pub fn passed_attempts(&self) -> Vec<(AssessmentId, AssessmentAttempt)> {
        let mut passed: Vec<_> = self
            .assessments
            .iter()
            .filter(|(_, a)| a.passed())
            .map(|(id, a)| (*id, *a))
            .collect();
        passed.sort_by(|a, b| b.1.at.cmp(&a.1.at).then(a.0.cmp(&b.0)));
        passed
    }

    /// Merges a graded submission into the record and returns what was written.
    pub fn apply_submission(
        &mut self,
        assessment: &Assessment,
        grade: &GradeResult,
        now: DateTime<Utc>,
    ) -> ProgressDelta {
        let passed = grade.passed();

        let attempt = AssessmentAttempt {
            score: grade.score,
            total: grade.total,
            at: now,
        };
        self.assessments.insert(assessment.id, attempt);

        let topic = assessment.topic_id.map(|topic_id| {
            let entry = TopicProgress {
                completed: passed || self.topic_completed(topic_id),
                last_passed: passed,
                last_at: now,
            };
            self.topics.insert(topic_id, entry);
            (topic_id, entry)
        });

        let conservation = assessment
            .conservation_id
            .filter(|_| passed)
            .map(|conservation_id| {
                let entry = ConservationProgress {
                    last_assessment_passed: true,
                    last_at: now,
                };
                self.conservations.insert(conservation_id, entry);
                (conservation_id, entry)
            });

        ProgressDelta {
            assessment: (assessment.id, attempt),
            topic,
            conservation,
        }
    }

    /// Applies a delta produced elsewhere, keeping topic completion sticky.
    pub fn merge(&mut self, delta: &ProgressDelta) {
        let (assessment_id, attempt) = delta.assessment;
        self.assessments.insert(assessment_id, attempt);
        if let Some((topic_id, mut entry)) = delta.topic {
            entry.completed |= self.topic_completed(topic_id);
            self.topics.insert(topic_id, entry);
        }
        if let Some((conservation_id, entry)) = delta.conservation {
            self.conservations.insert(conservation_id, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assessment(topic: Option<TopicId>, conservation: Option<ConservationId>) -> Assessment {
        Assessment {
            id: AssessmentId::new(),
            topic_id: topic,
            conservation_id: conservation,
            kind: "MCQ".into(),
            questions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    const PASS: GradeResult = GradeResult { score: 3, total: 5 };
    const FAIL: GradeResult = GradeResult { score: 2, total: 5 };

    #[test]
    fn standalone_assessment_only_records_attempt() {
        let mut progress = LearnerProgress::default();
        let a = assessment(None, None);
        let now = Utc::now();
        let delta = progress.apply_submission(&a, &PASS, now);

        assert_eq!(
            progress.assessments.get(&a.id),
            Some(&AssessmentAttempt { score: 3, total: 5, at: now })
        );
        assert!(progress.topics.is_empty());
        assert!(progress.conservations.is_empty());
        assert!(delta.topic.is_none());
        assert!(delta.conservation.is_none());
    }

    #[test]
    fn topic_assessment_marks_topic() {
        let topic = TopicId::new();
        let mut progress = LearnerProgress::default();
        progress.apply_submission(&assessment(Some(topic), None), &FAIL, Utc::now());
        assert!(!progress.topic_completed(topic));
        assert!(progress.topics.contains_key(&topic));

        progress.apply_submission(&assessment(Some(topic), None), &PASS, Utc::now());
        assert!(progress.topic_completed(topic));
    }

    #[test]
    fn topic_completion_survives_a_later_failure() {
        let topic = TopicId::new();
        let a = assessment(Some(topic), None);
        let mut progress = LearnerProgress::default();
        progress.apply_submission(&a, &PASS, Utc::now());
        let delta = progress.apply_submission(&a, &FAIL, Utc::now());

        let entry = progress.topics[&topic];
        assert!(entry.completed);
        assert!(!entry.last_passed);
        assert_eq!(delta.topic.map(|(_, t)| t.completed), Some(true));
        assert_eq!(progress.assessments[&a.id].score, 2);
    }

    #[test]
    fn conservation_only_written_on_pass() {
        let conservation = ConservationId::new();
        let a = assessment(None, Some(conservation));
        let mut progress = LearnerProgress::default();

        let delta = progress.apply_submission(&a, &FAIL, Utc::now());
        assert!(delta.conservation.is_none());
        assert!(!progress.conservation_passed(conservation));

        progress.apply_submission(&a, &PASS, Utc::now());
        assert!(progress.conservation_passed(conservation));

        progress.apply_submission(&a, &FAIL, Utc::now());
        assert!(progress.conservation_passed(conservation));
    }

    #[test]
    fn merge_matches_apply() {
        let topic = TopicId::new();
        let a = assessment(Some(topic), Some(ConservationId::new()));
        let mut applied = LearnerProgress::default();
        let delta = applied.apply_submission(&a, &PASS, Utc::now());

        let mut merged = LearnerProgress::default();
        merged.merge(&delta);
        assert_eq!(applied, merged);
    }

    #[test]
    fn passed_attempts_newest_first() {
        let mut progress = LearnerProgress::default();
        let start = Utc::now();
        let older = assessment(None, None);
        let newer = assessment(None, None);
        let failed = assessment(None, None);
        progress.apply_submission(&older, &PASS, start);
        progress.apply_submission(&newer, &PASS, start + Duration::minutes(5));
        progress.apply_submission(&failed, &FAIL, start + Duration::minutes(10));

        let ids: Vec<_> = progress.passed_attempts().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn serializes_with_typed_maps() {
        let mut progress = LearnerProgress::default();
        let topic = TopicId::new();
        progress.apply_submission(&assessment(Some(topic), None), &PASS, Utc::now());
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["topics"][topic.to_string()]["completed"], true);
        assert_eq!(json["topics"][topic.to_string()]["lastPassed"], true);
    }
}
