// Multiple-choice grading and the pass / excellence thresholds derived from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Assessment;

/// Share of questions (in fifths) needed to pass: ceil(total * 0.6).
const PASS_FIFTHS: u32 = 3;
/// Share of questions (in fifths) needed for excellence: ceil(total * 0.8).
const EXCELLENCE_FIFTHS: u32 = 4;

/// Percentage needed for topic / conservation completion badges.
pub const COMPLETION_PERCENT: u32 = 60;
/// Percentage needed for the assessment excellence badge.
pub const EXCELLENCE_PERCENT: u32 = 80;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeResult {
    pub score: u32,
    pub total: u32,
}

impl GradeResult {
    /// round(score / total * 100), halves rounded up. Zero questions grade as 0%.
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let (score, total) = (u64::from(self.score), u64::from(self.total));
        saturate((score * 200 + total) / (total * 2))
    }

    pub fn passed(&self) -> bool {
        self.total > 0 && self.score >= ceil_fifths(self.total, PASS_FIFTHS)
    }

    pub fn excellent(&self) -> bool {
        self.total > 0 && self.score >= ceil_fifths(self.total, EXCELLENCE_FIFTHS)
    }
}

fn ceil_fifths(total: u32, fifths: u32) -> u32 {
    saturate((u64::from(total) * u64::from(fifths)).div_ceil(5))
}

fn saturate(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Scores `answers` against `assessment`. Answer `i` belongs to question `i`;
/// missing, negative and out-of-range indices count as incorrect.
pub fn grade(assessment: &Assessment, answers: &[Option<i64>]) -> GradeResult {
    let score = assessment
        .questions
        .iter()
        .enumerate()
        .filter(|(idx, question)| {
            let Some(selected) = answers.get(*idx).copied().flatten() else {
                return false;
            };
            usize::try_from(selected)
                .ok()
                .and_then(|i| question.options.get(i))
                .is_some_and(|opt| opt.is_correct)
        })
        .count();

    GradeResult {
        score: u32::try_from(score).unwrap_or(u32::MAX),
        total: u32::try_from(assessment.questions.len()).unwrap_or(u32::MAX),
    }
}

/// Maps raw JSON answers to option indices. Anything that is not an integral
/// number becomes `None` rather than an error.
pub fn answers_from_json(raw: &[Value]) -> Vec<Option<i64>> {
    raw.iter()
        .map(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            _ => None,
        })
        .collect()
}
