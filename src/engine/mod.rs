//! Learning progress engine: grading, progress updates, unlock checks and
//! badge awards for a learner's assessment submissions.

use thiserror::Error;

use crate::models::{ConservationId, StudentId, TopicId};
use crate::store::StoreError;

pub mod badges;
pub mod grader;
pub mod locks;
pub mod progress;
pub mod service;
pub mod unlock;

pub use service::ProgressEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("learner not found: {0}")]
    LearnerNotFound(StudentId),

    #[error("conservation not found: {0}")]
    ConservationNotFound(ConservationId),

    #[error("topic not found: {0}")]
    TopicNotFound(TopicId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
