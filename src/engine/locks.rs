use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::StudentId;

/// Per-learner async locks so one learner's submissions apply one at a time.
#[derive(Default)]
pub struct LearnerLocks {
    locks: Mutex<HashMap<StudentId, Arc<AsyncMutex<()>>>>,
}

impl LearnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, student: StudentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // drop entries nobody is holding or waiting on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(student).or_default().clone()
        };
        lock.lock_owned().await
    }
}
