//! Registry of in-flight tool invocations and their cancellation handles.

use parking_lot::Mutex;
use std::collections::HashMap;

use reelcut_media::{CancelHandle, CancelSignal};
use reelcut_models::JobId;

/// Why an invocation was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Client requested cancellation.
    User,
    /// The watchdog saw no progress for too long.
    Stalled,
    /// The engine is shutting down.
    Shutdown,
}

#[derive(Debug)]
struct Invocation {
    handle: CancelHandle,
    reason: Option<AbortReason>,
}

/// At most one invocation per job.
#[derive(Debug, Default)]
pub struct ActiveJobs {
    inner: Mutex<HashMap<JobId, Invocation>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new invocation. Returns `None` if one is already registered
    /// for `job_id` (double dispatch).
    pub fn register(&self, job_id: &JobId) -> Option<CancelSignal> {
        let mut inner = self.inner.lock();
        if inner.contains_key(job_id) {
            return None;
        }
        let (handle, signal) = CancelHandle::new();
        inner.insert(job_id.clone(), Invocation { handle, reason: None });
        Some(signal)
    }

    /// Signal cancellation. The first reason recorded wins.
    pub fn abort(&self, job_id: &JobId, reason: AbortReason) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(job_id) {
            Some(invocation) => {
                invocation.reason.get_or_insert(reason);
                invocation.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort every registered invocation.
    pub fn abort_all(&self, reason: AbortReason) -> usize {
        let mut inner = self.inner.lock();
        for invocation in inner.values_mut() {
            invocation.reason.get_or_insert(reason);
            invocation.handle.cancel();
        }
        inner.len()
    }

    /// Remove the invocation and return why it was aborted, if it was.
    pub fn unregister(&self, job_id: &JobId) -> Option<AbortReason> {
        self.inner.lock().remove(job_id).and_then(|i| i.reason)
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.inner.lock().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_register_is_rejected() {
        let active = ActiveJobs::new();
        let id = JobId::new();
        assert!(active.register(&id).is_some());
        assert!(active.register(&id).is_none());
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_first_abort_reason_wins() {
        let active = ActiveJobs::new();
        let id = JobId::new();
        let signal = active.register(&id).unwrap();

        assert!(active.abort(&id, AbortReason::User));
        assert!(active.abort(&id, AbortReason::Stalled));
        assert!(signal.is_canceled());
        assert_eq!(active.unregister(&id), Some(AbortReason::User));
        assert!(!active.abort(&id, AbortReason::User));
    }

    #[test]
    fn test_abort_all() {
        let active = ActiveJobs::new();
        let a = JobId::new();
        let b = JobId::new();
        let sa = active.register(&a).unwrap();
        let sb = active.register(&b).unwrap();

        assert_eq!(active.abort_all(AbortReason::Shutdown), 2);
        assert!(sa.is_canceled() && sb.is_canceled());
        assert_eq!(active.unregister(&b), Some(AbortReason::Shutdown));
        assert_eq!(active.unregister(&JobId::new()), None);
    }
}
