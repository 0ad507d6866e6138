//! Authoritative job records with per-record locking.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use reelcut_models::{Job, JobId, JobStatus};

use crate::error::{StoreError, StoreResult};

struct Record {
    job: Job,
    events: watch::Sender<Job>,
}

/// Concurrency-safe job registry.
///
/// The map lock is only held to find or insert a record; mutations take the
/// record's own mutex, so writers to different jobs never contend and readers
/// always see a fully applied update.
#[derive(Default)]
pub struct JobStore {
    records: RwLock<HashMap<JobId, Arc<Mutex<Record>>>>,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore").field("jobs", &self.len()).finish()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: &JobId) -> StoreResult<Arc<Mutex<Record>>> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    /// Add a new job.
    pub fn insert(&self, job: Job) -> StoreResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        let (events, _) = watch::channel(job.clone());
        debug!(job_id = %job.id, status = %job.status, "Inserted job");
        records.insert(job.id.clone(), Arc::new(Mutex::new(Record { job, events })));
        Ok(())
    }

    /// Snapshot of one job.
    pub fn get(&self, id: &JobId) -> StoreResult<Job> {
        let record = self.record(id)?;
        let guard = record.lock();
        Ok(guard.job.clone())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.records.read().contains_key(id)
    }

    /// Atomically apply `f` to a job.
    ///
    /// `f` works on a copy; the copy replaces the record only when `f`
    /// succeeds, so a failed update leaves the record untouched. A committed
    /// update bumps `event_seq` and is published to subscribers.
    pub fn update<T, E, F>(&self, id: &JobId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Job) -> Result<T, E>,
        E: From<StoreError>,
    {
        let record = self.record(id)?;
        let mut guard = record.lock();
        let mut draft = guard.job.clone();
        let value = f(&mut draft)?;
        if draft != guard.job {
            draft.event_seq = guard.job.event_seq + 1;
            guard.job = draft;
            guard.events.send_replace(guard.job.clone());
        }
        Ok(value)
    }

    /// Receive every committed snapshot of a job.
    pub fn subscribe(&self, id: &JobId) -> StoreResult<watch::Receiver<Job>> {
        let record = self.record(id)?;
        let guard = record.lock();
        Ok(guard.events.subscribe())
    }

    /// Remove a job that reached a terminal state.
    pub fn remove_terminal(&self, id: &JobId) -> StoreResult<Job> {
        let mut records = self.records.write();
        let record = records.get(id).cloned().ok_or_else(|| StoreError::not_found(id))?;
        let guard = record.lock();
        if !guard.job.is_terminal() {
            return Err(StoreError::NotTerminal(id.clone(), guard.job.status));
        }
        records.remove(id);
        Ok(guard.job.clone())
    }

    /// Evict terminal jobs that finished before `now - retention`.
    pub fn evict_expired(&self, retention: ChronoDuration, now: DateTime<Utc>) -> Vec<JobId> {
        let cutoff = now - retention;
        let mut records = self.records.write();
        let expired: Vec<JobId> = records
            .iter()
            .filter(|(_, record)| {
                let guard = record.lock();
                guard.job.is_terminal() && guard.job.finished_at.unwrap_or(guard.job.updated_at) <= cutoff
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            records.remove(id);
        }
        expired
    }

    /// All jobs ordered by creation time.
    pub fn list(&self) -> Vec<Job> {
        let records: Vec<Arc<Mutex<Record>>> = self.records.read().values().cloned().collect();
        let mut jobs: Vec<Job> = records.iter().map(|r| r.lock().job.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Jobs currently in `status`, oldest first.
    pub fn with_status(&self, status: JobStatus) -> Vec<Job> {
        self.list().into_iter().filter(|j| j.status == status).collect()
    }

    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.lock().job.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_models::{ErrorDetail, ErrorKind, InputRef, JobKind};
    use std::path::PathBuf;

    fn job() -> Job {
        Job::new(
            JobKind::ManualClip,
            InputRef {
                path: PathBuf::from("/tmp/in.mp4"),
                size_bytes: 1,
                mime_type: "video/mp4".into(),
            },
        )
    }

    #[test]
    fn test_insert_get_and_duplicate() {
        let store = JobStore::new();
        let j = job();
        let id = j.id.clone();
        store.insert(j.clone()).unwrap();
        assert_eq!(store.get(&id).unwrap().id, id);
        assert!(matches!(store.insert(j), Err(StoreError::AlreadyExists(_))));
        assert!(matches!(store.get(&JobId::new()), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_bumps_seq_and_publishes() {
        let store = JobStore::new();
        let j = job();
        let id = j.id.clone();
        store.insert(j).unwrap();
        let rx = store.subscribe(&id).unwrap();

        store
            .update(&id, |job| job.start().map_err(StoreError::from))
            .unwrap();
        let seen = rx.borrow().clone();
        assert_eq!(seen.status, JobStatus::Running);
        assert_eq!(seen.event_seq, 1);
    }

    #[test]
    fn test_failed_update_leaves_record_untouched() {
        let store = JobStore::new();
        let j = job();
        let id = j.id.clone();
        store.insert(j).unwrap();

        let res: StoreResult<()> = store.update(&id, |job| {
            job.progress = 0.9;
            job.complete(Default::default())?;
            Ok(())
        });
        assert!(matches!(res, Err(StoreError::InvalidTransition(_))));
        let after = store.get(&id).unwrap();
        assert_eq!(after.progress, 0.0);
        assert_eq!(after.event_seq, 0);
    }

    #[test]
    fn test_noop_update_does_not_publish() {
        let store = JobStore::new();
        let j = job();
        let id = j.id.clone();
        store.insert(j).unwrap();
        let changed: StoreResult<bool> = store.update(&id, |job| Ok(job.record_progress(0.5)));
        assert!(!changed.unwrap());
        assert_eq!(store.get(&id).unwrap().event_seq, 0);
    }

    #[test]
    fn test_remove_terminal_only() {
        let store = JobStore::new();
        let j = job();
        let id = j.id.clone();
        store.insert(j).unwrap();
        assert!(matches!(
            store.remove_terminal(&id),
            Err(StoreError::NotTerminal(_, JobStatus::Queued))
        ));
        store
            .update(&id, |job| job.cancel().map_err(StoreError::from))
            .unwrap();
        assert_eq!(store.remove_terminal(&id).unwrap().status, JobStatus::Canceled);
        assert!(store.is_empty());
    }

    #[test]
    fn test_evict_expired_skips_active_and_recent() {
        let store = JobStore::new();
        let old = job();
        let running = job();
        let old_id = old.id.clone();
        let running_id = running.id.clone();
        store.insert(old).unwrap();
        store.insert(running).unwrap();

        store
            .update(&old_id, |job| {
                job.start()?;
                job.fail(ErrorDetail::new(ErrorKind::ExecutionFailed, "boom"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        store
            .update(&running_id, |job| job.start().map_err(StoreError::from))
            .unwrap();

        let now = Utc::now();
        assert!(store.evict_expired(ChronoDuration::hours(1), now).is_empty());

        let later = now + ChronoDuration::hours(2);
        let evicted = store.evict_expired(ChronoDuration::hours(1), later);
        assert_eq!(evicted, vec![old_id]);
        assert!(store.contains(&running_id));
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(JobStore::new());
        let j = job();
        let id = j.id.clone();
        store.insert(j).unwrap();
        store
            .update(&id, |job| job.start().map_err(StoreError::from))
            .unwrap();

        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for step in 0..50 {
                        let _: StoreResult<bool> = store.update(&id, |job| {
                            Ok(job.record_progress((i * 50 + step) as f64 / 1000.0))
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let final_job = store.get(&id).unwrap();
        assert!((final_job.progress - 0.449).abs() < 1e-9);
    }
}
