//! In-memory FIFO job store.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use slipway_id::ReleaseJobId;

use super::{JobStore, JobStoreError, ReleaseJob, ReleaseJobSpec};

#[derive(Default)]
struct Inner {
    queue: VecDeque<ReleaseJobId>,
    jobs: HashMap<ReleaseJobId, ReleaseJob>,
}

/// In-memory job store: a FIFO queue of ids plus a by-id map.
///
/// Once an id is popped from the queue it is never requeued, which is
/// what gives at-most-once delivery; the job record itself stays
/// addressable forever.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many jobs are waiting to be dequeued.
    pub fn queued(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

impl JobStore for InMemoryJobStore {
    fn put(&self, spec: ReleaseJobSpec) -> Result<ReleaseJobId, JobStoreError> {
        let id = ReleaseJobId::new();
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(id, ReleaseJob::new(id, spec));
        inner.queue.push_back(id);
        Ok(id)
    }

    fn next_job(&self) -> Result<ReleaseJob, JobStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.queue.pop_front().ok_or(JobStoreError::NoJobAvailable)?;
        inner
            .jobs
            .get(&id)
            .cloned()
            .ok_or(JobStoreError::UnknownJob(id))
    }

    fn update_job(&self, job: &ReleaseJob) -> Result<(), JobStoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::UnknownJob(job.id));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn get_job(&self, id: &ReleaseJobId) -> Result<ReleaseJob, JobStoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .jobs
            .get(id)
            .cloned()
            .ok_or(JobStoreError::UnknownJob(*id))
    }
}
