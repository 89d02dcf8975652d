//! Job registry: the single owner of per-job state.
//!
//! Entries are keyed by [`JobId`] in a sharded map, so unrelated jobs never
//! contend on one lock. Each entry guards its record, its attached
//! observers, and the supervisor's task handle with its own `RwLock`.

mod channel;
mod types;

pub use channel::{ProgressEvent, ProgressSender, Terminal};
pub use types::*;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use encodeforge_av::BitrateLadder;
use encodeforge_common::{Error, JobId, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::fanout;

pub(crate) struct EntryInner {
    pub(crate) job: Job,
    pub(crate) observers: Vec<mpsc::UnboundedSender<StatusUpdate>>,
    task: Option<JoinHandle<()>>,
}

pub(crate) struct JobEntry {
    pub(crate) inner: RwLock<EntryInner>,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        Self {
            inner: RwLock::new(EntryInner {
                job,
                observers: Vec::new(),
                task: None,
            }),
        }
    }

    fn is_terminal(&self) -> bool {
        self.inner.read().job.is_terminal()
    }
}

/// Live view of one job's status updates.
///
/// Yields the replayed current state (if any progress was seen), then each
/// subsequent update, and ends after the terminal update.
pub struct ChannelHandle {
    job_id: JobId,
    rx: mpsc::UnboundedReceiver<StatusUpdate>,
}

impl ChannelHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn recv(&mut self) -> Option<StatusUpdate> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<StatusUpdate> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Owns every job known to this process.
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<JobEntry>>,
    retention: Duration,
}

impl JobRegistry {
    /// `retention` is how long a finished job stays observable.
    pub fn new(retention: Duration) -> Arc<Self> {
        Arc::new(Self {
            jobs: DashMap::new(),
            retention,
        })
    }

    /// Register a job and open its progress channel.
    ///
    /// Fails with `AlreadyRunning` if a non-terminal job holds the id. A
    /// finished job with the same id is replaced.
    pub fn create(self: &Arc<Self>, job: Job) -> Result<ProgressSender> {
        let id = job.id.clone();
        let entry = Arc::new(JobEntry::new(job));

        match self.jobs.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_terminal() {
                    return Err(Error::already_running(id.to_string()));
                }
                tracing::debug!(job_id = %id, "Replacing finished job");
                occupied.insert(Arc::clone(&entry));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&entry));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        fanout::spawn_dispatcher(Arc::downgrade(self), entry, rx, self.retention);

        tracing::info!(job_id = %id, "Job created");
        Ok(ProgressSender::new(id, tx))
    }

    fn entry(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Snapshot of a job. Never waits on progress.
    pub fn get(&self, id: &JobId) -> Option<JobView> {
        self.entry(id).map(|entry| entry.inner.read().job.view())
    }

    /// All known jobs, oldest first.
    pub fn list(&self) -> Vec<JobView> {
        let entries: Vec<Arc<JobEntry>> = self.jobs.iter().map(|e| Arc::clone(e.value())).collect();
        let mut views: Vec<JobView> = entries
            .iter()
            .map(|entry| entry.inner.read().job.view())
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        views
    }

    /// Attach a new observer to a job.
    ///
    /// Registration happens under the entry lock the dispatcher also takes,
    /// so the observer sees every update after its replay exactly once. A
    /// finished job yields only its terminal update.
    pub fn attach_channel(&self, id: &JobId) -> Option<ChannelHandle> {
        let entry = self.entry(id)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = entry.inner.write();
        if inner.job.is_terminal() {
            let _ = tx.send(inner.job.status_update());
        } else {
            if inner.job.percentage.is_some() {
                let _ = tx.send(inner.job.status_update());
            }
            inner.observers.push(tx);
        }
        drop(inner);

        tracing::debug!(job_id = %id, "Observer attached");
        Some(ChannelHandle {
            job_id: id.clone(),
            rx,
        })
    }

    /// Remove a job. Returns whether anything was removed.
    pub fn retire(&self, id: &JobId) -> bool {
        let removed = self.jobs.remove(id).is_some();
        if removed {
            tracing::debug!(job_id = %id, "Job retired");
        }
        removed
    }

    /// Remove a job only if it has finished, in one step against the map.
    ///
    /// Returns `Ok(false)` for an unknown id and `AlreadyRunning` while the
    /// job is active, so a job that reused the id is never removed.
    pub fn retire_terminal(&self, id: &JobId) -> Result<bool> {
        if self
            .jobs
            .remove_if(id, |_, entry| entry.is_terminal())
            .is_some()
        {
            tracing::debug!(job_id = %id, "Finished job retired");
            return Ok(true);
        }
        if self.jobs.contains_key(id) {
            return Err(Error::already_running(id.to_string()));
        }
        Ok(false)
    }

    /// Retire `id` only if it still maps to `entry`, so a job that reused the
    /// id is left alone.
    pub(crate) fn retire_entry(&self, id: &JobId, entry: &Arc<JobEntry>) -> bool {
        let removed = self
            .jobs
            .remove_if(id, |_, current| Arc::ptr_eq(current, entry))
            .is_some();
        if removed {
            tracing::debug!(job_id = %id, "Job retired after retention window");
        }
        removed
    }

    /// Move a job into a non-terminal state.
    pub fn transition(&self, id: &JobId, state: JobState) -> Result<()> {
        let entry = self
            .entry(id)
            .ok_or_else(|| Error::not_found(format!("job {}", id)))?;
        let mut inner = entry.inner.write();
        if !inner.job.advance(state) {
            return Err(Error::internal(format!(
                "job {} cannot move from {} to {}",
                id, inner.job.state, state
            )));
        }
        Ok(())
    }

    /// Record the ladder and duration and move the job to `Running`.
    pub fn mark_running(
        &self,
        id: &JobId,
        ladder: BitrateLadder,
        duration: Option<Duration>,
    ) -> Result<()> {
        let entry = self
            .entry(id)
            .ok_or_else(|| Error::not_found(format!("job {}", id)))?;
        let mut inner = entry.inner.write();
        if !inner.job.start_running(ladder, duration) {
            return Err(Error::internal(format!(
                "job {} cannot start from {}",
                id, inner.job.state
            )));
        }
        Ok(())
    }

    /// Keep the supervisor's handle so shutdown can wait for it.
    pub fn attach_task(&self, id: &JobId, handle: JoinHandle<()>) {
        match self.entry(id) {
            Some(entry) => entry.inner.write().task = Some(handle),
            None => tracing::debug!(job_id = %id, "Job retired before its task was attached"),
        }
    }

    pub fn active_count(&self) -> usize {
        self.jobs.iter().filter(|e| !e.value().is_terminal()).count()
    }

    /// Wait for in-flight supervisors, aborting whatever is left after `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        let entries: Vec<Arc<JobEntry>> = self.jobs.iter().map(|e| Arc::clone(e.value())).collect();
        let handles: Vec<JoinHandle<()>> = entries
            .iter()
            .filter_map(|entry| entry.inner.write().task.take())
            .filter(|handle| !handle.is_finished())
            .collect();

        if handles.is_empty() {
            return;
        }

        tracing::info!(count = handles.len(), "Waiting for running transcodes");
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(count = aborts.len(), "Shutdown grace elapsed, aborting transcodes");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}
