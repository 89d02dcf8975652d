//! Per-job dispatcher: the only reader of a job's progress channel.

use encodeforge_common::JobId;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::state::{
    FailureKind, JobEntry, JobRegistry, ProgressEvent, StatusUpdate, Terminal,
};

pub(crate) fn spawn_dispatcher(
    registry: Weak<JobRegistry>,
    entry: Arc<JobEntry>,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    retention: Duration,
) {
    tokio::spawn(run(registry, entry, rx, retention));
}

async fn run(
    registry: Weak<JobRegistry>,
    entry: Arc<JobEntry>,
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    retention: Duration,
) {
    let id = entry.inner.read().job.id.clone();

    let terminal = loop {
        match rx.recv().await {
            Some(ProgressEvent::Progress(pct)) => apply_progress(&entry, &id, pct),
            Some(ProgressEvent::Anomaly(message)) => {
                entry.inner.write().job.record_anomaly(message);
            }
            Some(ProgressEvent::Terminal(terminal)) => break terminal,
            // ProgressSender always finishes on drop, so this is unreachable in practice.
            None => {
                break Terminal::failed(FailureKind::Runtime, "progress channel closed unexpectedly")
            }
        }
    };

    apply_terminal(&entry, &id, terminal);
    drop(rx);

    tokio::time::sleep(retention).await;
    if let Some(registry) = registry.upgrade() {
        registry.retire_entry(&id, &entry);
    }
}

fn broadcast(observers: &mut Vec<mpsc::UnboundedSender<StatusUpdate>>, update: &StatusUpdate) {
    observers.retain(|tx| tx.send(update.clone()).is_ok());
}

fn apply_progress(entry: &JobEntry, id: &JobId, pct: u8) {
    let mut guard = entry.inner.write();
    let inner = &mut *guard;
    if !inner.job.update_progress(pct) {
        tracing::debug!(job_id = %id, percentage = pct, "Progress after terminal state ignored");
        return;
    }
    let update = inner.job.status_update();
    broadcast(&mut inner.observers, &update);
    tracing::debug!(
        job_id = %id,
        percentage = pct,
        observers = inner.observers.len(),
        "Progress"
    );
}

fn apply_terminal(entry: &JobEntry, id: &JobId, terminal: Terminal) {
    let mut guard = entry.inner.write();
    let inner = &mut *guard;
    let success = terminal.success();
    if !inner.job.finish(terminal.state, terminal.result) {
        tracing::warn!(job_id = %id, state = %inner.job.state, "Job already terminal");
    }
    let update = inner.job.status_update();
    broadcast(&mut inner.observers, &update);
    // Dropping the senders ends every observer's stream after the terminal update.
    inner.observers.clear();

    if success {
        tracing::info!(job_id = %id, "Job completed");
    } else {
        tracing::warn!(
            job_id = %id,
            state = %inner.job.state,
            message = update.message.as_deref().unwrap_or(""),
            "Job did not complete"
        );
    }
}
