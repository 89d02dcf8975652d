//! Progress fan-out: snapshot, push, and RPC access to job progress.
//!
//! Every job has exactly one internal consumer of its progress channel, a
//! dispatcher task, which replicates each event into a private channel per
//! attached observer. Consumers therefore never compete for events.

mod dispatcher;

pub(crate) use dispatcher::spawn_dispatcher;

use encodeforge_common::{Error, JobId, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::state::{JobRegistry, JobState, JobView, StatusUpdate};

/// Message of the `StatusVideo` server stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatusResponse {
    /// Percentage rendered as text.
    pub status: String,
    pub percentage: u8,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<StatusUpdate> for VideoStatusResponse {
    fn from(update: StatusUpdate) -> Self {
        Self {
            status: update.percentage.to_string(),
            percentage: update.percentage,
            state: update.state,
            message: update.message,
        }
    }
}

#[derive(Clone)]
pub struct ProgressFanout {
    registry: Arc<JobRegistry>,
}

impl ProgressFanout {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Last known state and percentage.
    pub fn snapshot(&self, id: &JobId) -> Result<JobView> {
        self.registry
            .get(id)
            .ok_or_else(|| Error::not_found(format!("No transcoding job found for {}", id)))
    }

    /// Push stream of status updates, ending with the terminal update.
    pub fn subscribe(&self, id: &JobId) -> Result<UnboundedReceiverStream<StatusUpdate>> {
        self.registry
            .attach_channel(id)
            .map(|handle| handle.into_stream())
            .ok_or_else(|| Error::not_found(format!("No transcoding job found for {}", id)))
    }

    /// Server-streaming RPC view of [`subscribe`](Self::subscribe).
    pub fn rpc_stream(&self, id: &JobId) -> Result<impl Stream<Item = VideoStatusResponse>> {
        Ok(self.subscribe(id)?.map(VideoStatusResponse::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FailureKind, Job, Terminal};
    use assert_matches::assert_matches;
    use std::path::PathBuf;
    use std::time::Duration;

    fn setup(id: &str) -> (ProgressFanout, JobId, crate::state::ProgressSender) {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let id = JobId::parse(id).unwrap();
        let job = Job::new(id.clone(), PathBuf::from("/in.mp4"), PathBuf::from("/out"));
        let sender = registry.create(job).unwrap();
        (ProgressFanout::new(registry), id, sender)
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found_everywhere() {
        let fanout = ProgressFanout::new(JobRegistry::new(Duration::from_secs(1)));
        let id = JobId::parse("never").unwrap();
        assert_matches!(fanout.snapshot(&id), Err(Error::NotFound(_)));
        assert_matches!(fanout.subscribe(&id), Err(Error::NotFound(_)));
        assert!(fanout.rpc_stream(&id).is_err());
    }

    #[tokio::test]
    async fn test_push_and_rpc_see_same_sequence() {
        let (fanout, id, sender) = setup("both");
        let push = fanout.subscribe(&id).unwrap();
        let rpc = fanout.rpc_stream(&id).unwrap();

        sender.progress(25);
        sender.progress(75);
        sender.finish(Terminal::failed(FailureKind::Runtime, "exit status: 1"));

        let pushed: Vec<StatusUpdate> = push.collect().await;
        let streamed: Vec<VideoStatusResponse> = rpc.collect().await;

        assert_eq!(pushed.len(), 3);
        assert_eq!(streamed.len(), 3);
        assert_eq!(streamed[0].status, "25");
        assert_eq!(streamed[1].status, "75");
        assert_eq!(streamed[2].state, JobState::Failed);
        assert_eq!(streamed[2].message.as_deref(), Some("exit status: 1"));
        assert!(pushed.last().unwrap().is_terminal());
        assert_eq!(pushed.iter().filter(|u| u.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_progress() {
        let (fanout, id, sender) = setup("snap");
        let mut stream = fanout.subscribe(&id).unwrap();
        sender.progress(42);
        stream.next().await.unwrap();

        let view = fanout.snapshot(&id).unwrap();
        assert_eq!(view.percentage, Some(42));
        assert!(!view.state.is_terminal());
    }
}
