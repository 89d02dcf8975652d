use crate::server::AppContext;
use crate::state::StatusUpdate;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use encodeforge_common::JobId;
use futures::stream::{self, BoxStream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/jobs/:id/events", get(job_events))
}

fn progress_event(update: &StatusUpdate) -> Event {
    let data = serde_json::to_string(update)
        .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));
    Event::default().event("progress").data(data)
}

/// Push stream for one job. Ends after the terminal update or at shutdown; an
/// unknown id produces a single `error` event.
pub async fn job_events(
    State(ctx): State<AppContext>,
    Path(raw_id): Path<String>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let subscription = JobId::parse(&raw_id).and_then(|id| ctx.fanout.subscribe(&id));

    let events: BoxStream<'static, Result<Event, Infallible>> = match subscription {
        Ok(updates) => updates
            .take_until(ctx.shutdown.clone().cancelled_owned())
            .map(|update| Ok(progress_event(&update)))
            .boxed(),
        Err(e) => {
            tracing::debug!(job_id = %raw_id, error = %e, "Event stream for unknown job");
            let data = serde_json::json!({
                "error": format!("No transcoding job found for {}", raw_id),
            });
            stream::once(async move { Ok(Event::default().event("error").data(data.to_string())) })
                .boxed()
        }
    };

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
