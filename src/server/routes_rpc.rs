//! JSON-over-HTTP rendition of the transcoding RPC services.
//!
//! `NotifyUploadComplete` is unary; `StatusVideo` is server-streaming and
//! writes one JSON message per line until the job's terminal update.

use crate::server::error::{status_for, ApiError};
use crate::server::AppContext;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use encodeforge_common::JobId;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

pub fn rpc_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/transcoding.Transcoder/NotifyUploadComplete",
            post(notify_upload_complete),
        )
        .route(
            "/transcoding.VideoStatusService/StatusVideo",
            post(status_video),
        )
}

#[derive(Debug, Deserialize)]
pub struct UploadCompleteRequest {
    pub uuid: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscodeResponse {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoStatusRequest {
    pub uuid: String,
}

async fn notify_upload_complete(
    State(ctx): State<AppContext>,
    Json(request): Json<UploadCompleteRequest>,
) -> (StatusCode, Json<TranscodeResponse>) {
    match ctx.manager.notify_upload(&request.uuid).await {
        Ok(job_id) => {
            tracing::info!(job_id = %job_id, "Upload completion acknowledged");
            (
                StatusCode::OK,
                Json(TranscodeResponse {
                    status_code: StatusCode::OK.as_u16(),
                    message: None,
                }),
            )
        }
        Err(e) => {
            let status = status_for(&e);
            (
                status,
                Json(TranscodeResponse {
                    status_code: status.as_u16(),
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

async fn status_video(
    State(ctx): State<AppContext>,
    Json(request): Json<VideoStatusRequest>,
) -> Result<Response, ApiError> {
    let id = JobId::parse(&request.uuid)?;
    let messages = ctx.fanout.rpc_stream(&id)?;

    let body = messages
        .take_until(ctx.shutdown.clone().cancelled_owned())
        .map(|message| {
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            Ok::<_, serde_json::Error>(Bytes::from(line))
        });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response())
}
