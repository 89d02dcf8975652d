use crate::server::error::ApiError;
use crate::server::AppContext;
use crate::state::JobView;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use encodeforge_common::{Error, JobId};
use serde::Serialize;

/// Multipart framing allowance on top of the configured upload ceiling.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Name of the multipart field carrying the upload.
const UPLOAD_FIELD: &str = "video";

pub fn api_routes(max_upload_bytes: u64) -> Router<AppContext> {
    let body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job).delete(delete_job))
        .route("/jobs/:id/notify", post(notify_job))
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status_code: u16,
}

impl SubmitResponse {
    fn accepted(job_id: JobId) -> (StatusCode, Json<Self>) {
        (
            StatusCode::ACCEPTED,
            Json(Self {
                job_id,
                status_code: StatusCode::OK.as_u16(),
            }),
        )
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn upload(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    // The declared length includes multipart framing, so allow the overhead.
    ctx.manager.check_upload_size(
        content_length(&headers).map(|len| len.saturating_sub(MULTIPART_OVERHEAD as u64)),
    )?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid_input(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| Error::invalid_input("upload field has no file name"))?;

        let job_id = ctx.manager.submit_upload(&file_name, field).await?;
        return Ok(SubmitResponse::accepted(job_id));
    }

    Err(Error::invalid_input(format!("expected a file in the '{}' field", UPLOAD_FIELD)).into())
}

async fn notify_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let job_id = ctx.manager.notify_upload(&id).await?;
    Ok(SubmitResponse::accepted(job_id))
}

async fn list_jobs(State(ctx): State<AppContext>) -> Json<Vec<JobView>> {
    Json(ctx.registry.list())
}

async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let id = JobId::parse(&id)?;
    Ok(Json(ctx.fanout.snapshot(&id)?))
}

async fn delete_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = JobId::parse(&id)?;
    if !ctx.registry.retire_terminal(&id)? {
        return Err(Error::not_found(format!("No transcoding job found for {}", id)).into());
    }
    Ok(StatusCode::NO_CONTENT)
}
