//! HTTP request handlers

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::StreamExt;
use uuid::Uuid;

use super::error::ApiError;
use super::types::{
    AnalyzeQuery, AnalyzeResponse, ChatRequest, ChatResponse, ImageRequest, ImageResponse,
    LoadAccepted, LoadModelRequest, LoadStatusResponse, RootResponse, StatusQuery,
};
use crate::health::HealthState;
use crate::models::{SlotKind, SlotStatus};
use crate::Runtime;

/// Prompt used by `/api/analyze` when none is given.
pub const DEFAULT_ANALYZE_PROMPT: &str = "Describe this image";

type ApiResult<T> = Result<T, ApiError>;

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Slot runtime is running",
    })
}

pub async fn health(State(runtime): State<Arc<Runtime>>) -> Response {
    let report = runtime.health_report();
    let status = match report.status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}

/// Per-slot status with `?slot=`, otherwise the most recently updated slot.
pub async fn model_status(
    State(runtime): State<Arc<Runtime>>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<Json<SlotStatus>> {
    let Query(query) = query?;
    let status = match query.slot.as_deref() {
        Some(slot) => runtime.status.get(SlotKind::from_str(slot)?),
        None => runtime.status.latest(),
    };
    Ok(Json(status))
}

pub async fn model_status_all(State(runtime): State<Arc<Runtime>>) -> Json<Vec<SlotStatus>> {
    Json(runtime.status.all())
}

pub async fn load_model(
    State(runtime): State<Arc<Runtime>>,
    payload: Result<Json<LoadModelRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LoadAccepted>)> {
    let Json(request) = payload?;
    let slot = SlotKind::from_str(&request.model_type)?;
    let ticket = runtime.load_model(slot, &request.model_id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(LoadAccepted {
            status: "started",
            message: format!("Loading {} model: {}", slot, ticket.model_id),
            load_id: ticket.id,
            slot,
            model_id: ticket.model_id,
        }),
    ))
}

pub async fn load_status(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> ApiResult<Json<LoadStatusResponse>> {
    let load_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::invalid(format!("invalid load id '{}'", id)))?;
    let outcome = runtime
        .scheduler
        .outcome(&load_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown load id '{}'", load_id)))?;
    Ok(Json(LoadStatusResponse { load_id, outcome }))
}

/// Streamed chat: the body is the generated text, chunk by chunk.
///
/// A backend failure after the first chunk aborts the body instead of
/// ending it cleanly.
pub async fn chat(
    State(runtime): State<Arc<Runtime>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let guard = runtime.shutdown.track().ok_or_else(ApiError::shutting_down)?;
    let Json(request) = payload?;
    let request = request.into_generation(runtime.config.default_max_tokens)?;
    let stream = runtime.orchestrator.generate_stream(request)?;

    // The guard lives as long as the body, so drain waits for open streams.
    let body = stream.map(move |chunk| {
        let _in_flight = &guard;
        chunk
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

pub async fn chat_complete(
    State(runtime): State<Arc<Runtime>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let _guard = runtime.shutdown.track().ok_or_else(ApiError::shutting_down)?;
    let Json(request) = payload?;
    let request = request.into_generation(runtime.config.default_max_tokens)?;
    let response = runtime.orchestrator.generate(request).await?;
    Ok(Json(ChatResponse { response }))
}

pub async fn generate_image(
    State(runtime): State<Arc<Runtime>>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> ApiResult<Json<ImageResponse>> {
    let _guard = runtime.shutdown.track().ok_or_else(ApiError::shutting_down)?;
    let Json(request) = payload?;
    let png = runtime.orchestrator.generate_image(request.prompt).await?;
    Ok(Json(ImageResponse {
        image_base64: STANDARD.encode(png),
    }))
}

/// Multipart upload with a `file` field. The prompt comes from a `prompt`
/// field or query parameter.
pub async fn analyze(
    State(runtime): State<Arc<Runtime>>,
    query: Result<Query<AnalyzeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let _guard = runtime.shutdown.track().ok_or_else(ApiError::shutting_down)?;
    let Query(query) = query?;
    let mut multipart = multipart?;

    let mut image = None;
    let mut prompt = query.prompt;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => image = Some(field.bytes().await?.to_vec()),
            Some("prompt") => prompt = Some(field.text().await?),
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::invalid("multipart field 'file' is required"))?;
    let prompt = prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ANALYZE_PROMPT.to_string());

    let analysis = runtime.orchestrator.analyze_image(image, prompt).await?;
    Ok(Json(AnalyzeResponse { analysis }))
}
