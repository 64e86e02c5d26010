//! HTTP surface of the relay.
//!
//! Handlers only translate between query parameters and the pipeline in
//! [`crate::relay`]; every failure is logged here and answered with a terse,
//! generic message.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::SelectionMode;
use crate::error::RelayError;
use crate::formats::resolve_formats;
use crate::media::{DownloadRequest, MediaKind, Selection};
use crate::provider::MediaProvider;
use crate::relay::{RelayOutcome, perform_download};
use crate::staging::StagingArea;
use crate::validate::is_valid_media_url;

mod pages;

const INVALID_URL_MESSAGE: &str = "Invalid YouTube URL";
const INFO_ERROR_MESSAGE: &str = "Error fetching video information";
const DOWNLOAD_ERROR_MESSAGE: &str = "Error downloading content";

#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn MediaProvider>,
    staging: Arc<StagingArea>,
    selection_mode: SelectionMode,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn MediaProvider>,
        staging: StagingArea,
        selection_mode: SelectionMode,
    ) -> Self {
        Self {
            provider,
            staging: Arc::new(staging),
            selection_mode,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(entry_form))
        .route("/validate", get(validate))
        .route("/download", get(download))
        .route("/api/formats", get(list_formats))
        .route("/api/health", get(health))
        .with_state(state)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn invalid_url() -> Self {
        Self::bad_request(INVALID_URL_MESSAGE)
    }

    /// Logs `err` and hides it behind `public_message`. Only an invalid URL is
    /// the caller's fault; everything else is reported as a server error.
    fn from_relay(err: RelayError, url: &str, public_message: &str) -> Self {
        match err {
            RelayError::InvalidUrl(_) => Self::invalid_url(),
            other => {
                error!(url, error = %other, "request failed");
                Self::internal(public_message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    #[serde(default)]
    url: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    #[serde(default)]
    url: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    format: Option<String>,
    rendition: Option<String>,
}

#[derive(Debug, Serialize)]
struct FormatsResponse {
    title: String,
    kind: MediaKind,
    formats: Vec<FormatOption>,
}

#[derive(Debug, Serialize)]
struct FormatOption {
    index: usize,
    rendition_id: String,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size: Option<u64>,
}

async fn entry_form() -> Html<String> {
    Html(pages::entry_form())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn validate(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<Html<String>> {
    if !is_valid_media_url(&query.url) {
        return Err(ApiError::invalid_url());
    }
    let kind = parse_kind(query.kind.as_deref(), MediaKind::Video)?;

    let resolved = resolve_formats(state.provider.as_ref(), &query.url, kind)
        .await
        .map_err(|err| ApiError::from_relay(err, &query.url, INFO_ERROR_MESSAGE))?;

    Ok(Html(pages::format_choices(
        &query.url,
        &resolved,
        state.selection_mode,
    )))
}

async fn list_formats(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<Json<FormatsResponse>> {
    if !is_valid_media_url(&query.url) {
        return Err(ApiError::invalid_url());
    }
    let kind = parse_kind(query.kind.as_deref(), MediaKind::Video)?;

    let resolved = resolve_formats(state.provider.as_ref(), &query.url, kind)
        .await
        .map_err(|err| ApiError::from_relay(err, &query.url, INFO_ERROR_MESSAGE))?;

    let formats = resolved
        .formats
        .into_iter()
        .enumerate()
        .map(|(index, format)| FormatOption {
            index,
            label: format.label(),
            rendition_id: format.rendition_id,
            ext: format.ext,
            file_size: format.file_size,
        })
        .collect();

    Ok(Json(FormatsResponse {
        title: resolved.title,
        kind,
        formats,
    }))
}

async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    debug!(?query, "download requested");

    if !is_valid_media_url(&query.url) {
        return Err(ApiError::invalid_url());
    }
    let kind = parse_kind(query.kind.as_deref(), MediaKind::Audio)?;
    let selection = parse_selection(query.format.as_deref(), query.rendition.as_deref())?;

    let request = DownloadRequest {
        url: query.url,
        kind,
        selection,
    };
    let outcome = perform_download(state.provider.as_ref(), &state.staging, &request)
        .await
        .map_err(|err| ApiError::from_relay(err, &request.url, DOWNLOAD_ERROR_MESSAGE))?;

    attachment(outcome)
}

/// Turns a staged transfer into the attachment response. The staging file is
/// removed once the body has been sent, or when it is dropped unsent.
fn attachment(outcome: RelayOutcome) -> ApiResult<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&outcome.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(outcome.content_length),
    );
    let disposition = HeaderValue::from_str(&content_disposition(&outcome.file_name))
        .map_err(|err| {
            error!(file_name = %outcome.file_name, error = %err, "invalid attachment name");
            ApiError::internal(DOWNLOAD_ERROR_MESSAGE)
        })?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    Ok((headers, Body::from_stream(outcome.body)).into_response())
}

fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

/// Parses `type`, falling back to `default` when it is absent. The choice
/// pages default to video; a download without a type is an audio download.
fn parse_kind(raw: Option<&str>, default: MediaKind) -> ApiResult<MediaKind> {
    match non_empty(raw) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid media type")),
    }
}

/// A rendition id wins over a positional index when both are present.
fn parse_selection(format: Option<&str>, rendition: Option<&str>) -> ApiResult<Selection> {
    if let Some(id) = non_empty(rendition) {
        return Ok(Selection::Rendition(id.to_owned()));
    }
    match non_empty(format) {
        Some(index) => parse_index(index)
            .map(Selection::Index)
            .ok_or_else(|| ApiError::bad_request("Invalid format selection")),
        None => Err(ApiError::bad_request("Missing format selection")),
    }
}

/// Integers too large for `i64` saturate, so they still end up out of range
/// instead of being rejected as malformed.
fn parse_index(raw: &str) -> Option<i64> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(index) => Some(index),
        Err(_) if negative => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
