//! Endpoint handlers. Every media handler reads the buffer exactly once and
//! encodes that snapshot on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use super::encode;
use super::page::INDEX_HTML;
use super::AppState;
use crate::capture::BackendKind;
use crate::error::ServerError;
use crate::render::placeholder;
use crate::tonemap::tone_map_with_ceiling;
use crate::utils::list_video_devices;

pub const FRAME_SEQUENCE: HeaderName = HeaderName::from_static("x-frame-sequence");

const STREAM_PLACEHOLDER: &str = "Stream Not Available";
const DEPTH_PLACEHOLDER: &str = "Depth Not Available";

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub frame_count: u64,
    pub read_failures: u64,
    pub fps: f64,
    pub elapsed_time: f64,
    pub backend_kind: Option<BackendKind>,
    pub kinect_available: bool,
    pub kinect_method: Option<&'static str>,
    pub error_message: Option<String>,
    pub timestamp: f64,
    /// A real device is producing color frames.
    pub camera_available: bool,
    /// Some color frame, real or synthetic, is ready to serve.
    pub frame_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticResponse {
    #[serde(flatten)]
    pub status: StatusResponse,
    pub stream_type: &'static str,
    pub server_running: bool,
    pub native_binding_available: bool,
    pub system_library_path: Option<PathBuf>,
    pub backend_detail: String,
    pub available_video_devices: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameResponse {
    pub timestamp: f64,
    pub rgb_available: bool,
    pub depth_available: bool,
    pub kinect_available: bool,
    pub kinect_method: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_sequence: Option<u64>,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Current color frame as JPEG, or a placeholder before the first publish.
pub async fn stream(State(state): State<Arc<AppState>>) -> Result<Response, ServerError> {
    let quality = state.config.camera.jpeg_quality;
    let (width, height) = state.frame_size();
    let snapshot = state.buffer.read_color();

    let (body, sequence) = tokio::task::spawn_blocking(move || match snapshot {
        Some(frame) => encode::color_frame_jpeg(&frame, quality).map(|jpeg| (jpeg, Some(frame.sequence()))),
        None => encode::rgb_image_jpeg(&placeholder(width, height, STREAM_PLACEHOLDER), quality)
            .map(|jpeg| (jpeg, None)),
    })
    .await??;

    Ok(jpeg_response(body, sequence))
}

/// Tone mapped current depth frame as JPEG. Tone mapping happens here, per
/// request, so nobody pays for it unless depth is being viewed.
pub async fn depth(State(state): State<Arc<AppState>>) -> Result<Response, ServerError> {
    let quality = state.config.camera.jpeg_quality;
    let ceiling = state.config.kinect.depth_ceiling;
    let (width, height) = state.frame_size();
    let snapshot = state.buffer.read_depth();

    let (body, sequence) = tokio::task::spawn_blocking(move || match snapshot {
        Some(depth) => {
            let mapped = tone_map_with_ceiling(&depth, ceiling);
            encode::gray_jpeg(&mapped, quality).map(|jpeg| (jpeg, Some(depth.sequence())))
        }
        None => encode::rgb_image_jpeg(&placeholder(width, height, DEPTH_PLACEHOLDER), quality)
            .map(|jpeg| (jpeg, None)),
    })
    .await??;

    Ok(jpeg_response(body, sequence))
}

/// Both frames as base64 in one JSON document. Absence is reported through
/// the `*_available` flags instead of a placeholder.
pub async fn frame(State(state): State<Arc<AppState>>) -> Result<Json<FrameResponse>, ServerError> {
    let quality = state.config.camera.jpeg_quality;
    let color = state.buffer.read_color();
    let depth = state.buffer.read_depth();
    let backend = state.backend;

    let response = tokio::task::spawn_blocking(move || -> Result<FrameResponse, ServerError> {
        let mut response = FrameResponse {
            timestamp: unix_now(),
            rgb_available: color.is_some(),
            depth_available: depth.is_some(),
            kinect_available: backend.is_some(),
            kinect_method: backend.map(|k| k.as_str()),
            ..Default::default()
        };

        if let Some(color) = color {
            let jpeg = encode::color_frame_jpeg(&color, quality)?;
            response.rgb_data = Some(STANDARD.encode(jpeg));
            response.rgb_width = Some(color.width());
            response.rgb_height = Some(color.height());
            response.rgb_sequence = Some(color.sequence());
        }

        if let Some(depth) = depth {
            let png = encode::depth_png16(&depth)?;
            response.depth_data = Some(STANDARD.encode(png));
            response.depth_format = Some("png16");
            response.depth_width = Some(depth.width());
            response.depth_height = Some(depth.height());
            response.depth_sequence = Some(depth.sequence());
        }

        Ok(response)
    })
    .await??;

    Ok(Json(response))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(status_snapshot(&state))
}

pub async fn diagnostic(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DiagnosticResponse>, ServerError> {
    let devices = tokio::task::spawn_blocking(list_video_devices).await?;

    Ok(Json(DiagnosticResponse {
        status: status_snapshot(&state),
        stream_type: "pi_kinect",
        server_running: true,
        native_binding_available: state.capabilities.native_binding_available,
        system_library_path: state.capabilities.system_library_path.clone(),
        backend_detail: state.backend_detail.clone(),
        available_video_devices: devices
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    }))
}

fn status_snapshot(state: &AppState) -> StatusResponse {
    let stats = state.stats.snapshot();
    let frame_available = state.buffer.has_color();

    StatusResponse {
        running: stats.running,
        frame_count: stats.frame_count,
        read_failures: stats.read_failures,
        fps: stats.fps,
        elapsed_time: stats.elapsed_time,
        backend_kind: state.backend,
        kinect_available: state.backend.is_some(),
        kinect_method: state.backend.map(|k| k.as_str()),
        error_message: stats.error_message,
        timestamp: unix_now(),
        camera_available: state.backend.is_some() && frame_available,
        frame_available,
    }
}

fn jpeg_response(body: Vec<u8>, sequence: Option<u64>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    if let Some(sequence) = sequence {
        headers.insert(FRAME_SEQUENCE, HeaderValue::from(sequence));
    }
    (headers, body).into_response()
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
