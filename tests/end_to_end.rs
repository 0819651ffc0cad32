//! Degraded mode end to end: every backend fails, the capture loop renders
//! status frames and the HTTP endpoints keep answering.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use pi_kinect::capture::{BackendProber, Capabilities, DeviceProbe};
use pi_kinect::pipeline::SHUTDOWN_TIMEOUT;
use pi_kinect::server::{router, AppState};
use pi_kinect::{BackendKind, CaptureBackend, CaptureError, CaptureLoop, Config, FrameBuffer, StreamStatistics};

struct FailingProber(BackendKind);

impl BackendProber for FailingProber {
    fn kind(&self) -> BackendKind {
        self.0
    }

    fn open(&self, _config: &Config) -> Result<Box<dyn CaptureBackend>, CaptureError> {
        Err(CaptureError::BackendInit {
            backend: self.0,
            reason: "stubbed to fail".into(),
        })
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.camera.width = 320;
    config.camera.height = 240;
    config.camera.fps = 50;
    config
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn degraded_mode_serves_status_frames() {
    let config = test_config();
    let probers: Vec<Box<dyn BackendProber>> = BackendKind::PRIORITY
        .iter()
        .map(|&kind| Box::new(FailingProber(kind)) as Box<dyn BackendProber>)
        .collect();
    let capabilities = Capabilities {
        native_binding_available: false,
        system_library_path: None,
    };
    let mut probe = DeviceProbe::with_probers(probers, capabilities.clone());
    let selection = probe.probe(&config);
    assert!(!selection.is_active());
    assert_eq!(probe.attempts().len(), 3);

    let buffer = Arc::new(FrameBuffer::new());
    let stats = Arc::new(StreamStatistics::new());
    let state = Arc::new(AppState {
        buffer: buffer.clone(),
        stats: stats.clone(),
        config: config.clone(),
        capabilities,
        backend: selection.kind(),
        backend_detail: selection.diagnostic().to_string(),
    });
    let capture = CaptureLoop::new(selection, buffer, stats.clone(), &config)
        .spawn()
        .unwrap();

    for _ in 0..200 {
        if stats.frame_count() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let first = stats.frame_count();
    assert!(first >= 2, "capture loop produced no status frames");

    let (status, body) = get(router(state.clone()), "/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["running"], true);
    assert_eq!(json["kinect_available"], false);
    assert!(json["kinect_method"].is_null());
    assert!(json["frame_count"].as_u64().unwrap() > 0);
    assert_eq!(json["frame_available"], true);
    assert_eq!(json["camera_available"], false);
    let error = json["error_message"].as_str().expect("error_message is set");
    assert!(error.contains("stubbed to fail"));

    let (status, body) = get(router(state.clone()), "/stream").await;
    assert_eq!(status, StatusCode::OK);
    let image = image::load_from_memory(&body).unwrap();
    assert_eq!((image.width(), image.height()), (320, 240));

    // Depth is never produced in degraded mode.
    let (status, body) = get(router(state.clone()), "/depth").await;
    assert_eq!(status, StatusCode::OK);
    let image = image::load_from_memory(&body).unwrap();
    assert_eq!((image.width(), image.height()), (320, 240));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.stats.frame_count() > first, "frame count stopped increasing");

    tokio::task::spawn_blocking(move || capture.shutdown(SHUTDOWN_TIMEOUT))
        .await
        .unwrap()
        .unwrap();
    assert!(!state.stats.is_running());
}
