use thiserror::Error;

use crate::capture::BackendKind;

/// Capture subsystem errors.
///
/// Nothing in here is allowed to escape the capture thread: backend failures
/// are converted into "try the next backend" by the probe and into a skipped
/// cycle by the capture loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture device found: {0}")]
    DeviceNotFound(String),

    #[error("{backend} backend unavailable: {reason}")]
    BackendInit { backend: BackendKind, reason: String },

    #[error("frame read failed: {0}")]
    FrameRead(String),

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("device shutdown failed: {0}")]
    Shutdown(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub(crate) fn init(backend: BackendKind, reason: impl Into<String>) -> Self {
        Self::BackendInit {
            backend,
            reason: reason.into(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration file not found: {0}")]
    MissingFile(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("encoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience Result alias for the capture subsystem.
pub type Result<T> = std::result::Result<T, CaptureError>;
