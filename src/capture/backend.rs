use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::frame::FramePair;
use crate::config::Config;
use crate::error::Result;

/// The hardware access strategies, in probe priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// libfreenect linked into the binary, callback frame delivery.
    NativeDriver,
    /// libfreenect loaded from the system at runtime, polled.
    SystemLibrary,
    /// Any V4L2 camera, polled.
    GenericCamera,
}

impl BackendKind {
    pub const PRIORITY: [BackendKind; 3] = [
        BackendKind::NativeDriver,
        BackendKind::SystemLibrary,
        BackendKind::GenericCamera,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::NativeDriver => "native_driver",
            BackendKind::SystemLibrary => "system_library",
            BackendKind::GenericCamera => "generic_camera",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An opened capture device.
///
/// Owned exclusively by the capture loop. `pull_frame` must return within
/// `budget`; backends whose underlying call can hang apply their own timeout.
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Human readable detail about the opened device, e.g. `/dev/video1`.
    fn describe(&self) -> String;

    /// Pull the most recent color/depth pair. An empty pair is a valid result
    /// when the device had nothing new within `budget`.
    fn pull_frame(&mut self, budget: Duration) -> Result<FramePair>;

    /// Release the device. Must be idempotent; `Drop` implementations call it
    /// too.
    fn close(&mut self) -> Result<()>;
}

/// Knows how to find and open one backend variant.
pub trait BackendProber: Send {
    fn kind(&self) -> BackendKind;

    /// Try to open the device. Any failure means "this backend is
    /// unavailable", never a fatal error.
    fn open(&self, config: &Config) -> Result<Box<dyn CaptureBackend>>;
}

/// Outcome of device probing. Decided once at startup.
pub enum BackendSelection {
    Active {
        backend: Box<dyn CaptureBackend>,
        detail: String,
    },
    None {
        diagnostic: String,
    },
}

impl BackendSelection {
    pub fn kind(&self) -> Option<BackendKind> {
        match self {
            BackendSelection::Active { backend, .. } => Some(backend.kind()),
            BackendSelection::None { .. } => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, BackendSelection::Active { .. })
    }

    /// Which device was selected, or why none was.
    pub fn diagnostic(&self) -> &str {
        match self {
            BackendSelection::Active { detail, .. } => detail,
            BackendSelection::None { diagnostic } => diagnostic,
        }
    }
}

impl fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSelection::Active { backend, detail } => f
                .debug_struct("Active")
                .field("kind", &backend.kind())
                .field("detail", detail)
                .finish(),
            BackendSelection::None { diagnostic } => {
                f.debug_struct("None").field("diagnostic", diagnostic).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_fixed() {
        assert_eq!(
            BackendKind::PRIORITY,
            [
                BackendKind::NativeDriver,
                BackendKind::SystemLibrary,
                BackendKind::GenericCamera
            ]
        );
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&BackendKind::SystemLibrary).unwrap();
        assert_eq!(json, "\"system_library\"");
        assert_eq!(BackendKind::GenericCamera.to_string(), "generic_camera");
    }

    #[test]
    fn trait_object_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Box<dyn CaptureBackend>>();
        assert_send::<BackendSelection>();
    }
}
