pub mod backend;
pub mod decoder;
pub mod frame;
pub mod freenect;
pub mod mailbox;
pub mod probe;
pub mod v4l2;

pub use backend::{BackendKind, BackendProber, BackendSelection, CaptureBackend};
pub use frame::{ColorFrame, DepthFrame, FramePair, PixelFormat};
pub use probe::{Capabilities, DeviceProbe, ProbeAttempt};
pub use v4l2::GenericCameraBackend;
