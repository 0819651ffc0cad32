pub mod buffer;
pub mod capture_loop;
pub mod stats;

pub use buffer::FrameBuffer;
pub use capture_loop::{CaptureHandle, CaptureLoop, SHUTDOWN_TIMEOUT};
pub use stats::{StatsSnapshot, StreamStatistics};
