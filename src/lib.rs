//! Kinect / depth camera capture with an HTTP relay.
//!
//! A [`DeviceProbe`] picks one capture backend at startup, a [`CaptureLoop`]
//! feeds its frames into a lock-free [`FrameBuffer`], and the [`server`]
//! module serves the latest frames over HTTP.

pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod tonemap;
pub mod utils;

pub use capture::{
    BackendKind, BackendSelection, CaptureBackend, ColorFrame, DepthFrame, DeviceProbe, FramePair,
};
pub use config::Config;
pub use error::{CaptureError, ConfigError, ServerError};
pub use pipeline::{CaptureHandle, CaptureLoop, FrameBuffer, StreamStatistics};
pub use tonemap::tone_map;
