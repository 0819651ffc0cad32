pub mod font;
pub mod overlay;

pub use overlay::{placeholder, status_frame, StatusInfo};
