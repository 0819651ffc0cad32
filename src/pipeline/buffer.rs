//! Latest-frame slots shared between the capture loop and HTTP readers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::capture::{ColorFrame, DepthFrame};

/// Holds the current color and depth frame.
///
/// Frames are immutable and published behind an `Arc`, so a swap replaces the
/// whole frame at once: readers see either the previous or the next frame,
/// and a snapshot they hold is never touched by later publishes. Neither side
/// takes a lock.
#[derive(Default)]
pub struct FrameBuffer {
    color: ArcSwapOption<ColorFrame>,
    depth: ArcSwapOption<DepthFrame>,
    publishes: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slots that have a new frame; `None` keeps the current one.
    /// Called only by the capture loop.
    pub fn publish(&self, color: Option<ColorFrame>, depth: Option<DepthFrame>) {
        if let Some(frame) = color {
            self.color.store(Some(Arc::new(frame)));
        }
        if let Some(frame) = depth {
            self.depth.store(Some(Arc::new(frame)));
        }
        self.publishes.fetch_add(1, Ordering::Release);
    }

    /// Snapshot of the current color frame, `None` before the first publish.
    pub fn read_color(&self) -> Option<Arc<ColorFrame>> {
        self.color.load_full()
    }

    /// Snapshot of the current depth frame, `None` before the first publish.
    pub fn read_depth(&self) -> Option<Arc<DepthFrame>> {
        self.depth.load_full()
    }

    pub fn has_color(&self) -> bool {
        self.color.load().is_some()
    }

    /// Number of `publish` calls so far.
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(seq: u64) -> ColorFrame {
        ColorFrame::new(seq, 2, 2, vec![seq as u8; 12]).unwrap()
    }

    fn depth(seq: u64) -> DepthFrame {
        DepthFrame::new(seq, 2, 2, vec![seq as u16; 4]).unwrap()
    }

    #[test]
    fn empty_before_first_publish() {
        let buffer = FrameBuffer::new();
        assert!(buffer.read_color().is_none());
        assert!(buffer.read_depth().is_none());
        assert_eq!(buffer.publish_count(), 0);
    }

    #[test]
    fn absent_slot_keeps_previous_frame() {
        let buffer = FrameBuffer::new();
        buffer.publish(Some(color(1)), Some(depth(1)));
        buffer.publish(Some(color(2)), None);

        assert_eq!(buffer.read_color().unwrap().sequence(), 2);
        assert_eq!(buffer.read_depth().unwrap().sequence(), 1);
        assert_eq!(buffer.publish_count(), 2);
    }

    #[test]
    fn snapshot_survives_later_publish() {
        let buffer = FrameBuffer::new();
        buffer.publish(Some(color(3)), None);
        let held = buffer.read_color().unwrap();
        buffer.publish(Some(color(4)), None);

        assert_eq!(held.sequence(), 3);
        assert!(held.data().iter().all(|&b| b == 3));
        assert_eq!(buffer.read_color().unwrap().sequence(), 4);
    }
}
