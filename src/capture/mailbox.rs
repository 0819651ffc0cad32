//! Single-slot hand-off between a driver-owned thread and the capture loop.
//!
//! Depositing replaces whatever is waiting (drop-oldest); draining takes the
//! slot contents out. Deposits never block, and arrivals are signalled over a
//! one-token channel so `drain_timeout` can sleep until something lands.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use flume::{bounded, Receiver, Sender};

use super::frame::{ColorFrame, DepthFrame, FramePair};

pub struct Mailbox {
    color: ArcSwapOption<ColorFrame>,
    depth: ArcSwapOption<DepthFrame>,
    arrived_tx: Sender<()>,
    arrived_rx: Receiver<()>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (arrived_tx, arrived_rx) = bounded(1);
        Self {
            color: ArcSwapOption::empty(),
            depth: ArcSwapOption::empty(),
            arrived_tx,
            arrived_rx,
        }
    }

    pub fn deposit_color(&self, frame: ColorFrame) {
        self.color.store(Some(Arc::new(frame)));
        // A pending token already covers this arrival.
        let _ = self.arrived_tx.try_send(());
    }

    pub fn deposit_depth(&self, frame: DepthFrame) {
        self.depth.store(Some(Arc::new(frame)));
        let _ = self.arrived_tx.try_send(());
    }

    /// Take whatever is waiting without blocking.
    pub fn drain(&self) -> FramePair {
        let _ = self.arrived_rx.try_recv();
        FramePair {
            color: self.color.swap(None).map(take_owned),
            depth: self.depth.swap(None).map(take_owned),
        }
    }

    /// Wait up to `timeout` for anything to arrive, then take it.
    pub fn drain_timeout(&self, timeout: Duration) -> FramePair {
        let deadline = Instant::now() + timeout;
        loop {
            let pair = self.drain();
            if !pair.is_empty() {
                return pair;
            }
            // A token left over from an earlier drain wakes us with empty
            // slots; go round again until the deadline.
            if self.arrived_rx.recv_deadline(deadline).is_err() {
                return self.drain();
            }
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Slots are only ever swapped out, so the `Arc` is normally unique.
fn take_owned<T: Clone>(frame: Arc<T>) -> T {
    Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn color(seq: u64) -> ColorFrame {
        ColorFrame::new(seq, 1, 1, vec![seq as u8; 3]).unwrap()
    }

    fn depth(seq: u64) -> DepthFrame {
        DepthFrame::new(seq, 1, 1, vec![seq as u16]).unwrap()
    }

    #[test]
    fn newer_deposit_replaces_older() {
        let mailbox = Mailbox::new();
        mailbox.deposit_color(color(1));
        mailbox.deposit_color(color(2));
        mailbox.deposit_depth(depth(3));

        let pair = mailbox.drain();
        assert_eq!(pair.color.map(|f| f.sequence()), Some(2));
        assert_eq!(pair.depth.map(|f| f.sequence()), Some(3));
        assert!(mailbox.drain().is_empty());
    }

    #[test]
    fn drain_timeout_returns_empty_when_nothing_arrives() {
        let mailbox = Mailbox::new();
        let start = Instant::now();
        let pair = mailbox.drain_timeout(Duration::from_millis(20));
        assert!(pair.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn stale_arrival_does_not_cut_the_wait_short() {
        let mailbox = Mailbox::new();
        mailbox.deposit_color(color(1));
        mailbox.deposit_color(color(2));
        assert!(mailbox.drain().color.is_some());

        // The second deposit's token may still be queued.
        let _ = mailbox.arrived_tx.try_send(());
        let start = Instant::now();
        assert!(mailbox.drain_timeout(Duration::from_millis(20)).is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn drain_timeout_wakes_on_deposit() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = mailbox.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.deposit_color(color(5));
        });

        let start = Instant::now();
        let pair = mailbox.drain_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(pair.color.map(|f| f.sequence()), Some(5));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
