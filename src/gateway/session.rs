//! Per-session bounded outbound queue (§4.E, §5): drop-oldest-non-snapshot
//! overflow policy, slow-consumer close on sustained overflow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::protocol::ServerEvent;

const SUSTAINED_OVERFLOW_WINDOW: Duration = Duration::from_secs(5);

/// A frame queued for delivery. `Protected` frames (connect/subscribe acks,
/// errors, and initial subscribe snapshots) are never dropped under
/// backpressure; `Droppable` frames are the live updates the overflow policy
/// may discard.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Protected(ServerEvent),
    Droppable(ServerEvent),
}

impl OutboundFrame {
    pub fn event(&self) -> &ServerEvent {
        match self {
            OutboundFrame::Protected(e) | OutboundFrame::Droppable(e) => e,
        }
    }
}

struct QueueState {
    frames: VecDeque<OutboundFrame>,
    drops_in_window: usize,
    window_start: Instant,
}

pub struct SessionQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
}

impl SessionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.max(1)),
                drops_in_window: 0,
                window_start: Instant::now(),
            }),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues `frame`. Returns `true` once drops within the current 5s
    /// window have reached capacity — the caller should close the session
    /// with a "slow consumer" reason.
    pub fn push(&self, frame: OutboundFrame) -> bool {
        let mut state = self.state.lock();

        if state.frames.len() >= self.capacity {
            if let OutboundFrame::Droppable(_) = &frame {
                if let Some(pos) = state
                    .frames
                    .iter()
                    .position(|f| matches!(f, OutboundFrame::Droppable(_)))
                {
                    state.frames.remove(pos);
                }
                if state.window_start.elapsed() > SUSTAINED_OVERFLOW_WINDOW {
                    state.window_start = Instant::now();
                    state.drops_in_window = 0;
                }
                state.drops_in_window += 1;
            }
            // Protected frames grow the queue past capacity rather than being
            // dropped or evicting something else out of turn.
        }

        state.frames.push_back(frame);
        let sustained =
            state.drops_in_window >= self.capacity && state.window_start.elapsed() <= SUSTAINED_OVERFLOW_WINDOW;
        drop(state);
        self.notify.notify_one();
        sustained
    }

    /// Waits for and removes the next frame. Returns `None` once the queue
    /// has been closed and fully drained.
    pub async fn pop(&self) -> Option<OutboundFrame> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u32) -> OutboundFrame {
        OutboundFrame::Droppable(ServerEvent::Error { message: n.to_string() })
    }

    #[test]
    fn overflow_drops_oldest_droppable_frame_not_protected() {
        let queue = SessionQueue::new(2);
        queue.push(OutboundFrame::Protected(ServerEvent::Connected {
            client_id: "c1".into(),
            rooms: vec!["general".into()],
        }));
        queue.push(frame(1));
        queue.push(frame(2)); // over capacity: should evict frame(1), not the protected connect.

        let mut seen = Vec::new();
        loop {
            let mut state = queue.state.lock();
            match state.frames.pop_front() {
                Some(f) => seen.push(f),
                None => break,
            }
        }
        assert!(matches!(seen[0], OutboundFrame::Protected(_)));
        assert_eq!(seen.len(), 2, "oldest droppable frame should have been evicted");
    }

    #[tokio::test]
    async fn pop_returns_none_after_close_when_drained() {
        let queue = SessionQueue::new(4);
        queue.push(frame(1));
        assert!(queue.pop().await.is_some());
        queue.close();
        assert!(queue.pop().await.is_none());
    }

    #[test]
    fn sustained_drops_within_window_report_overflow() {
        let queue = SessionQueue::new(2);
        queue.push(frame(0));
        queue.push(frame(1));
        let mut sustained = false;
        for n in 2..10 {
            sustained = queue.push(frame(n)) || sustained;
        }
        assert!(sustained, "repeated drops within the window should trip sustained overflow");
    }
}
