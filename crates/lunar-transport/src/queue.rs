//! Inbound queue for frames that are not responses.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

/// FIFO with an end-of-stream marker, consumed by a single reader.
#[derive(Default)]
pub(crate) struct InboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<Value>,
    ended: bool,
}

impl InboundQueue {
    /// Appends a frame. Ignored once the queue has ended.
    pub(crate) fn push(&self, frame: Value) -> bool {
        {
            let mut state = self.state.lock();
            if state.ended {
                return false;
            }
            state.frames.push_back(frame);
        }
        self.notify.notify_one();
        true
    }

    /// Discards queued frames and marks the end of the stream.
    /// Returns the number of frames discarded.
    pub(crate) fn close(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = state.frames.len();
            state.frames.clear();
            state.ended = true;
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Marks the end of the stream after the queued frames.
    pub(crate) fn finish(&self) {
        self.state.lock().ended = true;
        self.notify.notify_one();
    }

    /// Next frame, or `None` once ended and drained.
    pub(crate) async fn pop(&self) -> Option<Value> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.ended {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().frames.len()
    }
}
