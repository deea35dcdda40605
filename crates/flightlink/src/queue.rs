use async_channel::{Receiver, Sender, unbounded};
use flightlink_common::Request;
use tracing::{error, trace};

use crate::cancel::StopToken;

/// FIFO of pending `set` requests.
///
/// Any number of callers may [`push`](CommandQueue::push) concurrently; the
/// command loop is the only consumer. An empty queue parks the consumer
/// instead of spinning.
#[derive(Debug)]
pub struct CommandQueue {
    sender: Sender<Request>,
    receiver: Receiver<Request>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Appends a request to the back of the queue.
    pub fn push(&self, request: Request) {
        trace!("Queueing `{}`", request);
        // The queue owns both ends, so the channel can never be closed here.
        if let Err(err) = self.sender.try_send(request) {
            error!("Could not queue command: {}", err);
        }
    }

    /// Removes the oldest request without waiting.
    pub fn try_pop(&self) -> Option<Request> {
        self.receiver.try_recv().ok()
    }

    /// Waits for the oldest request. Returns `None` once `stop` is cancelled.
    pub async fn pop(&self, stop: &StopToken) -> Option<Request> {
        stop.run_until_cancelled(self.receiver.recv())
            .await
            .and_then(Result::ok)
    }

    /// Drops every pending request and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
