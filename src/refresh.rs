//! Single slot routing table refresh trigger.

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};

/// Create a connected [RefreshTrigger] and [RefreshRequests] pair.
pub fn refresh_trigger() -> (RefreshTrigger, RefreshRequests) {
    let (sender, receiver) = flume::bounded(1);

    (RefreshTrigger { sender }, RefreshRequests { receiver })
}

/// Requesting side of the trigger.
///
/// At most one request is ever pending, requests made while one is
/// pending are dropped.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    sender: Sender<()>,
}

impl RefreshTrigger {
    /// Request a refresh without blocking.
    ///
    /// Returns `true` if this call enqueued a new request.
    pub fn request(&self) -> bool {
        match self.sender.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Receiving side of the trigger, consumed by the node's refresh routine.
#[derive(Debug, Clone)]
pub struct RefreshRequests {
    receiver: Receiver<()>,
}

impl RefreshRequests {
    /// Returns `true` if a request is waiting.
    pub fn is_pending(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Take the pending request, if any.
    pub fn try_take(&self) -> bool {
        self.receiver.try_recv().is_ok()
    }

    /// Wait up to `timeout` for a request.
    ///
    /// Returns `false` on timeout, or if every [RefreshTrigger] was dropped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Wait for the next request.
    ///
    /// Returns `false` once every [RefreshTrigger] was dropped.
    pub fn wait(&self) -> bool {
        self.receiver.recv().is_ok()
    }

    #[cfg(feature = "async")]
    /// Async version of [RefreshRequests::wait].
    pub async fn recv_async(&self) -> bool {
        self.receiver.recv_async().await.is_ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let (trigger, requests) = refresh_trigger();

        assert!(!requests.is_pending());

        assert!(trigger.request());
        assert!(!trigger.request());
        assert!(!trigger.clone().request());

        assert!(requests.is_pending());
        assert!(requests.try_take());
        assert!(!requests.try_take());

        assert!(trigger.request());
    }

    #[test]
    fn dropped_requests_side() {
        let (trigger, requests) = refresh_trigger();
        drop(requests);

        assert!(!trigger.request());
    }

    #[test]
    fn wait_timeout() {
        let (trigger, requests) = refresh_trigger();

        assert!(!requests.wait_timeout(Duration::from_millis(5)));

        trigger.request();
        assert!(requests.wait_timeout(Duration::from_millis(5)));

        drop(trigger);
        assert!(!requests.wait());
    }

    #[cfg(feature = "async")]
    #[test]
    fn recv_async() {
        let (trigger, requests) = refresh_trigger();

        trigger.request();

        assert!(futures::executor::block_on(requests.recv_async()));
    }
}
