//! Node lifecycle: a closing signal shared by everything the node runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use flume::{Receiver, Sender};

/// Closing signal of a node.
///
/// Nothing is ever sent on the internal channel, closing drops the sender
/// so every [Process::closing] receiver wakes up with a disconnection.
#[derive(Debug)]
pub struct Process {
    closed: AtomicBool,
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl Process {
    pub fn new() -> Self {
        let (sender, receiver) = flume::bounded(0);

        Process {
            closed: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Start shutting down. Returns `true` only for the call that closed the process.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        true
    }

    /// Returns `true` once [Process::close] was called.
    pub fn is_closing(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// A receiver that never yields a value, and disconnects when the process closes.
    pub fn closing(&self) -> Receiver<()> {
        self.receiver.clone()
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use flume::RecvTimeoutError;

    use super::*;

    #[test]
    fn close_is_idempotent() {
        let process = Process::new();

        assert!(!process.is_closing());
        assert!(process.close());
        assert!(!process.close());
        assert!(process.is_closing());
    }

    #[test]
    fn closing_wakes_waiters() {
        let process = std::sync::Arc::new(Process::new());
        let closing = process.closing();

        assert_eq!(
            closing.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );

        let clone = process.clone();
        let waiter = thread::spawn(move || clone.closing().recv().is_err());

        process.close();

        assert!(waiter.join().unwrap());
        assert!(closing.recv().is_err());
    }
}
