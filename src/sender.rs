//! Per-peer outbound message senders.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::trace;

use crate::common::PeerId;
use crate::{Error, Result};

/// Outbound stream state towards one peer.
///
/// Guarded by its own lock, independent of the routing table lock, since
/// writes can block on a slow stream for a long time.
#[derive(Debug)]
pub struct MessageSender {
    peer: PeerId,
    state: Mutex<SenderState>,
}

struct SenderState {
    stream: Option<Box<dyn Write + Send>>,
    invalid: bool,
    sent: u64,
}

impl std::fmt::Debug for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderState")
            .field("stream", &self.stream.is_some())
            .field("invalid", &self.invalid)
            .field("sent", &self.sent)
            .finish()
    }
}

impl MessageSender {
    pub fn new(peer: PeerId) -> Self {
        MessageSender {
            peer,
            state: Mutex::new(SenderState {
                stream: None,
                invalid: false,
                sent: 0,
            }),
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Attach an open stream, replacing any previous one.
    pub fn attach(&self, stream: Box<dyn Write + Send>) -> Result<()> {
        let mut state = self.lock();

        if state.invalid {
            return Err(Error::SenderInvalid(self.peer));
        }

        state.stream = Some(stream);

        Ok(())
    }

    /// Write a message on the attached stream.
    ///
    /// Fails with [Error::SenderInvalid] once invalidated, and with an
    /// [Error::Io] if no stream is attached or the write fails, in which case
    /// the stream is dropped.
    pub fn send(&self, message: Bytes) -> Result<()> {
        let mut state = self.lock();

        if state.invalid {
            return Err(Error::SenderInvalid(self.peer));
        }

        let stream = state.stream.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "no stream attached")
        })?;

        let written = stream.write_all(&message).and_then(|_| stream.flush());

        if let Err(error) = written {
            state.stream = None;
            return Err(error.into());
        }

        state.sent += 1;

        Ok(())
    }

    /// Drop the stream and refuse all further use of this sender.
    ///
    /// Waits for any in-flight [MessageSender::send] to finish first.
    pub fn invalidate(&self) {
        let mut state = self.lock();

        state.invalid = true;
        state.stream = None;

        trace!(peer = %self.peer, sent = state.sent, "Invalidated message sender");
    }

    pub fn is_invalid(&self) -> bool {
        self.lock().invalid
    }

    /// Number of messages written successfully.
    pub fn sent(&self) -> u64 {
        self.lock().sent
    }

    fn lock(&self) -> MutexGuard<'_, SenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Map of live [MessageSender]s, one per peer.
#[derive(Debug, Default)]
pub struct MessageSenders {
    senders: Mutex<HashMap<PeerId, Arc<MessageSender>>>,
}

impl MessageSenders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sender for `peer`, creating it if needed.
    pub fn get_or_create(&self, peer: PeerId) -> Arc<MessageSender> {
        self.lock()
            .entry(peer)
            .or_insert_with(|| Arc::new(MessageSender::new(peer)))
            .clone()
    }

    pub fn get(&self, peer: &PeerId) -> Option<Arc<MessageSender>> {
        self.lock().get(peer).cloned()
    }

    /// Remove the sender of `peer` from the map, without invalidating it.
    pub fn remove(&self, peer: &PeerId) -> Option<Arc<MessageSender>> {
        self.lock().remove(peer)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, Arc<MessageSender>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenStream;

    impl Write for BrokenStream {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_and_invalidate() {
        let sender = MessageSender::new(PeerId::random());
        let buffer = SharedBuffer::default();

        sender.attach(Box::new(buffer.clone())).unwrap();
        sender.send(Bytes::from_static(b"ping")).unwrap();

        assert_eq!(buffer.0.lock().unwrap().as_slice(), b"ping");
        assert_eq!(sender.sent(), 1);

        sender.invalidate();

        assert!(sender.is_invalid());
        assert!(matches!(
            sender.send(Bytes::from_static(b"ping")),
            Err(Error::SenderInvalid(_))
        ));
        assert!(matches!(
            sender.attach(Box::new(buffer)),
            Err(Error::SenderInvalid(_))
        ));
    }

    #[test]
    fn send_without_stream() {
        let sender = MessageSender::new(PeerId::random());

        assert!(matches!(
            sender.send(Bytes::from_static(b"ping")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn failed_write_drops_stream() {
        let sender = MessageSender::new(PeerId::random());

        sender.attach(Box::new(BrokenStream)).unwrap();

        assert!(matches!(
            sender.send(Bytes::from_static(b"ping")),
            Err(Error::Io(_))
        ));
        // Stream was dropped, not invalidated.
        assert!(!sender.is_invalid());
        assert_eq!(sender.sent(), 0);
    }

    #[test]
    fn map_get_or_create() {
        let senders = MessageSenders::new();
        let peer = PeerId::random();

        let a = senders.get_or_create(peer);
        let b = senders.get_or_create(peer);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(senders.len(), 1);

        assert!(senders.remove(&peer).is_some());
        assert!(senders.remove(&peer).is_none());
        assert!(senders.is_empty());
    }
}
