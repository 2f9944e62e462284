//! Delivery targets for session events.

use std::io::{self, Result as IoResult};
use std::sync::Arc;

use parking_lot::Mutex;

use super::events::SessionEvent;

/// Abstraction over a connected client transport.
///
/// A sink is attached when a client joins and replaced wholesale on
/// reconnect; the orchestrator treats delivery failure as a disconnect.
pub trait SessionSink: Send + Sync {
    fn deliver(&mut self, event: &SessionEvent) -> IoResult<()>;
}

/// In-memory sink capturing everything for assertions in tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<SessionEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every delivered event.
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl SessionSink for MemorySink {
    fn deliver(&mut self, event: &SessionEvent) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards events into a flume channel, e.g. toward a websocket writer task.
pub struct ChannelSink {
    tx: flume::Sender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<SessionEvent>) -> Self {
        Self { tx }
    }
}

impl SessionSink for ChannelSink {
    fn deliver(&mut self, event: &SessionEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event receiver dropped"))
    }
}
