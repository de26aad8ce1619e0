use core::fmt;
use parking_lot::Mutex;
use shrinkwraprs::Shrinkwrap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::trace;

/// Unique identifier for each streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Shrinkwrap)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a streaming connection.
///
/// `Open -> Closing -> Closed`, never backwards. Payloads are only written
/// while `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Client of {0} went away")]
    Disconnected(ConnectionId),
}

/// A reference-counted reference to a [`ClientConnection`].
pub type ClientConnectionRef = Arc<ClientConnection>;

/// Server-side end of one event stream.
pub struct ClientConnection {
    id: ConnectionId,
    sender: mpsc::Sender<String>,
    state: Mutex<ConnectionState>,
    close_signal: Notify,
    opened_at: Instant,
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl ClientConnection {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<String>) -> Self {
        Self {
            id,
            sender,
            state: Mutex::new(ConnectionState::Open),
            close_signal: Notify::new(),
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Moves an open connection to `Closing` and wakes its driver.
    ///
    /// Returns `false` if the connection was already closing or closed.
    pub fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Open {
                return false;
            }
            *state = ConnectionState::Closing;
        }

        trace!(connection = %self.id, "Connection closing");
        self.close_signal.notify_one();
        true
    }

    /// Final transition, once the connection's resources are released.
    pub(crate) fn mark_closed(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }

    /// Queues `payload` for the client.
    ///
    /// A no-op once the connection is no longer open. If the client has
    /// gone away the connection is closed and [`PublishError::Disconnected`]
    /// is returned.
    pub async fn send(&self, payload: String) -> Result<(), PublishError> {
        if !self.is_open() {
            trace!(connection = %self.id, "Dropping payload for closed connection");
            return Ok(());
        }

        if self.sender.send(payload).await.is_err() {
            self.close();
            return Err(PublishError::Disconnected(self.id));
        }

        Ok(())
    }

    /// Resolves once the connection is no longer open: either [`close`] was
    /// called or the client dropped its end of the stream.
    ///
    /// [`close`]: ClientConnection::close
    pub async fn closed(&self) {
        if !self.is_open() {
            return;
        }

        tokio::select! {
            _ = self.sender.closed() => {}
            _ = self.close_signal.notified() => {}
        }
    }
}
