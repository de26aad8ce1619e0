//! Periodic snapshot delivery to streaming clients.
//!
//! Every [`Subscription`] is backed by one [`ClientConnection`] and one
//! driver task. The driver ticks on its own timer, asks the shared
//! [`SnapshotSource`] for a snapshot and pushes the serialized JSON to the
//! client, until the client goes away or the connection is closed.

mod connection;

pub use connection::{
    ClientConnection, ClientConnectionRef, ConnectionId, ConnectionState, PublishError,
};

use common::util::time::format_duration;
use dashmap::DashMap;
use futures::stream::{self, Stream};
use metrics::SnapshotSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};
use typed_builder::TypedBuilder;

/// Payloads buffered per connection before the driver waits on the client.
const CHANNEL_CAPACITY: usize = 4;

/// A reference-counted reference to a [`Publisher`].
pub type PublisherRef = Arc<Publisher>;

/// Receiving end of one streaming connection.
#[derive(Debug)]
pub struct Subscription {
    id: ConnectionId,
    receiver: mpsc::Receiver<String>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next serialized snapshot, or `None` once the connection is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Dropping the stream disconnects the client.
    pub fn into_stream(self) -> impl Stream<Item = String> + Send + 'static {
        stream::unfold(self.receiver, |mut receiver| async move {
            receiver.recv().await.map(|payload| (payload, receiver))
        })
    }
}

#[derive(TypedBuilder)]
pub struct Publisher {
    source: Arc<dyn SnapshotSource>,
    period: Duration,
    #[builder(default)]
    connections: DashMap<ConnectionId, ClientConnectionRef>,
    #[builder(default)]
    next_id: AtomicU64,
}

impl core::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Publisher")
            .field("period", &self.period)
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl Publisher {
    pub fn new(source: Arc<dyn SnapshotSource>, period: Duration) -> Self {
        Publisher::builder().source(source).period(period).build()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Opens a connection and starts pushing snapshots to it, the first one
    /// immediately.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let connection = Arc::new(ClientConnection::new(id, sender));

        self.connections.insert(id, connection.clone());
        info!(connection = %id, active = self.connections.len(), "Client subscribed");

        tokio::spawn(self.clone().drive(connection));

        Subscription { id, receiver }
    }

    /// Closes one connection. Returns `false` if it is unknown or already
    /// closing.
    pub fn close(&self, id: ConnectionId) -> bool {
        let connection = self.connections.get(&id).map(|entry| entry.value().clone());
        connection.map_or(false, |connection| connection.close())
    }

    /// Closes every open connection, returning how many were open.
    pub fn close_all(&self) -> usize {
        let open: Vec<ClientConnectionRef> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let closed = open.iter().filter(|connection| connection.close()).count();
        debug!(closed, "Closed all streaming connections");
        closed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[instrument(skip_all, fields(connection = %connection.id()))]
    async fn drive(self: Arc<Self>, connection: ClientConnectionRef) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = connection.closed() => break,
                _ = ticker.tick() => {}
            }

            // Dropping the snapshot future on close leaves already spawned
            // collectors running to completion.
            let snapshot = tokio::select! {
                biased;
                _ = connection.closed() => break,
                snapshot = self.source.snapshot() => snapshot,
            };

            let payload = match snapshot {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize snapshot, skipping tick");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Failed to assemble snapshot, skipping tick");
                    continue;
                }
            };

            let sent = tokio::select! {
                biased;
                _ = connection.closed() => break,
                sent = connection.send(payload) => sent,
            };

            match sent {
                Ok(()) => trace!("Pushed snapshot"),
                Err(e) => {
                    debug!(error = %e, "Stopping driver");
                    break;
                }
            }
        }

        self.release(&connection);
    }

    fn release(&self, connection: &ClientConnection) {
        connection.close();
        self.connections.remove(&connection.id());
        connection.mark_closed();

        info!(
            "Connection {} closed (lifespan: {}, active: {})",
            connection.id(),
            format_duration(connection.opened_at().elapsed()),
            self.connections.len()
        );
    }
}
