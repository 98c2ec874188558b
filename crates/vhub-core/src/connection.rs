//! Admitted connections and their lifecycle state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

/// A serialized envelope, shared by every outbox it is enqueued on.
pub type Frame = Arc<str>;

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw sequence number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Verified identity of the principal owning a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Unregistered: a pump failed, the hub dropped every subscription
    /// (eviction, explicit unregister) or the hub is shutting down.
    Closing,
    /// Both pumps have exited.
    Closed,
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Queued,
    Full,
    Closed,
}

/// One admitted bidirectional stream.
///
/// The outbox sender lives here so the hub can close it explicitly; the
/// receiving half belongs to the connection's write pump.
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    remote: String,
    opened_at: Instant,
    outbox: Mutex<Option<mpsc::Sender<Frame>>>,
    topics: Mutex<HashSet<String>>,
    state: watch::Sender<ConnectionState>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        user_id: UserId,
        remote: String,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (state, _) = watch::channel(ConnectionState::Open);

        let connection = Arc::new(Self {
            id,
            user_id,
            remote,
            opened_at: Instant::now(),
            outbox: Mutex::new(Some(tx)),
            topics: Mutex::new(HashSet::new()),
            state,
        });

        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Human-readable identifier for logs: `<remote>#<seq>`.
    pub fn label(&self) -> String {
        format!("{}{}", self.remote, self.id)
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Local membership check. The hub's topic index remains the source of
    /// truth for fan-out.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.lock().contains(topic)
    }

    /// Snapshot of subscribed topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Resolves once the connection has left `Open`.
    pub async fn closing(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|state| *state != ConnectionState::Open).await;
    }

    pub(crate) fn try_enqueue(&self, frame: Frame) -> Enqueue {
        let outbox = self.outbox.lock();
        let Some(tx) = outbox.as_ref() else {
            return Enqueue::Closed;
        };

        match tx.try_send(frame) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Drop the outbox sender. Returns `false` if it was already closed.
    pub(crate) fn close_outbox(&self) -> bool {
        self.outbox.lock().take().is_some()
    }

    /// `Open -> Closing`. Returns `false` if the connection already left `Open`.
    pub(crate) fn begin_closing(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        })
    }

    /// Terminal transition, taken once both pumps have exited.
    pub(crate) fn mark_closed(&self) {
        self.state.send_replace(ConnectionState::Closed);
    }

    pub(crate) fn insert_topic(&self, topic: &str) -> bool {
        let mut topics = self.topics.lock();
        if topics.contains(topic) {
            return false;
        }
        topics.insert(topic.to_string())
    }

    pub(crate) fn remove_topic(&self, topic: &str) -> bool {
        self.topics.lock().remove(topic)
    }

    pub(crate) fn take_topics(&self) -> HashSet<String> {
        std::mem::take(&mut *self.topics.lock())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}
