//! The notification hub: connection registry, topic index and fan-out.
//!
//! Structural changes to the registry (register/unregister) are serialized
//! through a single coordinating task, [`HubRunner`]. Publishing and topic
//! membership changes take the hub lock directly so that `publish` can be
//! called synchronously from any task without waiting on the coordinator.
//! Both paths mutate the same [`HubState`] under the same mutex, so the
//! registry and index never diverge; only the relative order of a publish and
//! a concurrent subscribe to the same topic is left undefined.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use vhub_proto::Envelope;

use crate::config::HubConfig;
use crate::connection::{Connection, ConnectionId, Enqueue, Frame, UserId};
use crate::error::{HubError, Result};
use crate::topic::TopicIndex;

/// A registered connection together with the receiving half of its outbox.
#[derive(Debug)]
pub struct Admission {
    pub connection: Arc<Connection>,
    pub outbox: mpsc::Receiver<Frame>,
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// The peer closed the stream.
    Disconnected,
    /// Reading from the network failed.
    ReadFailed,
    /// Writing to the network failed or timed out.
    WriteFailed,
    /// The peer stayed silent past the keepalive deadline.
    Timeout,
    /// The outbox was full when a message was published.
    Backpressure,
    /// The hub is shutting down.
    Shutdown,
}

impl EvictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictReason::Disconnected => "disconnected",
            EvictReason::ReadFailed => "read_failed",
            EvictReason::WriteFailed => "write_failed",
            EvictReason::Timeout => "timeout",
            EvictReason::Backpressure => "backpressure",
            EvictReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Outboxes the message was enqueued on.
    pub delivered: usize,
    /// Subscribers evicted because their outbox could not take the message.
    pub evicted: usize,
}

impl PublishReport {
    /// Combine the reports of several publishes.
    pub fn merge(self, other: PublishReport) -> PublishReport {
        PublishReport {
            delivered: self.delivered + other.delivered,
            evicted: self.evicted + other.evicted,
        }
    }
}

/// Point-in-time hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub topics: usize,
    pub subscriptions: usize,
}

enum Command {
    Register {
        connection: Arc<Connection>,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        id: ConnectionId,
        reason: EvictReason,
        reply: oneshot::Sender<bool>,
    },
}

/// Registry and topic index, guarded together by the hub mutex.
#[derive(Default)]
struct HubState {
    registry: HashMap<ConnectionId, Arc<Connection>>,
    index: TopicIndex,
}

impl HubState {
    /// Remove a connection from the registry and every topic it joined, then
    /// close its outbox. No-op for unknown ids.
    fn evict(&mut self, id: ConnectionId, reason: EvictReason) -> bool {
        let Some(connection) = self.registry.remove(&id) else {
            return false;
        };

        let topics = connection.take_topics();
        for topic in &topics {
            self.index.remove(topic, id);
        }
        connection.close_outbox();
        connection.begin_closing();

        if reason == EvictReason::Backpressure {
            warn!(
                connection = %connection.label(),
                user_id = %connection.user_id(),
                topics = topics.len(),
                "evicting slow subscriber"
            );
        } else {
            debug!(
                connection = %connection.label(),
                user_id = %connection.user_id(),
                %reason,
                topics = topics.len(),
                "connection unregistered"
            );
        }

        true
    }
}

struct Shared {
    state: Mutex<HubState>,
    stopped: AtomicBool,
    next_id: AtomicU64,
    config: HubConfig,
}

/// Cloneable handle to the notification hub.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Hub {
    /// Create a hub and the coordinator that must be driven for it to admit
    /// connections.
    pub fn new(config: HubConfig) -> (Hub, HubRunner) {
        let shared = Arc::new(Shared {
            state: Mutex::new(HubState::default()),
            stopped: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            config,
        });
        let (commands, rx) = mpsc::unbounded_channel();

        let hub = Hub {
            shared: shared.clone(),
            commands,
        };
        let runner = HubRunner {
            shared,
            commands: rx,
        };

        (hub, runner)
    }

    /// Create a hub and spawn its coordinator on the current runtime.
    pub fn spawn(config: HubConfig, shutdown: broadcast::Receiver<()>) -> (Hub, JoinHandle<()>) {
        let (hub, runner) = Hub::new(config);
        let handle = tokio::spawn(runner.run_until_shutdown(shutdown));
        (hub, handle)
    }

    /// Configuration the hub was built with.
    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// Whether shutdown has begun.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Admit a new connection for an already-authenticated user.
    ///
    /// Returns once the coordinator has added the connection to the registry.
    pub async fn register(&self, user_id: UserId, remote: impl Into<String>) -> Result<Admission> {
        if self.is_stopped() {
            return Err(HubError::Stopped);
        }

        let id = ConnectionId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (connection, outbox) = Connection::new(
            id,
            user_id,
            remote.into(),
            self.shared.config.outbox_capacity(),
        );

        let (reply, admitted) = oneshot::channel();
        self.commands
            .send(Command::Register {
                connection: connection.clone(),
                reply,
            })
            .map_err(|_| HubError::Stopped)?;
        admitted.await.map_err(|_| HubError::Stopped)?;

        debug!(
            connection = %connection.label(),
            %user_id,
            "connection registered"
        );

        Ok(Admission { connection, outbox })
    }

    /// Remove a connection from the registry and all topics and close its
    /// outbox.
    ///
    /// Returns `true` if this call removed it; repeated calls are no-ops.
    pub async fn unregister(&self, id: ConnectionId, reason: EvictReason) -> bool {
        let (reply, done) = oneshot::channel();
        if self
            .commands
            .send(Command::Unregister { id, reason, reply })
            .is_err()
        {
            // Coordinator gone: shutdown has already closed every connection.
            return false;
        }
        done.await.unwrap_or(false)
    }

    /// Add `connection` to `topic`.
    ///
    /// Returns `false` if it was already subscribed or is no longer registered.
    pub fn subscribe(&self, connection: &Connection, topic: &str) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        if !state.registry.contains_key(&connection.id()) {
            return false;
        }
        if !connection.insert_topic(topic) {
            return false;
        }
        state.index.insert(topic, connection.id());

        debug!(connection = %connection.label(), topic, "subscribed");
        true
    }

    /// Remove `connection` from `topic`.
    ///
    /// Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, connection: &Connection, topic: &str) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        if !connection.remove_topic(topic) {
            return false;
        }
        state.index.remove(topic, connection.id());

        debug!(connection = %connection.label(), topic, "unsubscribed");
        true
    }

    /// Publish `payload` to every current subscriber of `topic`.
    ///
    /// The envelope is serialized once and enqueued without blocking. A
    /// subscriber whose outbox is full is evicted; that is reported in the
    /// returned [`PublishReport`], never as an error.
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) -> Result<PublishReport> {
        if self.is_stopped() {
            return Err(HubError::Stopped);
        }

        let frame: Frame = Envelope::update(topic, payload).encode()?.into();
        let mut report = PublishReport::default();

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let mut lagging = Vec::new();
        if let Some(subscribers) = state.index.subscribers(topic) {
            for id in subscribers {
                let Some(connection) = state.registry.get(id) else {
                    continue;
                };
                match connection.try_enqueue(frame.clone()) {
                    Enqueue::Queued => report.delivered += 1,
                    Enqueue::Full => lagging.push((*id, EvictReason::Backpressure)),
                    Enqueue::Closed => lagging.push((*id, EvictReason::Disconnected)),
                }
            }
        }

        for (id, reason) in lagging {
            if state.evict(id, reason) {
                report.evicted += 1;
            }
        }

        trace!(
            topic,
            delivered = report.delivered,
            evicted = report.evicted,
            "published update"
        );

        Ok(report)
    }

    pub fn stats(&self) -> HubStats {
        let state = self.shared.state.lock();
        HubStats {
            connections: state.registry.len(),
            topics: state.index.topic_count(),
            subscriptions: state.index.subscription_count(),
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.state.lock().index.subscriber_count(topic)
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.shared.state.lock().registry.contains_key(&id)
    }

    /// Panics if the registry, the topic index and the connections' own topic
    /// sets disagree.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let state = self.shared.state.lock();

        for (topic, subscribers) in state.index.iter() {
            assert!(!subscribers.is_empty(), "empty topic {topic} kept in index");
            for id in subscribers {
                let connection = state
                    .registry
                    .get(id)
                    .unwrap_or_else(|| panic!("{topic} references unregistered {id}"));
                assert!(connection.is_subscribed(topic));
                assert!(connection.is_open());
            }
        }

        for (id, connection) in &state.registry {
            for topic in connection.topics() {
                let indexed = state
                    .index
                    .subscribers(&topic)
                    .is_some_and(|subscribers| subscribers.contains(id));
                assert!(indexed, "{id} believes it is in {topic}");
            }
        }
    }
}

/// The hub's coordinating task.
///
/// Serializes register/unregister and, on shutdown, closes every registered
/// connection so no write pump is left waiting on an outbox nobody feeds.
pub struct HubRunner {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl HubRunner {
    /// Run until the shutdown signal fires or every hub handle is dropped.
    pub async fn run_until_shutdown(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            outbox_capacity = self.shared.config.outbox_capacity(),
            "notification hub started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("notification hub received shutdown signal");
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("all hub handles dropped");
                        break;
                    }
                },
            }
        }

        self.shutdown();
    }

    fn handle(&self, command: Command) {
        match command {
            Command::Register { connection, reply } => {
                let id = connection.id();
                self.shared.state.lock().registry.insert(id, connection);

                if reply.send(()).is_err() {
                    // The registering task went away before admission finished.
                    self.shared
                        .state
                        .lock()
                        .evict(id, EvictReason::Disconnected);
                }
            }
            Command::Unregister { id, reason, reply } => {
                let removed = self.shared.state.lock().evict(id, reason);
                let _ = reply.send(removed);
            }
        }
    }

    fn shutdown(mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.commands.close();

        let evicted = {
            let mut state = self.shared.state.lock();
            let ids: Vec<ConnectionId> = state.registry.keys().copied().collect();
            let evicted = ids
                .into_iter()
                .filter(|id| state.evict(*id, EvictReason::Shutdown))
                .count();
            state.index.clear();
            evicted
        };

        // Registrations that raced with shutdown are refused.
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Register { connection, .. } => {
                    connection.close_outbox();
                    connection.begin_closing();
                }
                Command::Unregister { reply, .. } => {
                    let _ = reply.send(false);
                }
            }
        }

        info!(evicted, "notification hub stopped");
    }
}
