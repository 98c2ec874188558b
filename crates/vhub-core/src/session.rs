//! Per-connection read and write pumps.
//!
//! A session is transport-agnostic: it reads [`Inbound`] items from a
//! [`Stream`] and writes [`Outbound`] items to a [`Sink`]. The server crate
//! adapts WebSocket messages to these types.
//!
//! The write pump is the only writer to the sink. It forwards the outbox,
//! sends keepalive pings and exits as soon as the connection leaves `Open`.
//! The read pump applies control frames and enforces the inbound silence
//! limit. Whichever side fails first unregisters the connection, which wakes
//! the other side.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use vhub_proto::ControlFrame;

use crate::config::PumpConfig;
use crate::connection::{Connection, Frame};
use crate::hub::{Admission, EvictReason, Hub};

/// An item read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame, expected to hold a control frame.
    Text(String),
    /// Any frame that only proves the peer is alive (pong, ping, binary).
    Keepalive,
    /// The peer asked to close.
    Close,
}

/// An item written to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized envelope.
    Text(Frame),
    /// Keepalive ping.
    Ping,
    /// Close handshake.
    Close,
}

/// Drive one admitted connection until either pump stops.
///
/// Returns after both pumps have exited and the connection is `Closed`.
/// `config` is [normalized](PumpConfig::normalized) first.
pub async fn run<S, K, E>(hub: Hub, admission: Admission, stream: S, sink: K, config: PumpConfig)
where
    S: Stream<Item = Result<Inbound, E>> + Unpin,
    E: fmt::Display,
    K: Sink<Outbound> + Unpin + Send + 'static,
    K::Error: fmt::Display + Send,
{
    let Admission { connection, outbox } = admission;
    let config = config.normalized();

    info!(
        connection = %connection.label(),
        user_id = %connection.user_id(),
        "connection opened"
    );

    let mut writer = tokio::spawn(write_pump(
        hub.clone(),
        connection.clone(),
        outbox,
        sink,
        config.clone(),
    ));
    let reader = read_pump(&hub, &connection, stream, config.pong_wait);
    tokio::pin!(reader);

    let writer_done = tokio::select! {
        reason = &mut reader => {
            if let Some(reason) = reason {
                hub.unregister(connection.id(), reason).await;
            }
            false
        }
        joined = &mut writer => {
            if let Err(e) = joined {
                warn!(connection = %connection.label(), error = %e, "write pump aborted");
            }
            // Nothing writes to the peer any more.
            hub.unregister(connection.id(), EvictReason::WriteFailed).await;
            true
        }
    };
    // The hub may already be gone; the write pump still has to stop.
    connection.begin_closing();

    if !writer_done {
        if let Err(e) = writer.await {
            warn!(connection = %connection.label(), error = %e, "write pump aborted");
        }
    }
    connection.mark_closed();

    info!(
        connection = %connection.label(),
        duration_ms = connection.age().as_millis() as u64,
        "connection closed"
    );
}

/// Returns the eviction reason, or `None` if the connection was closed from
/// elsewhere.
async fn read_pump<S, E>(
    hub: &Hub,
    connection: &Connection,
    mut stream: S,
    pong_wait: Duration,
) -> Option<EvictReason>
where
    S: Stream<Item = Result<Inbound, E>> + Unpin,
    E: fmt::Display,
{
    let closing = connection.closing();
    tokio::pin!(closing);

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut closing => return None,
            next = time::timeout(pong_wait, stream.next()) => next,
        };

        match next {
            Err(_) => {
                debug!(
                    connection = %connection.label(),
                    pong_wait_ms = pong_wait.as_millis() as u64,
                    "peer silent past deadline"
                );
                return Some(EvictReason::Timeout);
            }
            Ok(None) | Ok(Some(Ok(Inbound::Close))) => {
                return Some(EvictReason::Disconnected);
            }
            Ok(Some(Err(e))) => {
                debug!(connection = %connection.label(), error = %e, "read failed");
                return Some(EvictReason::ReadFailed);
            }
            Ok(Some(Ok(Inbound::Keepalive))) => {}
            Ok(Some(Ok(Inbound::Text(text)))) => apply_control(hub, connection, &text),
        }
    }
}

fn apply_control(hub: &Hub, connection: &Connection, text: &str) {
    let frame = match ControlFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection = %connection.label(), error = %e, "ignoring malformed control frame");
            return;
        }
    };

    if frame.topic().is_empty() {
        debug!(connection = %connection.label(), "ignoring control frame without topic");
        return;
    }

    match frame {
        ControlFrame::Subscribe { topic } => {
            hub.subscribe(connection, &topic);
        }
        ControlFrame::Unsubscribe { topic } => {
            hub.unsubscribe(connection, &topic);
        }
    }
}

async fn write_pump<K>(
    hub: Hub,
    connection: Arc<Connection>,
    mut outbox: mpsc::Receiver<Frame>,
    mut sink: K,
    config: PumpConfig,
) where
    K: Sink<Outbound> + Unpin,
    K::Error: fmt::Display,
{
    let closing = connection.closing();
    tokio::pin!(closing);

    let mut ping = config.ping_interval.map(|period| {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let outbound = tokio::select! {
            biased;
            _ = &mut closing => break,
            frame = outbox.recv() => match frame {
                Some(frame) => Outbound::Text(frame),
                None => break,
            },
            _ = tick(&mut ping) => Outbound::Ping,
        };

        let failed = match time::timeout(config.write_timeout, sink.send(outbound)).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(connection = %connection.label(), error = %e, "write failed");
                true
            }
            Err(_) => {
                warn!(
                    connection = %connection.label(),
                    write_timeout_ms = config.write_timeout.as_millis() as u64,
                    "write timed out"
                );
                true
            }
        };

        if failed {
            hub.unregister(connection.id(), EvictReason::WriteFailed)
                .await;
            connection.begin_closing();
            return;
        }
    }

    // Best effort: the peer may already be gone.
    let _ = time::timeout(config.write_timeout, sink.send(Outbound::Close)).await;
    let _ = time::timeout(config.write_timeout, sink.close()).await;
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
