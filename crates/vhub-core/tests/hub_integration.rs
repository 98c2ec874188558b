//! Integration tests for the notification hub.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use vhub_core::session::{self, Inbound, Outbound};
use vhub_core::{Admission, Connection, EvictReason, Hub, HubConfig, PumpConfig, UserId};
use vhub_proto::{ControlFrame, EnvelopeKind, OwnedEnvelope};

struct TestContext {
    hub: Hub,
    shutdown: broadcast::Sender<()>,
    coordinator: JoinHandle<()>,
}

impl TestContext {
    fn new(outbox_capacity: usize) -> Self {
        let (shutdown, rx) = broadcast::channel(1);
        let (hub, coordinator) =
            Hub::spawn(HubConfig::new().with_outbox_capacity(outbox_capacity), rx);
        Self {
            hub,
            shutdown,
            coordinator,
        }
    }

    async fn admit(&self, user: i64) -> Admission {
        self.hub
            .register(UserId(user), format!("10.0.0.{user}:4000"))
            .await
            .unwrap()
    }

    /// Admit a client whose session runs over in-memory channels.
    async fn client(&self, user: i64) -> Client {
        let admission = self.admit(user).await;
        let connection = admission.connection.clone();

        let (inbound, stream) = mpsc::unbounded();
        let (sink, outbound) = mpsc::unbounded();
        let config = PumpConfig::new()
            .with_write_timeout(Duration::from_millis(500))
            .without_ping();
        let session = tokio::spawn(session::run(
            self.hub.clone(),
            admission,
            stream,
            sink,
            config,
        ));

        Client {
            inbound,
            outbound,
            connection,
            session,
        }
    }
}

struct Client {
    inbound: mpsc::UnboundedSender<Result<Inbound, Infallible>>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    connection: Arc<Connection>,
    session: JoinHandle<()>,
}

impl Client {
    fn send(&self, frame: ControlFrame) {
        let text = frame.encode().unwrap();
        self.inbound.unbounded_send(Ok(Inbound::Text(text))).unwrap();
    }

    fn subscribe(&self, topic: &str) {
        self.send(ControlFrame::Subscribe {
            topic: topic.to_string(),
        });
    }

    fn unsubscribe(&self, topic: &str) {
        self.send(ControlFrame::Unsubscribe {
            topic: topic.to_string(),
        });
    }

    async fn recv(&mut self) -> Option<OwnedEnvelope> {
        let next = tokio::time::timeout(Duration::from_secs(2), self.outbound.next())
            .await
            .expect("timed out waiting for a frame");
        match next {
            Some(Outbound::Text(frame)) => Some(OwnedEnvelope::decode(&frame).unwrap()),
            Some(other) => panic!("unexpected frame {other:?}"),
            None => None,
        }
    }

    async fn assert_silent(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.outbound.next()).await;
        assert!(next.is_err(), "unexpected frame {next:?}");
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_single_subscriber_receives_envelope() {
    let ctx = TestContext::new(256);
    let mut client = ctx.client(1).await;

    client.subscribe("event:42");
    eventually(|| ctx.hub.subscriber_count("event:42") == 1).await;

    let report = ctx
        .hub
        .publish("event:42", &json!({"volunteer_id": 7}))
        .unwrap();
    assert_eq!(report.delivered, 1);

    let envelope = client.recv().await.unwrap();
    assert_eq!(envelope.kind, EnvelopeKind::Update);
    assert_eq!(envelope.topic, "event:42");
    assert_eq!(envelope.payload, json!({"volunteer_id": 7}));
    client.assert_silent().await;
}

#[tokio::test]
async fn test_two_subscribers_each_get_one_copy() {
    let ctx = TestContext::new(256);
    let mut a = ctx.client(1).await;
    let mut b = ctx.client(2).await;

    a.subscribe("event:42");
    b.subscribe("event:42");
    eventually(|| ctx.hub.subscriber_count("event:42") == 2).await;

    ctx.hub.publish("event:42", "m").unwrap();

    assert_eq!(a.recv().await.unwrap().payload, json!("m"));
    assert_eq!(b.recv().await.unwrap().payload, json!("m"));
    a.assert_silent().await;
    b.assert_silent().await;
}

#[tokio::test]
async fn test_unsubscribed_client_sees_nothing() {
    let ctx = TestContext::new(256);
    let mut a = ctx.client(1).await;
    let mut b = ctx.client(2).await;

    a.subscribe("event:42");
    a.subscribe("volunteer:1");
    b.subscribe("event:42");
    eventually(|| ctx.hub.subscriber_count("event:42") == 2).await;

    a.unsubscribe("event:42");
    eventually(|| ctx.hub.subscriber_count("event:42") == 1).await;

    ctx.hub.publish("event:42", "m").unwrap();
    ctx.hub.publish("volunteer:1", "v").unwrap();

    assert_eq!(b.recv().await.unwrap().payload, json!("m"));
    let envelope = a.recv().await.unwrap();
    assert_eq!(envelope.topic, "volunteer:1");
    a.assert_silent().await;
}

#[tokio::test]
async fn test_slow_reader_is_evicted_fast_reader_keeps_up() {
    let ctx = TestContext::new(256);

    // A never drains its outbox; no session is attached.
    let a = ctx.admit(1).await;
    let mut b = ctx.admit(2).await;
    ctx.hub.subscribe(&a.connection, "event:1");
    ctx.hub.subscribe(&a.connection, "volunteer:1");
    ctx.hub.subscribe(&b.connection, "event:1");

    let mut evicted = 0;
    for i in 0..300 {
        let report = ctx.hub.publish("event:1", &json!({"seq": i})).unwrap();
        evicted += report.evicted;

        let envelope = OwnedEnvelope::decode(&b.outbox.try_recv().unwrap()).unwrap();
        assert_eq!(envelope.payload, json!({"seq": i}));
    }

    assert_eq!(evicted, 1);
    assert!(!ctx.hub.is_registered(a.connection.id()));
    assert!(ctx.hub.is_registered(b.connection.id()));
    assert_eq!(ctx.hub.subscriber_count("event:1"), 1);
    assert_eq!(ctx.hub.subscriber_count("volunteer:1"), 0);
    assert!(!a.connection.is_open());

    // The evicted outbox holds what was queued before eviction, then closes.
    let mut outbox = a.outbox;
    let mut buffered = 0;
    while outbox.recv().await.is_some() {
        buffered += 1;
    }
    assert_eq!(buffered, 256);
}

#[tokio::test]
async fn test_evicted_session_terminates() {
    let ctx = TestContext::new(256);
    let client = ctx.client(1).await;

    client.subscribe("event:1");
    eventually(|| ctx.hub.subscriber_count("event:1") == 1).await;

    assert!(
        ctx.hub
            .unregister(client.connection.id(), EvictReason::Disconnected)
            .await
    );

    tokio::time::timeout(Duration::from_secs(2), client.session)
        .await
        .expect("session did not stop")
        .unwrap();
    assert_eq!(ctx.hub.stats().connections, 0);
    assert_eq!(ctx.hub.stats().topics, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_and_churn() {
    let ctx = TestContext::new(4096);
    let topics = ["event:1", "event:2", "event:3", "volunteer:1"];

    let mut clients = Vec::new();
    for user in 0..8 {
        clients.push(ctx.client(user).await);
    }

    let mut tasks = Vec::new();
    for worker in 0..4usize {
        let hub = ctx.hub.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..500usize {
                let topic = topics[(i + worker) % topics.len()];
                hub.publish(topic, &json!({"worker": worker, "i": i}))
                    .unwrap();
                if i % 25 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    let mut expected = vec![BTreeSet::new(); clients.len()];
    for round in 0..20usize {
        for (n, client) in clients.iter().enumerate() {
            let topic = topics[(round + n) % topics.len()];
            if round % 3 == 2 {
                client.unsubscribe(topic);
                expected[n].remove(topic);
            } else {
                client.subscribe(topic);
                expected[n].insert(topic);
            }
        }
        tokio::task::yield_now().await;
    }

    for task in tasks {
        task.await.unwrap();
    }

    // Each session applies its control frames in order.
    let expected: Vec<Vec<String>> = expected
        .into_iter()
        .map(|set| set.into_iter().map(String::from).collect())
        .collect();
    eventually(|| {
        clients
            .iter()
            .zip(&expected)
            .all(|(client, topics)| client.connection.topics() == *topics)
    })
    .await;

    let stats = ctx.hub.stats();
    assert_eq!(stats.connections, 8);
    assert_eq!(
        stats.subscriptions,
        expected.iter().map(Vec::len).sum::<usize>()
    );
    for topic in topics {
        let members = expected
            .iter()
            .filter(|set| set.iter().any(|t| t == topic))
            .count();
        assert_eq!(ctx.hub.subscriber_count(topic), members, "{topic}");
    }
    for client in &clients {
        assert!(client.connection.is_open());
    }
}

#[tokio::test]
async fn test_shutdown_terminates_all_sessions() {
    let ctx = TestContext::new(256);

    let mut clients = Vec::new();
    for user in 0..5 {
        let client = ctx.client(user).await;
        client.subscribe("event:1");
        clients.push(client);
    }
    eventually(|| ctx.hub.subscriber_count("event:1") == 5).await;

    ctx.shutdown.send(()).unwrap();

    for client in clients {
        tokio::time::timeout(Duration::from_secs(2), client.session)
            .await
            .expect("session outlived shutdown")
            .unwrap();
        assert!(!client.connection.is_open());
    }

    tokio::time::timeout(Duration::from_secs(1), ctx.coordinator)
        .await
        .expect("coordinator outlived shutdown")
        .unwrap();
    assert!(ctx.hub.publish("event:1", "late").is_err());
}
