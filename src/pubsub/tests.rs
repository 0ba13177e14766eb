use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::broker::{self, Broker, ExchangeKind, QueueInfo, SharedBroker};
use crate::pubsub::{
    AckDecision, CONTENT_TYPE_JSON, MalformedPolicy, PublishError, QueueArgs, QueueDurability,
    SubscribeOptions, TopologyError, declare_and_bind, declare_exchange, publish_json,
    subscribe_json, subscribe_json_with,
};
use crate::transport::{Channel, LocalChannel};
use crate::utils::error::TransportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    seq: u32,
    text: String,
}

fn note(seq: u32) -> Note {
    Note {
        seq,
        text: format!("note {seq}"),
    }
}

async fn setup() -> (SharedBroker, Arc<dyn Channel>) {
    let broker: SharedBroker = Arc::new(Mutex::new(Broker::new()));
    let channel: Arc<dyn Channel> = Arc::new(LocalChannel::open(broker.clone()));
    declare_exchange(channel.as_ref(), "peril_topic", ExchangeKind::Topic)
        .await
        .unwrap();
    declare_exchange(channel.as_ref(), "peril_dlx", ExchangeKind::Fanout)
        .await
        .unwrap();
    declare_and_bind(
        channel.as_ref(),
        "peril_dlx",
        "peril_dlq",
        "",
        QueueDurability::Durable,
    )
    .await
    .unwrap();
    (broker, channel)
}

fn info(broker: &SharedBroker, queue: &str) -> QueueInfo {
    broker::lock(broker).queue_info(queue).unwrap()
}

/// Polls until `check` holds for the queue's counters.
async fn wait_for(broker: &SharedBroker, queue: &str, check: impl Fn(&QueueInfo) -> bool) {
    for _ in 0..100 {
        if check(&info(broker, queue)) {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("queue '{queue}' never reached the expected state: {:?}", info(broker, queue));
}

fn dead_lettered() -> SubscribeOptions {
    SubscribeOptions {
        args: QueueArgs {
            dead_letter_exchange: Some("peril_dlx".to_string()),
        },
        ..SubscribeOptions::default()
    }
}

#[test]
fn test_durability_maps_to_queue_options() {
    let transient = QueueDurability::Transient.options(&QueueArgs::default());
    assert!(!transient.durable);
    assert!(transient.exclusive);
    assert!(transient.auto_delete);

    let args = QueueArgs {
        dead_letter_exchange: Some("peril_dlx".to_string()),
    };
    let durable = QueueDurability::Durable.options(&args);
    assert!(durable.durable);
    assert!(!durable.exclusive);
    assert!(!durable.auto_delete);
    assert_eq!(durable.dead_letter_exchange.as_deref(), Some("peril_dlx"));
}

#[tokio::test]
async fn test_declare_and_bind_twice_is_harmless() {
    let (broker, channel) = setup().await;

    let first = declare_and_bind(
        channel.as_ref(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
    )
    .await
    .unwrap();
    let second = declare_and_bind(
        channel.as_ref(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
    )
    .await
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        broker::lock(&broker).bindings("peril_topic", "war"),
        vec!["war.*".to_string()]
    );
}

#[tokio::test]
async fn test_conflicting_durability_fails_loudly() {
    let (_broker, channel) = setup().await;
    declare_and_bind(
        channel.as_ref(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
    )
    .await
    .unwrap();

    let err = declare_and_bind(
        channel.as_ref(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Transient,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        TopologyError::Declare {
            source: TransportError::PreconditionFailed(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_bind_to_missing_exchange_is_topology_error() {
    let (_broker, channel) = setup().await;
    let err = declare_and_bind(
        channel.as_ref(),
        "nowhere",
        "war",
        "war.*",
        QueueDurability::Durable,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TopologyError::Bind { .. }));
}

#[tokio::test]
async fn test_publish_json_tags_content_type() {
    let broker: SharedBroker = Arc::new(Mutex::new(Broker::new()));
    let channel = LocalChannel::open(broker.clone());
    declare_exchange(&channel, "peril_topic", ExchangeKind::Topic)
        .await
        .unwrap();
    declare_and_bind(
        &channel,
        "peril_topic",
        "army_moves.alice",
        "army_moves.*",
        QueueDurability::Transient,
    )
    .await
    .unwrap();
    let mut stream = channel.basic_consume("army_moves.alice").await.unwrap();

    publish_json(&channel, "peril_topic", "army_moves.bob", &note(1))
        .await
        .unwrap();

    let delivery = stream.recv().await.unwrap();
    assert_eq!(
        delivery.message.content_type.as_deref(),
        Some(CONTENT_TYPE_JSON)
    );
    let decoded: Note = serde_json::from_slice(&delivery.message.body).unwrap();
    assert_eq!(decoded, note(1));
}

#[tokio::test]
async fn test_publish_errors_are_distinct() {
    let (_broker, channel) = setup().await;

    let err = publish_json(channel.as_ref(), "missing", "key", &note(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PublishError::Transport(TransportError::ExchangeNotFound(_))
    ));

    // JSON object keys must be strings
    let mut unrepresentable = BTreeMap::new();
    unrepresentable.insert(vec![1u8, 2], 3u8);
    let err = publish_json(channel.as_ref(), "peril_topic", "key", &unrepresentable)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Serialize(_)));
}

#[tokio::test]
async fn test_accepted_deliveries_are_handled_in_order() {
    let (broker, channel) = setup().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    subscribe_json(
        channel.clone(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
        move |value: Note| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(value.seq);
                AckDecision::Accept
            }
        },
    )
    .await
    .unwrap();

    for seq in 1..=5 {
        publish_json(channel.as_ref(), "peril_topic", "war.alice", &note(seq))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..5 {
        let seq = timeout(Duration::from_secs(2), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(seq);
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    wait_for(&broker, "war", |i| i.messages == 0 && i.unacked == 0).await;
}

#[tokio::test]
async fn test_requeue_retry_redelivers_until_accepted() {
    let (broker, channel) = setup().await;
    let calls = Arc::new(Mutex::new(Vec::new()));

    let recorded = calls.clone();
    subscribe_json(
        channel.clone(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
        move |value: Note| {
            let recorded = recorded.clone();
            async move {
                let mut calls = recorded.lock().unwrap();
                calls.push(value.seq);
                if calls.len() < 3 {
                    AckDecision::RequeueRetry
                } else {
                    AckDecision::Accept
                }
            }
        },
    )
    .await
    .unwrap();

    publish_json(channel.as_ref(), "peril_topic", "war.alice", &note(9))
        .await
        .unwrap();

    wait_for(&broker, "war", |i| i.messages == 0 && i.unacked == 0).await;
    assert_eq!(*calls.lock().unwrap(), vec![9, 9, 9]);
}

#[tokio::test]
async fn test_discard_goes_to_dead_letter_queue() {
    let (broker, channel) = setup().await;

    subscribe_json_with(
        channel.clone(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
        dead_lettered(),
        |_: Note| async { AckDecision::DiscardPermanently },
    )
    .await
    .unwrap();

    publish_json(channel.as_ref(), "peril_topic", "war.alice", &note(1))
        .await
        .unwrap();

    wait_for(&broker, "peril_dlq", |i| i.messages == 1).await;
    let war = info(&broker, "war");
    assert_eq!((war.messages, war.unacked), (0, 0));
}

#[tokio::test]
async fn test_malformed_delivery_is_left_unresolved_by_default() {
    let (broker, channel) = setup().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    subscribe_json(
        channel.clone(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
        move |value: Note| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(value.seq);
                AckDecision::Accept
            }
        },
    )
    .await
    .unwrap();

    channel
        .basic_publish("peril_topic", "war.alice", Some(CONTENT_TYPE_JSON), b"{not json".to_vec())
        .await
        .unwrap();
    publish_json(channel.as_ref(), "peril_topic", "war.alice", &note(2))
        .await
        .unwrap();

    // the good message behind it still gets handled
    let seq = timeout(Duration::from_secs(2), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seq, 2);
    wait_for(&broker, "war", |i| i.unacked == 1 && i.messages == 0).await;
    assert_eq!(info(&broker, "peril_dlq").messages, 0);
}

#[tokio::test]
async fn test_malformed_discard_policy_dead_letters() {
    let (broker, channel) = setup().await;
    let handled = Arc::new(Mutex::new(0));

    let counter = handled.clone();
    subscribe_json_with(
        channel.clone(),
        "peril_topic",
        "war",
        "war.*",
        QueueDurability::Durable,
        SubscribeOptions {
            malformed: MalformedPolicy::Discard,
            ..dead_lettered()
        },
        move |_: Note| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                AckDecision::Accept
            }
        },
    )
    .await
    .unwrap();

    channel
        .basic_publish("peril_topic", "war.alice", None, b"\xff\xfe".to_vec())
        .await
        .unwrap();

    wait_for(&broker, "peril_dlq", |i| i.messages == 1).await;
    assert_eq!(*handled.lock().unwrap(), 0);
    let war = info(&broker, "war");
    assert_eq!((war.messages, war.unacked), (0, 0));
}

#[test]
fn test_malformed_policy_decisions() {
    assert_eq!(MalformedPolicy::default(), MalformedPolicy::LeaveUnresolved);
    assert_eq!(MalformedPolicy::LeaveUnresolved.decision(), None);
    assert_eq!(
        MalformedPolicy::Discard.decision(),
        Some(AckDecision::DiscardPermanently)
    );
    assert_eq!(
        MalformedPolicy::Requeue.decision(),
        Some(AckDecision::RequeueRetry)
    );
}
