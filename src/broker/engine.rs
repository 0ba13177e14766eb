//! Broker engine
//!
//! This module contains the in-memory broker implementation responsible for:
//! - managing exchanges, queues and the bindings between them
//! - routing published messages to every matching queue
//! - dispatching queued messages round-robin to consumers, bounded by a
//!   per-consumer prefetch limit
//! - tracking unacknowledged deliveries until the consumer acks or nacks them
//! - persisting durable queues and their messages via `Persistence`
//!
//! Concurrency and usage notes:
//! - The public API here is synchronous and designed to be held behind a
//!   lock (`SharedBroker`) by the transport layer. Callers must not hold the
//!   lock across network I/O.
//! - Deliveries are pushed into unbounded per-consumer channels, so dispatch
//!   never blocks while the lock is held.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::exchange::{Exchange, ExchangeKind};
use crate::broker::message::{ConnectionId, ConsumerTag, Delivery, DeliveryTag, Message};
use crate::broker::queue::{Queue, QueueInfo, QueueOptions, QueuedMessage};
use crate::persistence::{Persistence, StoredExchange, StoredQueue};
use crate::utils::error::{PersistenceError, TransportError};

#[derive(Debug)]
struct Consumer {
    queue: String,
    connection: ConnectionId,
    sender: UnboundedSender<Delivery>,
    unacked: usize,
}

#[derive(Debug)]
struct PendingDelivery {
    queue: String,
    consumer_tag: ConsumerTag,
    connection: ConnectionId,
    entry: QueuedMessage,
}

#[derive(Debug)]
pub struct Broker {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    connections: HashSet<ConnectionId>,
    consumers: HashMap<ConsumerTag, Consumer>,
    unacked: HashMap<DeliveryTag, PendingDelivery>,
    next_delivery_tag: DeliveryTag,
    next_seq: u64,
    prefetch: usize,
    persistence: Option<Persistence>,
}

impl Broker {
    /// Unacknowledged deliveries a single consumer may hold when no explicit
    /// limit is configured.
    pub const DEFAULT_PREFETCH: usize = 10;
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            exchanges: HashMap::new(),
            queues: HashMap::new(),
            connections: HashSet::new(),
            consumers: HashMap::new(),
            unacked: HashMap::new(),
            next_delivery_tag: 1,
            next_seq: 1,
            prefetch: Self::DEFAULT_PREFETCH,
            persistence: None,
        }
    }

    /// Creates a broker backed by `persistence`, restoring the exchanges,
    /// durable queues, bindings and pending messages stored there.
    pub fn new_with_persistence(persistence: Persistence) -> Result<Self, PersistenceError> {
        let mut broker = Self::new();

        for stored in persistence.load_exchanges()? {
            broker
                .exchanges
                .insert(stored.name.clone(), Exchange::new(&stored.name, stored.kind));
        }

        for stored in persistence.load_queues()? {
            let mut queue = Queue::new(&stored.name, stored.options.clone(), None);
            for message in persistence.load_messages(&stored.name)? {
                broker.next_seq = broker.next_seq.max(message.seq + 1);
                queue.ready.push_back(QueuedMessage {
                    seq: message.seq,
                    message: message.message,
                    redelivered: true,
                });
            }
            for binding in &stored.bindings {
                match broker.exchanges.get_mut(&binding.exchange) {
                    Some(exchange) => {
                        exchange.bind(&stored.name, &binding.routing_key);
                    }
                    None => warn!(
                        queue = %stored.name,
                        exchange = %binding.exchange,
                        "Dropping stored binding to unknown exchange"
                    ),
                }
            }
            info!(
                queue = %stored.name,
                messages = queue.ready.len(),
                "Restored durable queue"
            );
            broker.queues.insert(stored.name.clone(), queue);
        }

        broker.persistence = Some(persistence);
        Ok(broker)
    }

    /// Sets the per-consumer limit on unacknowledged deliveries. `0` means
    /// unlimited.
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Flushes durable state to disk. A no-op without storage.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        match &self.persistence {
            Some(persistence) => persistence.flush(),
            None => Ok(()),
        }
    }

    pub fn register_connection(&mut self) -> ConnectionId {
        let id = format!("conn-{}", Uuid::new_v4());
        self.connections.insert(id.clone());
        debug!(connection = %id, "Connection registered");
        id
    }

    pub fn is_open(&self, connection: &str) -> bool {
        self.connections.contains(connection)
    }

    fn ensure_open(&self, connection: &str) -> Result<(), TransportError> {
        if self.is_open(connection) {
            Ok(())
        } else {
            Err(TransportError::ChannelClosed)
        }
    }

    pub fn declare_exchange(
        &mut self,
        connection: &str,
        name: &str,
        kind: ExchangeKind,
    ) -> Result<(), TransportError> {
        self.ensure_open(connection)?;

        if let Some(existing) = self.exchanges.get(name) {
            if existing.kind != kind {
                return Err(TransportError::PreconditionFailed(format!(
                    "exchange '{name}' already declared as {}, not {kind}",
                    existing.kind
                )));
            }
            return Ok(());
        }

        if let Some(persistence) = &self.persistence {
            persistence.store_exchange(&StoredExchange {
                name: name.to_string(),
                kind,
            })?;
        }
        self.exchanges
            .insert(name.to_string(), Exchange::new(name, kind));
        info!(exchange = %name, %kind, "Exchange declared");
        Ok(())
    }

    /// Declares a queue. Redeclaring with identical options is a no-op that
    /// returns the current counters; any difference is rejected and leaves
    /// the existing queue untouched. An empty name gets a generated one.
    pub fn declare_queue(
        &mut self,
        connection: &str,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueInfo, TransportError> {
        self.ensure_open(connection)?;

        if let Some(existing) = self.queues.get(name) {
            if !existing.accessible_by(connection) {
                return Err(TransportError::ResourceLocked(format!(
                    "queue '{name}' is exclusive to another connection"
                )));
            }
            if existing.options != options {
                return Err(TransportError::PreconditionFailed(format!(
                    "queue '{name}' already declared with {:?}, requested {options:?}",
                    existing.options
                )));
            }
            return self
                .queue_info(name)
                .ok_or_else(|| TransportError::QueueNotFound(name.to_string()));
        }

        let name = if name.is_empty() {
            format!("amq.gen-{}", Uuid::new_v4())
        } else {
            name.to_string()
        };

        if options.durable {
            if let Some(persistence) = &self.persistence {
                persistence.store_queue(&StoredQueue {
                    name: name.clone(),
                    options: options.clone(),
                    bindings: Vec::new(),
                })?;
            }
        }

        let owner = (options.exclusive || options.auto_delete).then(|| connection.to_string());
        info!(queue = %name, ?options, "Queue declared");
        self.queues
            .insert(name.clone(), Queue::new(&name, options, owner));
        self.queue_info(&name)
            .ok_or(TransportError::QueueNotFound(name))
    }

    /// Binds `queue` to `exchange` under `routing_key`. Binding twice is a no-op.
    pub fn bind_queue(
        &mut self,
        connection: &str,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError> {
        self.ensure_open(connection)?;

        let target = self
            .queues
            .get(queue)
            .ok_or_else(|| TransportError::QueueNotFound(queue.to_string()))?;
        if !target.accessible_by(connection) {
            return Err(TransportError::ResourceLocked(format!(
                "queue '{queue}' is exclusive to another connection"
            )));
        }
        let durable = target.options.durable;

        let ex = self
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;
        if !ex.bind(queue, routing_key) {
            return Ok(());
        }

        if durable {
            if let Some(persistence) = &self.persistence {
                persistence.store_binding(queue, exchange, routing_key)?;
            }
        }
        info!(%queue, %exchange, %routing_key, "Queue bound");
        Ok(())
    }

    /// Routes a message to every queue bound to `exchange` that matches
    /// `routing_key`. Returns the number of queues it reached.
    pub fn publish(
        &mut self,
        connection: &str,
        exchange: &str,
        routing_key: &str,
        content_type: Option<String>,
        body: Vec<u8>,
    ) -> Result<usize, TransportError> {
        self.ensure_open(connection)?;

        let message = Message {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type,
            body,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.route(message)
    }

    fn route(&mut self, message: Message) -> Result<usize, TransportError> {
        let targets = self
            .exchanges
            .get(&message.exchange)
            .ok_or_else(|| TransportError::ExchangeNotFound(message.exchange.clone()))?
            .route(&message.routing_key);

        if targets.is_empty() {
            debug!(
                exchange = %message.exchange,
                routing_key = %message.routing_key,
                "Message matched no queue, dropped"
            );
            return Ok(0);
        }

        for queue in &targets {
            self.enqueue(queue, message.clone())?;
        }
        for queue in &targets {
            self.dispatch(queue);
        }
        Ok(targets.len())
    }

    fn enqueue(&mut self, queue_name: &str, message: Message) -> Result<(), TransportError> {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return Ok(());
        };
        let seq = self.next_seq;
        self.next_seq += 1;

        if queue.options.durable {
            if let Some(persistence) = &self.persistence {
                persistence.store_message(queue_name, seq, &message)?;
            }
        }
        queue.ready.push_back(QueuedMessage {
            seq,
            message,
            redelivered: false,
        });
        Ok(())
    }

    /// Starts delivering messages from `queue` to `sender`. Returns the
    /// consumer tag, generated when none is given.
    pub fn consume(
        &mut self,
        connection: &str,
        queue: &str,
        consumer_tag: Option<ConsumerTag>,
        sender: UnboundedSender<Delivery>,
    ) -> Result<ConsumerTag, TransportError> {
        self.ensure_open(connection)?;

        let target = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::QueueNotFound(queue.to_string()))?;
        if !target.accessible_by(connection) {
            return Err(TransportError::ResourceLocked(format!(
                "queue '{queue}' is exclusive to another connection"
            )));
        }

        let tag = consumer_tag.unwrap_or_else(|| format!("ctag-{}", Uuid::new_v4()));
        if self.consumers.contains_key(&tag) {
            return Err(TransportError::PreconditionFailed(format!(
                "consumer tag '{tag}' already in use"
            )));
        }

        target.consumers.push(tag.clone());
        target.had_consumers = true;
        self.consumers.insert(
            tag.clone(),
            Consumer {
                queue: queue.to_string(),
                connection: connection.to_string(),
                sender,
                unacked: 0,
            },
        );
        info!(%queue, consumer = %tag, "Consumer started");

        self.dispatch(queue);
        Ok(tag)
    }

    /// Positively acknowledges a delivery: the message is gone for good.
    pub fn ack(&mut self, connection: &str, delivery_tag: DeliveryTag) -> Result<(), TransportError> {
        self.ensure_open(connection)?;
        let pending = self.take_pending(connection, delivery_tag)?;
        self.forget_stored(&pending.queue, pending.entry.seq);
        debug!(queue = %pending.queue, delivery_tag, "Delivery acknowledged");
        self.dispatch(&pending.queue);
        Ok(())
    }

    /// Negatively acknowledges a delivery. With `requeue` the message goes
    /// back to the head of its queue; otherwise it is dropped, or handed to
    /// the queue's dead-letter exchange when one is configured.
    pub fn nack(
        &mut self,
        connection: &str,
        delivery_tag: DeliveryTag,
        requeue: bool,
    ) -> Result<(), TransportError> {
        self.ensure_open(connection)?;
        let pending = self.take_pending(connection, delivery_tag)?;
        let queue_name = pending.queue.clone();

        if requeue {
            debug!(queue = %queue_name, delivery_tag, "Delivery requeued");
            self.requeue(pending);
        } else {
            self.forget_stored(&queue_name, pending.entry.seq);
            self.dead_letter(&queue_name, pending.entry.message);
        }

        self.dispatch(&queue_name);
        Ok(())
    }

    fn take_pending(
        &mut self,
        connection: &str,
        delivery_tag: DeliveryTag,
    ) -> Result<PendingDelivery, TransportError> {
        match self.unacked.get(&delivery_tag) {
            Some(pending) if pending.connection == connection => {}
            _ => return Err(TransportError::UnknownDeliveryTag(delivery_tag)),
        }
        let pending = self
            .unacked
            .remove(&delivery_tag)
            .ok_or(TransportError::UnknownDeliveryTag(delivery_tag))?;
        if let Some(consumer) = self.consumers.get_mut(&pending.consumer_tag) {
            consumer.unacked = consumer.unacked.saturating_sub(1);
        }
        Ok(pending)
    }

    fn requeue(&mut self, pending: PendingDelivery) {
        if let Some(queue) = self.queues.get_mut(&pending.queue) {
            let mut entry = pending.entry;
            entry.redelivered = true;
            queue.ready.push_front(entry);
        }
    }

    fn dead_letter(&mut self, queue_name: &str, message: Message) {
        let dlx = self
            .queues
            .get(queue_name)
            .and_then(|q| q.options.dead_letter_exchange.clone());

        let Some(dlx) = dlx else {
            debug!(queue = %queue_name, "Delivery discarded");
            return;
        };

        let message = Message {
            exchange: dlx,
            ..message
        };
        match self.route(message) {
            Ok(routed) => debug!(queue = %queue_name, routed, "Delivery dead-lettered"),
            Err(e) => warn!(queue = %queue_name, error = %e, "Failed to dead-letter delivery"),
        }
    }

    fn forget_stored(&self, queue_name: &str, seq: u64) {
        let durable = self
            .queues
            .get(queue_name)
            .is_some_and(|q| q.options.durable);
        if let (true, Some(persistence)) = (durable, &self.persistence) {
            if let Err(e) = persistence.remove_message(queue_name, seq) {
                warn!(queue = %queue_name, seq, error = %e, "Failed to remove stored message");
            }
        }
    }

    /// Hands ready messages to consumers with spare prefetch capacity,
    /// rotating through the queue's consumers.
    fn dispatch(&mut self, queue_name: &str) {
        loop {
            let Some(queue) = self.queues.get_mut(queue_name) else {
                return;
            };
            if queue.ready.is_empty() || queue.consumers.is_empty() {
                return;
            }

            let count = queue.consumers.len();
            let chosen = (0..count)
                .map(|offset| (queue.next_consumer + offset) % count)
                .find(|&idx| {
                    self.consumers
                        .get(&queue.consumers[idx])
                        .is_some_and(|c| self.prefetch == 0 || c.unacked < self.prefetch)
                });
            let Some(idx) = chosen else {
                return;
            };
            queue.next_consumer = (idx + 1) % count;

            let consumer_tag = queue.consumers[idx].clone();
            let Some(entry) = queue.ready.pop_front() else {
                return;
            };
            let Some(consumer) = self.consumers.get_mut(&consumer_tag) else {
                queue.ready.push_front(entry);
                return;
            };

            let delivery_tag = self.next_delivery_tag;
            self.next_delivery_tag += 1;
            let delivery = Delivery {
                delivery_tag,
                consumer_tag: consumer_tag.clone(),
                redelivered: entry.redelivered,
                message: entry.message.clone(),
            };

            if consumer.sender.send(delivery).is_err() {
                warn!(queue = %queue_name, consumer = %consumer_tag, "Consumer went away, removing it");
                queue.ready.push_front(entry);
                queue.consumers.retain(|t| t != &consumer_tag);
                queue.next_consumer = 0;
                self.consumers.remove(&consumer_tag);
                continue;
            }

            consumer.unacked += 1;
            self.unacked.insert(
                delivery_tag,
                PendingDelivery {
                    queue: queue_name.to_string(),
                    consumer_tag,
                    connection: consumer.connection.clone(),
                    entry,
                },
            );
        }
    }

    /// Tears down everything tied to `connection`: its consumers are removed,
    /// its unacknowledged deliveries go back to their queues, and the queues
    /// it exclusively owned (or auto-delete queues left without consumers)
    /// are deleted.
    pub fn close_connection(&mut self, connection: &str) {
        if !self.connections.remove(connection) {
            return;
        }

        let tags: Vec<ConsumerTag> = self
            .consumers
            .iter()
            .filter(|(_, c)| c.connection == connection)
            .map(|(tag, _)| tag.clone())
            .collect();
        let mut touched: BTreeSet<String> = BTreeSet::new();
        for tag in tags {
            if let Some(consumer) = self.consumers.remove(&tag) {
                if let Some(queue) = self.queues.get_mut(&consumer.queue) {
                    queue.consumers.retain(|t| t != &tag);
                    queue.next_consumer = 0;
                }
                touched.insert(consumer.queue);
            }
        }

        // Highest tag first, so push_front restores the original order.
        let mut orphaned: Vec<DeliveryTag> = self
            .unacked
            .iter()
            .filter(|(_, p)| p.connection == connection)
            .map(|(tag, _)| *tag)
            .collect();
        orphaned.sort_unstable_by(|a, b| b.cmp(a));
        for tag in orphaned {
            if let Some(pending) = self.unacked.remove(&tag) {
                touched.insert(pending.queue.clone());
                self.requeue(pending);
            }
        }

        let doomed: Vec<String> = self
            .queues
            .values()
            .filter(|q| {
                q.owned_by(connection)
                    || (q.options.auto_delete && q.had_consumers && q.consumers.is_empty())
            })
            .map(|q| q.name.clone())
            .collect();
        for name in doomed {
            self.delete_queue(&name);
            touched.remove(&name);
        }

        for queue in touched {
            self.dispatch(&queue);
        }
        info!(%connection, "Connection closed");
    }

    fn delete_queue(&mut self, name: &str) {
        if self.queues.remove(name).is_some() {
            for exchange in self.exchanges.values_mut() {
                exchange.unbind_queue(name);
            }
            self.unacked.retain(|_, p| p.queue != name);
            info!(queue = %name, "Queue deleted");
        }
    }

    pub fn queue_info(&self, name: &str) -> Option<QueueInfo> {
        let queue = self.queues.get(name)?;
        Some(QueueInfo {
            name: queue.name.clone(),
            messages: queue.ready.len(),
            unacked: self.unacked.values().filter(|p| p.queue == name).count(),
            consumers: queue.consumers.len(),
        })
    }

    pub fn has_exchange(&self, name: &str) -> bool {
        self.exchanges.contains_key(name)
    }

    /// Routing keys bound from `exchange` to `queue`.
    pub fn bindings(&self, exchange: &str, queue: &str) -> Vec<String> {
        self.exchanges
            .get(exchange)
            .map(|ex| {
                ex.bindings
                    .iter()
                    .filter(|b| b.queue == queue)
                    .map(|b| b.routing_key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
