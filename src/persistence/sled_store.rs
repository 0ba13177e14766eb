//! Persistence layer backed by `sled`
//!
//! Layout:
//! - tree `__exchanges`: exchange name -> `StoredExchange`
//! - tree `__queues`: queue name -> `StoredQueue` (options and bindings)
//! - tree `queue:<name>`: zero-padded sequence number -> `StoredMessage`
//!
//! Message keys are zero-padded so iteration yields messages in publish order.

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::broker::exchange::ExchangeKind;
use crate::broker::message::Message;
use crate::broker::queue::QueueOptions;
use crate::utils::error::PersistenceError;

const EXCHANGES_TREE: &str = "__exchanges";
const QUEUES_TREE: &str = "__queues";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredExchange {
    pub name: String,
    pub kind: ExchangeKind,
}

/// A durable queue together with the bindings that route into it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredQueue {
    pub name: String,
    pub options: QueueOptions,
    pub bindings: Vec<StoredBinding>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredBinding {
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub seq: u64,
    pub message: Message,
}

#[derive(Clone)]
pub struct Persistence {
    db: Db,
}

impl Persistence {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, PersistenceError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn store_exchange(&self, exchange: &StoredExchange) -> Result<(), PersistenceError> {
        let tree = self.db.open_tree(EXCHANGES_TREE)?;
        tree.insert(exchange.name.as_bytes(), serde_json::to_vec(exchange)?)?;
        Ok(())
    }

    pub fn load_exchanges(&self) -> Result<Vec<StoredExchange>, PersistenceError> {
        load_all(&self.db.open_tree(EXCHANGES_TREE)?)
    }

    pub fn store_queue(&self, queue: &StoredQueue) -> Result<(), PersistenceError> {
        let tree = self.db.open_tree(QUEUES_TREE)?;
        tree.insert(queue.name.as_bytes(), serde_json::to_vec(queue)?)?;
        Ok(())
    }

    /// Record an additional binding for an already stored queue.
    pub fn store_binding(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), PersistenceError> {
        let tree = self.db.open_tree(QUEUES_TREE)?;
        let Some(raw) = tree.get(queue.as_bytes())? else {
            return Ok(());
        };
        let mut stored: StoredQueue = serde_json::from_slice(&raw)?;
        let entry = StoredBinding {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !stored.bindings.contains(&entry) {
            stored.bindings.push(entry);
            tree.insert(queue.as_bytes(), serde_json::to_vec(&stored)?)?;
        }
        Ok(())
    }

    pub fn load_queues(&self) -> Result<Vec<StoredQueue>, PersistenceError> {
        load_all(&self.db.open_tree(QUEUES_TREE)?)
    }

    pub fn store_message(
        &self,
        queue: &str,
        seq: u64,
        message: &Message,
    ) -> Result<(), PersistenceError> {
        let stored = StoredMessage {
            seq,
            message: message.clone(),
        };
        self.queue_tree(queue)?
            .insert(message_key(seq), serde_json::to_vec(&stored)?)?;
        Ok(())
    }

    pub fn remove_message(&self, queue: &str, seq: u64) -> Result<(), PersistenceError> {
        self.queue_tree(queue)?.remove(message_key(seq))?;
        Ok(())
    }

    /// Messages of a durable queue in publish order.
    pub fn load_messages(&self, queue: &str) -> Result<Vec<StoredMessage>, PersistenceError> {
        load_all(&self.queue_tree(queue)?)
    }

    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }

    fn queue_tree(&self, queue: &str) -> Result<Tree, PersistenceError> {
        Ok(self.db.open_tree(format!("queue:{queue}"))?)
    }
}

fn message_key(seq: u64) -> String {
    format!("{seq:020}")
}

fn load_all<T: serde::de::DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, PersistenceError> {
    let mut out = Vec::new();
    for entry in tree.iter() {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(&value)?);
    }
    Ok(out)
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("db", &"sled::Db")
            .finish()
    }
}
