use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::broker::topic;

/// Routing rule applied by an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// Exact routing-key match.
    Direct,
    /// Pattern match on `.`-separated words (`*`, `#`).
    Topic,
    /// Every bound queue, key ignored.
    Fanout,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Fanout => "fanout",
        };
        f.write_str(name)
    }
}

/// One queue bound to an exchange under a routing key (or pattern).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub queue: String,
    pub routing_key: String,
}

/// An exchange and the set of bindings hanging off it.
#[derive(Debug)]
pub struct Exchange {
    pub name: String,
    pub kind: ExchangeKind,
    pub bindings: BTreeSet<Binding>,
}

impl Exchange {
    pub fn new(name: &str, kind: ExchangeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            bindings: BTreeSet::new(),
        }
    }

    /// Adds a binding. Returns false when it was already present.
    pub fn bind(&mut self, queue: &str, routing_key: &str) -> bool {
        self.bindings.insert(Binding {
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
        })
    }

    pub fn unbind_queue(&mut self, queue: &str) {
        self.bindings.retain(|b| b.queue != queue);
    }

    /// Names of the queues a message published under `routing_key` reaches,
    /// each at most once.
    pub fn route(&self, routing_key: &str) -> BTreeSet<String> {
        self.bindings
            .iter()
            .filter(|b| match self.kind {
                ExchangeKind::Direct => b.routing_key == routing_key,
                ExchangeKind::Topic => topic::matches(&b.routing_key, routing_key),
                ExchangeKind::Fanout => true,
            })
            .map(|b| b.queue.clone())
            .collect()
    }
}
