//! Exchange, queue and binding layout used to reach the executor.
//!
//! One topic exchange, one durable queue per [`TaskType`] bound under the
//! task type's routing key. The reply queue is broker-named and exclusive,
//! so it is declared separately by each transport.

use std::collections::BTreeSet;

use sical_core::TaskType;

/// Topic exchange every task is published to.
pub const TASK_EXCHANGE: &str = "sical_tasks";

/// One idempotent topology declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// Durable topic exchange.
    Exchange { name: String },
    /// Durable, non-exclusive work queue.
    Queue { name: String },
    /// Route `routing_key` on `exchange` into `queue`.
    Binding {
        queue: String,
        exchange: String,
        routing_key: String,
    },
}

/// Declarations for the task exchange and every task queue, in the order
/// they must be applied.
pub fn task_topology() -> Vec<Declaration> {
    let mut decls = vec![Declaration::Exchange {
        name: TASK_EXCHANGE.to_string(),
    }];
    for task_type in TaskType::ALL {
        decls.push(Declaration::Queue {
            name: task_type.queue_name(),
        });
        decls.push(Declaration::Binding {
            queue: task_type.queue_name(),
            exchange: TASK_EXCHANGE.to_string(),
            routing_key: task_type.routing_key(),
        });
    }
    decls
}

/// In-memory record of applied declarations.
///
/// Mirrors broker semantics: re-declaring an existing entity with the same
/// arguments changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredTopology {
    exchanges: BTreeSet<String>,
    queues: BTreeSet<String>,
    bindings: BTreeSet<(String, String, String)>,
}

impl DeclaredTopology {
    pub fn apply(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Exchange { name } => {
                self.exchanges.insert(name.clone());
            }
            Declaration::Queue { name } => {
                self.queues.insert(name.clone());
            }
            Declaration::Binding {
                queue,
                exchange,
                routing_key,
            } => {
                self.bindings
                    .insert((exchange.clone(), routing_key.clone(), queue.clone()));
            }
        }
    }

    pub fn apply_all(&mut self, decls: &[Declaration]) {
        for decl in decls {
            self.apply(decl);
        }
    }

    /// Queues a message published with `routing_key` on `exchange` lands
    /// in. Bindings here never use wildcards, so matching is exact.
    pub fn route(&self, exchange: &str, routing_key: &str) -> Vec<&str> {
        if !self.exchanges.contains(exchange) {
            return Vec::new();
        }
        self.bindings
            .iter()
            .filter(|(ex, key, queue)| ex == exchange && key == routing_key && self.queues.contains(queue))
            .map(|(_, _, queue)| queue.as_str())
            .collect()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}
