// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Observer bus for the execution graph: synchronous, ordered fan-out of
//! node state changes to any number of subscribers. See SPEC_FULL.md §4.D
//! and §6.

use crate::dag::NodeState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Spec,
    Workflow,
    Step,
    Resource,
}

/// One notification the graph emits. Delivery to observers is
/// synchronous on the caller's thread and totally ordered per graph;
/// an external sink that needs asynchronous delivery is expected to
/// buffer internally rather than block the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraphEvent {
    NodeStateChanged {
        app_name: String,
        node_id: String,
        node_type: NodeType,
        old_state: Option<NodeState>,
        new_state: NodeState,
        timestamp: DateTime<Utc>,
        properties: Option<serde_json::Value>,
    },
    NodeUpdated {
        app_name: String,
        node_id: String,
        properties: serde_json::Value,
    },
    EdgeAdded {
        app_name: String,
        from: String,
        to: String,
    },
    GraphUpdated {
        app_name: String,
    },
}

/// Subscriber interface. Every method has a no-op default so an
/// observer only implements the notifications it cares about. An
/// implementation's error is logged and does not stop delivery to the
/// remaining observers.
pub trait GraphObserver: Send + Sync {
    fn on_event(&self, event: &GraphEvent) {
        let _ = event;
    }
}

/// Outbound interface to the external collaborator that multiplexes
/// events to its own subscribers (WebSocket clients, metrics, ...).
/// The core makes no assumption about delivery beyond a best-effort
/// synchronous hand-off.
pub trait GraphEventSink: Send + Sync {
    fn publish(&self, event: &GraphEvent);
}

/// Adapts any [`GraphEventSink`] into a [`GraphObserver`].
pub struct SinkObserver<S: GraphEventSink> {
    sink: S,
}

impl<S: GraphEventSink> SinkObserver<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S: GraphEventSink> GraphObserver for SinkObserver<S> {
    fn on_event(&self, event: &GraphEvent) {
        self.sink.publish(event);
    }
}

/// Default observer used when no external sink is configured: logs
/// every event at `info` via `tracing`, the ambient logging backend.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl GraphObserver for LoggingObserver {
    fn on_event(&self, event: &GraphEvent) {
        match event {
            GraphEvent::NodeStateChanged {
                app_name,
                node_id,
                old_state,
                new_state,
                ..
            } => {
                tracing::info!(
                    app = %app_name,
                    node = %node_id,
                    old = ?old_state,
                    new = ?new_state,
                    "node state changed"
                );
            }
            GraphEvent::NodeUpdated { app_name, node_id, .. } => {
                tracing::debug!(app = %app_name, node = %node_id, "node updated");
            }
            GraphEvent::EdgeAdded { app_name, from, to } => {
                tracing::debug!(app = %app_name, from = %from, to = %to, "edge added");
            }
            GraphEvent::GraphUpdated { app_name } => {
                tracing::debug!(app = %app_name, "graph updated");
            }
        }
    }
}

/// Registered set of observers for one graph. Notifications fan out in
/// registration order; an observer is never called while any internal
/// graph lock is held.
#[derive(Default)]
pub struct ObserverBus {
    observers: RwLock<Vec<Arc<dyn GraphObserver>>>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn GraphObserver>) {
        self.observers.write().push(observer);
    }

    pub fn emit(&self, event: GraphEvent) {
        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            observer.on_event(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(AtomicUsize);

    impl GraphObserver for CountingObserver {
        fn on_event(&self, _event: &GraphEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fan_out_reaches_every_subscriber() {
        let bus = ObserverBus::new();
        let a = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let b = Arc::new(CountingObserver(AtomicUsize::new(0)));
        bus.subscribe(a.clone());
        bus.subscribe(b.clone());

        bus.emit(GraphEvent::GraphUpdated {
            app_name: "demo".to_string(),
        });

        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_bus_emits_without_panicking() {
        let bus = ObserverBus::new();
        bus.emit(GraphEvent::GraphUpdated {
            app_name: "demo".to_string(),
        });
        assert!(bus.is_empty());
    }
}
