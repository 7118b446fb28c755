//! Event bus and observable agent state.
//!
//! Events are broadcast synchronously to every currently-subscribed
//! listener from the scheduler's own task — listeners must be cheap and
//! non-blocking; anything expensive should hand off to its own task.
//! `subscribe()` returns an unsubscribe handle rather than requiring
//! callers to track an id themselves; calling it removes the listener from
//! future broadcasts (it is a no-op if called twice).
//!
//! The listener set is snapshotted at broadcast entry so a listener that
//! subscribes or unsubscribes from within its own callback can't deadlock
//! or invalidate the in-flight iteration.

use crate::message::Message;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// One of the fixed set of event kinds the scheduler emits. Every kind
/// carries a typed payload; listeners discriminate on kind rather than
/// payload shape.
#[derive(Debug, Clone)]
pub enum Event {
    AgentStart,
    AgentEnd {
        reason: String,
    },
    TurnStart {
        turn: u32,
    },
    TurnEnd {
        turn: u32,
        cost_usd: f64,
    },
    MessageStart,
    MessageUpdate {
        delta: String,
    },
    MessageEnd {
        message: Message,
    },
    ToolStart {
        call_id: String,
        name: String,
        arguments: Value,
    },
    ToolUpdate {
        call_id: String,
        delta: String,
    },
    ToolEnd {
        call_id: String,
        name: String,
        is_error: bool,
    },
    ToolDenied {
        call_id: String,
        name: String,
        reason: String,
    },
    Compaction {
        removed_messages: usize,
        summary_tokens: u64,
    },
    TurnLimitReached {
        max_turns: u32,
    },
    Retry {
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
        reason: String,
    },
    ConfigReloaded,
}

impl Event {
    /// A short, stable name for the event kind (used in logging and tests).
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AgentStart => "agent_start",
            Event::AgentEnd { .. } => "agent_end",
            Event::TurnStart { .. } => "turn_start",
            Event::TurnEnd { .. } => "turn_end",
            Event::MessageStart => "message_start",
            Event::MessageUpdate { .. } => "message_update",
            Event::MessageEnd { .. } => "message_end",
            Event::ToolStart { .. } => "tool_start",
            Event::ToolUpdate { .. } => "tool_update",
            Event::ToolEnd { .. } => "tool_end",
            Event::ToolDenied { .. } => "tool_denied",
            Event::Compaction { .. } => "compaction",
            Event::TurnLimitReached { .. } => "turn_limit_reached",
            Event::Retry { .. } => "retry",
            Event::ConfigReloaded => "config_reloaded",
        }
    }
}

/// An immutable snapshot of agent state, returned by `EventBus::state()`
/// callers or (more commonly) `Agent::state()`.
#[derive(Debug, Clone)]
pub struct AgentStateSnapshot {
    pub system_prompt: String,
    pub model: String,
    pub provider_name: String,
    pub history: Vec<Message>,
    pub streaming: bool,
    pub in_flight_calls: Vec<String>,
    pub last_error: Option<String>,
    pub estimated_context_tokens: u64,
    pub cumulative_cost_usd: f64,
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Registered listener, keyed so `subscribe()` can return a handle that
/// removes exactly this entry.
struct Subscription {
    id: u64,
    listener: Listener,
}

/// Synchronous pub/sub broadcaster for scheduler [`Event`]s.
#[derive(Clone)]
pub struct EventBus {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a listener. Returns an unsubscribe handle: call it (or drop
    /// it, `unsubscribe` is idempotent) to stop receiving events. The
    /// listener itself must not block — broadcast runs on the scheduler's
    /// own task.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .write()
            .unwrap()
            .push(Subscription {
                id,
                listener: Arc::new(listener),
            });
        Unsubscribe {
            bus: self.subscriptions.clone(),
            id,
        }
    }

    /// Broadcast an event to every listener subscribed at the moment this
    /// call started. Listeners added or removed mid-broadcast (from within
    /// another listener) do not affect this broadcast.
    pub fn publish(&self, event: Event) {
        let snapshot: Vec<Listener> = self
            .subscriptions
            .read()
            .unwrap()
            .iter()
            .map(|s| s.listener.clone())
            .collect();
        for listener in snapshot {
            listener(&event);
        }
    }

    /// Number of currently-registered listeners. Exposed for tests.
    pub fn listener_count(&self) -> usize {
        self.subscriptions.read().unwrap().len()
    }
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it does not
/// unsubscribe — call [`unsubscribe`](Unsubscribe::unsubscribe) explicitly.
pub struct Unsubscribe {
    bus: Arc<RwLock<Vec<Subscription>>>,
    id: u64,
}

impl Unsubscribe {
    /// Remove this listener from the bus. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.bus.write().unwrap().retain(|s| s.id != self.id);
    }
}
