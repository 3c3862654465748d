//! Run progress events
//!
//! The publish orchestrator reports each milestone of a run on an in-process
//! event bus built on `tokio::sync::broadcast`. Any number of subscribers
//! (CLI progress output, logs, tests) can listen; emitting never blocks and
//! events are dropped when nobody is subscribed.
//!
//! # Example
//!
//! ```no_run
//! use libgramcast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::RunStarted {
//!     account: "Cars".to_string(),
//!     state_key: "cars".to_string(),
//!     mode: "auto".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Broadcast bus for run events
///
/// Lagging subscribers lose the oldest events rather than slowing runs down.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Milestones of a publish run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run acquired its account and marked it running
    RunStarted {
        account: String,
        state_key: String,
        /// `auto` or `manual`
        mode: String,
    },

    /// A media container was created on the platform
    ContainerCreated {
        state_key: String,
        container_id: String,
        /// Image or video URL the container was created from, empty for the carousel itself
        media_url: String,
    },

    /// A container finished processing
    ContainerReady {
        state_key: String,
        container_id: String,
    },

    /// The post went live
    RunSucceeded {
        state_key: String,
        media_id: String,
        permalink: String,
    },

    /// The run ended with an error status
    RunFailed { state_key: String, error: String },
}

impl Event {
    /// State key of the account the event belongs to
    pub fn state_key(&self) -> &str {
        match self {
            Event::RunStarted { state_key, .. }
            | Event::ContainerCreated { state_key, .. }
            | Event::ContainerReady { state_key, .. }
            | Event::RunSucceeded { state_key, .. }
            | Event::RunFailed { state_key, .. } => state_key,
        }
    }
}
