//! Store Event System
//!
//! Change notifications for the render layer. Instead of polling every
//! slot, a subscriber receives an event naming the module that changed and
//! reads that slot.

use tokio::sync::broadcast;

use super::ModuleStatus;

/// Events emitted when a slot changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A new render state was published
    Updated {
        /// Module identifier
        module: String,
    },
    /// The module's lifecycle status changed
    StatusChanged {
        /// Module identifier
        module: String,
        status: ModuleStatus,
    },
}

impl StoreEvent {
    /// Module the event refers to
    pub fn module(&self) -> &str {
        match self {
            StoreEvent::Updated { module } | StoreEvent::StatusChanged { module, .. } => module,
        }
    }
}

/// Subscription handle for receiving store events
pub struct StoreSubscription {
    receiver: broadcast::Receiver<StoreEvent>,
}

impl StoreSubscription {
    /// Receive the next event, waiting if necessary
    ///
    /// A subscriber that fell behind skips the events it missed; each slot
    /// still holds its latest value, so nothing is lost but intermediate
    /// states.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("Store subscriber lagged by {} events", count);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!("Store subscriber lagged by {} events", count);
                }
            }
        }
    }
}

/// Event bus for publishing and subscribing to store events
#[derive(Clone)]
pub struct StoreEventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl StoreEventBus {
    /// Create a new event bus with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to store events
    pub fn subscribe(&self) -> StoreSubscription {
        StoreSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: StoreEvent) {
        // Ignore errors - they just mean no subscribers are active
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StoreEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
