//! Cross-process invalidation signals.
//!
//! A best-effort broadcast channel carrying "the identity changed" notices
//! between gate instances that share an identity carrier (several sessions
//! over one cookie jar, for example). Delivery is at most once, unordered,
//! and may be lost; the polling trigger of the staleness monitor is the
//! backstop.

use chrono::{DateTime, Utc};
use pagegate_core::Identity;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 64;

/// Notice that a gate instance installed permissions for a new identity.
#[derive(Debug, Clone)]
pub struct InvalidationSignal {
    /// Gate instance that published the signal
    pub origin: Uuid,
    /// Identity that was installed
    pub identity: Identity,
    pub sent_at: DateTime<Utc>,
}

/// Broadcast channel shared by cooperating gate instances.
#[derive(Debug, Clone)]
pub struct InvalidationBus {
    sender: broadcast::Sender<InvalidationSignal>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a signal. Returns the number of listeners reached.
    pub fn publish(&self, origin: Uuid, identity: &Identity) -> usize {
        let signal = InvalidationSignal {
            origin,
            identity: identity.clone(),
            sent_at: Utc::now(),
        };
        match self.sender.send(signal) {
            Ok(listeners) => listeners,
            Err(_) => {
                trace!(identity = %identity, "No listeners for invalidation signal");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationSignal> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}
