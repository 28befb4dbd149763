//! Background detection of identity changes.
//!
//! The cache only notices a changed identity when someone asks it for
//! permissions. The staleness monitor closes that gap: on every poll tick,
//! and on every invalidation signal from another gate instance, it compares
//! the identity the cache holds with what the resolver reports now, and
//! refetches when they differ.

use crate::cache::PermissionCache;
use crate::signal::{InvalidationBus, InvalidationSignal};
use pagegate_core::{Identity, IdentityResolver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one identity check did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorAction {
    /// Nothing cached yet
    Idle,
    /// Cached identity is still current
    Unchanged,
    /// Identity changed; the cache was invalidated and refetched
    Refreshed { previous: Identity, current: Identity },
}

enum Event {
    Shutdown,
    Poll,
    Signal(Result<InvalidationSignal, RecvError>),
}

/// Watches the identity carrier for changes behind the cache's back
pub struct StalenessMonitor {
    cache: PermissionCache,
    resolver: Arc<dyn IdentityResolver>,
    poll_interval: Duration,
    signals: Option<(InvalidationBus, Uuid)>,
}

impl StalenessMonitor {
    pub fn new(
        cache: PermissionCache,
        resolver: Arc<dyn IdentityResolver>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            cache,
            resolver,
            poll_interval,
            signals: None,
        }
    }

    /// Also react to signals on `bus`, ignoring those sent by `origin`.
    pub fn with_signals(mut self, bus: InvalidationBus, origin: Uuid) -> Self {
        self.signals = Some((bus, origin));
        self
    }

    /// Compare the cached identity with the current one and refetch on change.
    pub async fn check_identity(&self) -> MonitorAction {
        let Some(previous) = self.cache.cached_identity() else {
            return MonitorAction::Idle;
        };

        let current = self.resolver.resolve();
        if previous == current {
            return MonitorAction::Unchanged;
        }

        info!(
            previous = %previous,
            current = %current,
            "Identity changed, refreshing permissions"
        );
        self.cache.invalidate();
        self.cache.get(&current).await;

        MonitorAction::Refreshed { previous, current }
    }

    /// Run the monitor on its own task until the handle is shut down or dropped.
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let mut receiver = self.signals.as_ref().map(|(bus, _)| bus.subscribe());
        let origin = self.signals.as_ref().map(|(_, origin)| *origin);

        debug!(
            poll_interval = ?self.poll_interval,
            signals = receiver.is_some(),
            "Starting staleness monitor"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                let event = tokio::select! {
                    _ = &mut shutdown_rx => Event::Shutdown,
                    _ = ticker.tick() => Event::Poll,
                    signal = next_signal(&mut receiver) => Event::Signal(signal),
                };

                match event {
                    Event::Shutdown => break,
                    Event::Poll => {
                        self.check_identity().await;
                    }
                    Event::Signal(Ok(signal)) => {
                        if Some(signal.origin) == origin {
                            continue;
                        }
                        debug!(
                            origin = %signal.origin,
                            identity = %signal.identity,
                            "Received invalidation signal"
                        );
                        self.check_identity().await;
                    }
                    Event::Signal(Err(RecvError::Lagged(missed))) => {
                        warn!(missed, "Invalidation signals lagged, checking identity");
                        self.check_identity().await;
                    }
                    Event::Signal(Err(RecvError::Closed)) => {
                        debug!("Invalidation bus closed, falling back to polling only");
                        receiver = None;
                    }
                }
            }

            debug!("Staleness monitor stopped");
        });

        MonitorHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn next_signal(
    receiver: &mut Option<broadcast::Receiver<InvalidationSignal>>,
) -> Result<InvalidationSignal, RecvError> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a running monitor. Dropping it stops the monitor.
pub struct MonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop the monitor and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
