//! Forwards domain events from the [`EventBus`] to a [`Notifier`].
//!
//! Runs as its own task so that notification transport latency and failures
//! stay off the reconcile and scan paths.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::models::events::EventEnvelope;
use crate::domain::ports::Notifier;
use crate::services::event_bus::EventBus;

pub struct NotificationForwarder {
    bus: Arc<EventBus>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationForwarder {
    pub fn new(bus: Arc<EventBus>, notifier: Arc<dyn Notifier>) -> Self {
        Self { bus, notifier }
    }

    /// Subscribe now and forward events until `shutdown` fires or the bus closes.
    ///
    /// Events already queued when `shutdown` fires are still delivered.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<u64> {
        let mut rx = self.bus.subscribe();
        let notifier = self.notifier;

        tokio::spawn(async move {
            let mut delivered = 0u64;
            loop {
                let envelope = tokio::select! {
                    () = shutdown.cancelled() => {
                        while let Ok(envelope) = rx.try_recv() {
                            delivered += deliver(notifier.as_ref(), &envelope).await;
                        }
                        break;
                    }
                    received = rx.recv() => match received {
                        Ok(envelope) => envelope,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "notification forwarder lagged, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                delivered += deliver(notifier.as_ref(), &envelope).await;
            }
            tracing::debug!(delivered, "notification forwarder stopped");
            delivered
        })
    }
}

async fn deliver(notifier: &dyn Notifier, envelope: &EventEnvelope) -> u64 {
    match notifier.notify(&envelope.event.to_message()).await {
        Ok(()) => 1,
        Err(e) => {
            tracing::warn!(
                notifier = notifier.name(),
                sequence = envelope.sequence,
                error = %e,
                "failed to deliver notification"
            );
            0
        }
    }
}
