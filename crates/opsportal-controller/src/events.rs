use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use opsportal_api::ApiClient;
use opsportal_core::telemetry::TenantEvent;

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

/// An async stream of [`TenantEvent`]s backed by a background poller.
///
/// The poller fetches `/tenants/{id}/events` on an interval and forwards
/// each event exactly once, deduplicated by event id. Dropping the stream
/// closes the receiver, which stops the poller on its next send attempt.
pub struct EventStream {
    rx: mpsc::Receiver<TenantEvent>,
}

impl EventStream {
    /// A stream that yields nothing and is immediately finished. Used when
    /// there is no tenant to watch.
    pub(crate) fn empty() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self { rx }
    }
}

impl Stream for EventStream {
    type Item = TenantEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub(crate) fn spawn(api: Arc<ApiClient>, tenant_id: String, poll_interval: Duration) -> EventStream {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut seen: HashSet<String> = HashSet::new();
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            if tx.is_closed() {
                return; // receiver dropped between ticks
            }
            match api.tenant_events(&tenant_id).await {
                Ok(events) => {
                    for event in events {
                        if seen.insert(event.id.clone()) && tx.send(event).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                // Transient failure: the next tick retries
                Err(e) => debug!(tenant = %tenant_id, error = %e, "event poll failed"),
            }
        }
    });

    EventStream { rx }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
