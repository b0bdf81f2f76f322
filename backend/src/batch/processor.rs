//! Sequential, rate-limited execution of one batch of work items.

use std::sync::Arc;
use std::time::Duration;

use bclient::{BandcampApi, HideAction};
use tracing::{error, info, warn};

use crate::batch::state::{BatchTracker, Operation};
use crate::batch::work::WorkItem;
use crate::cart;
use crate::collection;
use crate::error::ItemError;
use crate::logger::{annotate_span, warn_if_slow};
use crate::metrics::counters::Counters;
use crate::port::Outbox;
use crate::protocol::CollectionResponse;
use crate::rate_limit::RateLimiter;

const SLOW_ITEM: Duration = Duration::from_secs(10);

/// Runs batches for one port.
///
/// Items are awaited one at a time, each through the shared rate limiter.
/// A failed item is recorded and the batch moves on; nothing is retried.
#[derive(Clone)]
pub struct BatchProcessor {
    api: Arc<dyn BandcampApi>,
    limiter: Arc<RateLimiter>,
    tracker: BatchTracker,
    outbox: Outbox<CollectionResponse>,
    counters: Counters,
    cart_add_delay: Duration,
}

impl BatchProcessor {
    pub fn new(
        api: Arc<dyn BandcampApi>,
        limiter: Arc<RateLimiter>,
        tracker: BatchTracker,
        outbox: Outbox<CollectionResponse>,
        counters: Counters,
        cart_add_delay: Duration,
    ) -> Self {
        Self {
            api,
            limiter,
            tracker,
            outbox,
            counters,
            cart_add_delay,
        }
    }

    pub fn api(&self) -> &dyn BandcampApi {
        self.api.as_ref()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn tracker(&self) -> &BatchTracker {
        &self.tracker
    }

    pub fn outbox(&self) -> &Outbox<CollectionResponse> {
        &self.outbox
    }

    /// Consumes `items` in order. Completion is reported on the outbox only.
    pub async fn run(&self, items: Vec<WorkItem>, operation: Operation) {
        if items.is_empty() {
            info!(component = "batch", %operation, "nothing to process");
            self.outbox
                .send(CollectionResponse::complete(
                    operation,
                    operation.empty_message().to_string(),
                ))
                .await;
            return;
        }

        annotate_span(items.len());
        Counters::bump(&self.counters.batches_started);

        let state = self.tracker.begin(operation, items.len());
        info!(
            component = "batch",
            event = "start",
            %operation,
            total = state.total_count,
            "Batch started"
        );
        self.outbox.send(CollectionResponse::state(state)).await;

        for item in &items {
            if self.outbox.is_closed() {
                let state = self.tracker.finish();
                Counters::bump(&self.counters.batches_abandoned);
                warn!(
                    component = "batch",
                    event = "abandoned",
                    %operation,
                    processed = state.processed_count,
                    total = state.total_count,
                    "Port closed; abandoning batch"
                );
                return;
            }

            let outcome = self
                .limiter
                .schedule(|| warn_if_slow("batch_item", SLOW_ITEM, self.execute(item)))
                .await;

            let mut cart_request_sent = false;
            let error = match outcome {
                Ok(follow_up) => {
                    Counters::bump(&self.counters.items_ok);
                    if let Some(msg) = follow_up {
                        cart_request_sent = self.outbox.send(msg).await;
                    }
                    None
                }
                Err(e) => {
                    Counters::bump(&self.counters.items_failed);
                    let message = item.failure_message(&e);
                    error!(
                        component = "batch",
                        kind = ?item.kind(),
                        item_id = ?item.item_id(),
                        item = %item.label(),
                        error = %e,
                        "Work item failed"
                    );
                    self.outbox
                        .send(CollectionResponse::item_error(operation, message.clone()))
                        .await;
                    Some(message)
                }
            };

            let state = self.tracker.record(error);
            self.outbox.send(CollectionResponse::state(state)).await;

            // Lets the page finish one cart add before the next arrives.
            if cart_request_sent && !self.cart_add_delay.is_zero() {
                tokio::time::sleep(self.cart_add_delay).await;
            }
        }

        let state = self.tracker.finish();
        let succeeded = state.succeeded();
        let failed = state.errors.len();
        info!(
            component = "batch",
            event = "finish",
            %operation,
            succeeded,
            failed,
            "Batch finished"
        );

        self.outbox.send(CollectionResponse::state(state)).await;
        self.outbox
            .send(CollectionResponse::complete(
                operation,
                operation.completion_message(succeeded, failed),
            ))
            .await;
    }

    /// Performs one item. A cart item yields the request the page must act on.
    async fn execute(&self, item: &WorkItem) -> Result<Option<CollectionResponse>, ItemError> {
        match item {
            WorkItem::Hide(target) => {
                collection::apply(self.api(), HideAction::Hide, target).await?;
                Ok(None)
            }
            WorkItem::Unhide(target) => {
                collection::apply(self.api(), HideAction::Unhide, target).await?;
                Ok(None)
            }
            WorkItem::CartAdd(entry) => {
                let request = cart::resolve_item(self.api(), entry).await?;
                Ok(Some(CollectionResponse::CartAddRequest(request)))
            }
            WorkItem::UrlImport(url) => {
                let request = cart::resolve_url(self.api(), url).await?;
                Ok(Some(CollectionResponse::CartAddRequest(request)))
            }
        }
    }
}
