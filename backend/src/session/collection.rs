use bclient::HideAction;
use serde_json::Value;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{Instrument, debug, info, warn};

use crate::batch::{BatchProcessor, BatchState, BatchTracker, Operation, WorkItem};
use crate::collection;
use crate::error::AppError;
use crate::logger::batch_span;
use crate::metrics::counters::Counters;
use crate::port::Outbox;
use crate::protocol::{CollectionRequest, CollectionResponse};
use crate::router::Services;

enum BatchJob {
    Listing {
        action: HideAction,
        crumb: Option<String>,
    },
    Items(Vec<WorkItem>),
}

/// Serves the `bes` port: hide, unhide and cart import batches plus state
/// queries.
pub struct CollectionSession {
    processor: BatchProcessor,
    tracker: BatchTracker,
    outbox: Outbox<CollectionResponse>,
    counters: Counters,
    page_size: usize,
}

impl CollectionSession {
    pub fn new(services: &Services, outbound: Sender<Value>) -> Self {
        let tracker = BatchTracker::new();
        let outbox = Outbox::new(outbound);
        let processor = BatchProcessor::new(
            services.api.clone(),
            services.limiter.clone(),
            tracker.clone(),
            outbox.clone(),
            services.counters.clone(),
            services.config.cart_add_delay(),
        );

        Self {
            processor,
            tracker,
            outbox,
            counters: services.counters.clone(),
            page_size: services.config.listing_page_size,
        }
    }

    /// Runs until the client side of the port goes away. Malformed messages
    /// are skipped.
    pub async fn run(self, mut inbound: Receiver<Value>) {
        info!(component = "session", event = "startup", "Collection session started");

        while let Some(raw) = inbound.recv().await {
            match serde_json::from_value::<CollectionRequest>(raw) {
                Ok(req) => self.dispatch(req).await,
                Err(e) => {
                    warn!(component = "session", error = %AppError::from(e), "Ignoring message");
                }
            }
        }

        if self.tracker.is_busy() {
            info!(component = "session", "Port closed with a batch running; it will be abandoned");
        }
        info!(component = "session", event = "shutdown", "Collection session ended");
    }

    async fn dispatch(&self, req: CollectionRequest) {
        match req {
            CollectionRequest::Hide(payload) => {
                let job = BatchJob::Listing {
                    action: HideAction::Hide,
                    crumb: payload.crumb,
                };
                self.start(Operation::Hide, job).await;
            }
            CollectionRequest::Unhide(payload) => {
                let job = BatchJob::Listing {
                    action: HideAction::Unhide,
                    crumb: payload.crumb,
                };
                self.start(Operation::Unhide, job).await;
            }
            CollectionRequest::CartImport { items } => {
                let items = items.into_iter().map(WorkItem::CartAdd).collect();
                self.start(Operation::CartImport, BatchJob::Items(items)).await;
            }
            CollectionRequest::CartUrlImport { urls } => {
                let items = urls.into_iter().map(WorkItem::UrlImport).collect();
                self.start(Operation::UrlImport, BatchJob::Items(items)).await;
            }
            CollectionRequest::GetCartImportState(_) => {
                let mut state = self.tracker.snapshot();
                if !matches!(state.operation, Operation::CartImport | Operation::UrlImport) {
                    state = BatchState::idle(Operation::CartImport);
                }
                self.outbox
                    .send(CollectionResponse::CartImportState(state))
                    .await;
            }
            CollectionRequest::GetUnhideState(_) => {
                let state = self.tracker.snapshot();
                let msg = if state.operation == Operation::Hide {
                    CollectionResponse::HideState(state)
                } else {
                    CollectionResponse::UnhideState(state)
                };
                self.outbox.send(msg).await;
            }
        }
    }

    /// Claims the port and runs the batch in the background, or reports the
    /// port as busy.
    async fn start(&self, operation: Operation, job: BatchJob) {
        let Some(claim) = self.tracker.try_claim() else {
            Counters::bump(&self.counters.batches_rejected);
            warn!(component = "session", %operation, "Batch already running; request rejected");
            self.outbox
                .send(CollectionResponse::error(
                    operation,
                    AppError::BatchInProgress.to_string(),
                ))
                .await;
            return;
        };

        debug!(component = "session", %operation, "Batch claimed");

        let processor = self.processor.clone();
        let page_size = self.page_size;
        let span = batch_span(operation.as_str());

        tokio::spawn(
            async move {
                let _claim = claim;
                match job {
                    BatchJob::Listing { action, crumb } => {
                        collection::run(&processor, action, crumb, page_size).await
                    }
                    BatchJob::Items(items) => processor.run(items, operation).await,
                }
            }
            .instrument(span),
        );
    }
}
