//! Collection listing and the hide/unhide batch kickoff.

use std::collections::HashSet;

use bclient::{BandcampApi, BandcampError, CollectionItem, HideAction};
use tracing::{debug, error, info, instrument};

use crate::batch::{BatchProcessor, CollectionTarget, Operation, WorkItem};
use crate::error::{AppError, ItemError};
use crate::protocol::CollectionResponse;
use crate::rate_limit::RateLimiter;
use crate::time::now_secs;

/// Paging token that starts a listing at the newest item.
pub fn initial_token(unix_secs: i64) -> String {
    format!("{unix_secs}:999999999:t::")
}

/// Which listing endpoint feeds a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingSource {
    Visible,
    Hidden,
}

impl ListingSource {
    pub fn for_action(action: HideAction) -> Self {
        match action {
            HideAction::Hide => ListingSource::Visible,
            HideAction::Unhide => ListingSource::Hidden,
        }
    }

    /// What the listing holds, as named in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            ListingSource::Visible => "collection items",
            ListingSource::Hidden => "hidden items",
        }
    }
}

/// Walks every page of a collection listing, each page through the limiter.
///
/// Stops on an empty page, a missing or repeated token, or when the server
/// says nothing more is available.
pub async fn fetch_listing(
    api: &dyn BandcampApi,
    limiter: &RateLimiter,
    fan_id: u64,
    source: ListingSource,
    page_size: usize,
    start_token: String,
) -> Result<Vec<CollectionItem>, BandcampError> {
    let mut items = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut token = start_token;

    loop {
        let page = limiter
            .schedule(|| async {
                match source {
                    ListingSource::Visible => api.collection_items(fan_id, &token, page_size).await,
                    ListingSource::Hidden => api.hidden_items(fan_id, &token, page_size).await,
                }
            })
            .await?;

        if page.items.is_empty() {
            break;
        }

        let mut batch = page.items;
        if source == ListingSource::Hidden {
            // The hidden listing only contains hidden items; some responses omit the flag.
            for item in batch.iter_mut().filter(|i| i.hidden.is_none()) {
                item.hidden = Some(1);
            }
        }
        items.extend(batch);

        seen_tokens.insert(token.clone());
        let next = match page.last_token {
            Some(t) if !seen_tokens.contains(&t) => t,
            _ => break,
        };
        if page.more_available == Some(false) {
            break;
        }

        debug!(fetched = items.len(), next_token = %next, "fetching next collection page");
        token = next;
    }

    Ok(items)
}

/// Keeps the entries an action can change: visible ones for hide, hidden ones
/// for unhide. Order is preserved.
pub fn select_targets(
    listing: &[CollectionItem],
    action: HideAction,
    fan_id: u64,
    crumb: Option<&str>,
) -> Vec<WorkItem> {
    listing
        .iter()
        .filter(|item| match action {
            HideAction::Hide => !item.is_hidden(),
            HideAction::Unhide => item.is_hidden(),
        })
        .map(|item| {
            WorkItem::collection(
                action,
                CollectionTarget {
                    fan_id,
                    item_id: item.item_id,
                    item_type: item.item_type,
                    crumb: crumb.map(str::to_owned),
                },
            )
        })
        .collect()
}

/// Hides or unhides one item with the two-attempt crumb policy.
pub async fn apply(
    api: &dyn BandcampApi,
    action: HideAction,
    target: &CollectionTarget,
) -> Result<(), ItemError> {
    let ok = api
        .hide_unhide(
            action,
            target.fan_id,
            target.item_type,
            target.item_id,
            target.crumb.as_deref(),
        )
        .await?;

    if ok { Ok(()) } else { Err(ItemError::Refused) }
}

/// Lists the fan's collection and runs the resulting batch.
///
/// Failing to list at all is reported once as the action's terminal error;
/// no progress state is emitted in that case.
#[instrument(skip(processor, crumb), fields(has_crumb = crumb.is_some()))]
pub async fn run(
    processor: &BatchProcessor,
    action: HideAction,
    crumb: Option<String>,
    page_size: usize,
) {
    let operation = Operation::from(action);

    match collect_targets(processor, action, crumb.as_deref(), page_size).await {
        Ok(items) => processor.run(items, operation).await,
        Err(e) => {
            error!(component = "collection", %action, error = %e, "Batch kickoff failed");
            processor
                .outbox()
                .send(CollectionResponse::error(operation, e.to_string()))
                .await;
        }
    }
}

async fn collect_targets(
    processor: &BatchProcessor,
    action: HideAction,
    crumb: Option<&str>,
    page_size: usize,
) -> Result<Vec<WorkItem>, AppError> {
    let api = processor.api();
    let limiter = processor.limiter();

    let summary = limiter
        .schedule(|| api.collection_summary())
        .await
        .map_err(|e| AppError::CollectionSummary(e.to_string()))?;

    let source = ListingSource::for_action(action);
    let listing = fetch_listing(
        api,
        limiter,
        summary.fan_id,
        source,
        page_size,
        initial_token(now_secs()),
    )
    .await
    .map_err(|e| AppError::Listing {
        what: source.describe(),
        reason: e.to_string(),
    })?;

    let targets = select_targets(&listing, action, summary.fan_id, crumb);
    info!(
        component = "collection",
        fan_id = summary.fan_id,
        listed = listing.len(),
        selected = targets.len(),
        "Collection listed"
    );
    Ok(targets)
}
