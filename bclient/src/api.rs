use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::BandcampError;
use crate::types::{
    CollectionPage, CollectionSummary, DownloadedFile, HideAction, HideUnhideOutcome, ItemType,
    PageProperties, TralbumDetails,
};

/// The Bandcamp calls the backend depends on.
///
/// Implementations only do HTTP. Pacing is the caller's job.
#[async_trait]
pub trait BandcampApi: Send + Sync + 'static {
    async fn collection_summary(&self) -> Result<CollectionSummary, BandcampError>;

    async fn collection_items(
        &self,
        fan_id: u64,
        older_than_token: &str,
        count: usize,
    ) -> Result<CollectionPage, BandcampError>;

    async fn hidden_items(
        &self,
        fan_id: u64,
        older_than_token: &str,
        count: usize,
    ) -> Result<CollectionPage, BandcampError>;

    /// A single hide/unhide attempt, reported as a structured outcome.
    async fn hide_unhide_once(
        &self,
        action: HideAction,
        fan_id: u64,
        item_type: ItemType,
        item_id: u64,
        crumb: Option<&str>,
    ) -> Result<HideUnhideOutcome, BandcampError>;

    /// Hide or unhide with the two-attempt crumb policy.
    ///
    /// If the first attempt is refused for a stale crumb and the server hands
    /// back a replacement, the call is repeated exactly once with it. Anything
    /// other than `Ok` after that is reported as `false`.
    async fn hide_unhide(
        &self,
        action: HideAction,
        fan_id: u64,
        item_type: ItemType,
        item_id: u64,
        crumb: Option<&str>,
    ) -> Result<bool, BandcampError> {
        let first = self
            .hide_unhide_once(action, fan_id, item_type, item_id, crumb)
            .await?;

        let outcome = match first {
            HideUnhideOutcome::InvalidCrumb { fresh: Some(fresh) } => {
                debug!(%action, item_id, "crumb rejected; retrying with replacement");
                self.hide_unhide_once(action, fan_id, item_type, item_id, Some(&fresh))
                    .await?
            }
            other => other,
        };

        match outcome {
            HideUnhideOutcome::Ok => Ok(true),
            HideUnhideOutcome::InvalidCrumb { .. } => {
                warn!(%action, item_id, "crumb still rejected after retry");
                Ok(false)
            }
            HideUnhideOutcome::Rejected { error } => {
                warn!(%action, item_id, %error, "hide_unhide rejected");
                Ok(false)
            }
        }
    }

    async fn tralbum_details(
        &self,
        item_id: u64,
        item_type: ItemType,
    ) -> Result<TralbumDetails, BandcampError>;

    /// Loads a release page and reads the item identity from its metadata.
    async fn page_properties(&self, url: &str) -> Result<PageProperties, BandcampError>;
}

/// Source of the files that go into a bulk-download archive.
#[async_trait]
pub trait FileSource: Send + Sync + 'static {
    async fn fetch_file(&self, url: &str) -> Result<DownloadedFile, BandcampError>;
}
