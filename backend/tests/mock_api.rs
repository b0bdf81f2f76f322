#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use bclient::{
    BandcampApi, BandcampError, CollectionItem, CollectionPage, CollectionSummary,
    DownloadedFile, FileSource, HideAction, HideUnhideOutcome, ItemType, PageProperties,
    TralbumDetails,
};

/// In-memory Bandcamp. Listing pages are served in order, then empty pages.
#[derive(Default)]
pub struct MockBandcamp {
    pub fan_id: u64,
    pub summary_fails: bool,
    pub listing_fails: bool,
    pub visible_pages: Mutex<VecDeque<CollectionPage>>,
    pub hidden_pages: Mutex<VecDeque<CollectionPage>>,

    /// Items whose hide/unhide is refused by the server.
    pub refuse_ids: HashSet<u64>,
    pub hide_delay: Option<Duration>,

    pub details: HashMap<u64, TralbumDetails>,
    pub pages: HashMap<String, PageProperties>,
    pub files: HashMap<String, DownloadedFile>,
    pub file_delay: Option<Duration>,
    /// Fetching this URL panics, standing in for a bug deep in a download.
    pub panic_url: Option<String>,

    pub hide_calls: AtomicUsize,
    pub applied: Mutex<Vec<(HideAction, u64)>>,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl MockBandcamp {
    pub fn new(fan_id: u64) -> Self {
        Self {
            fan_id,
            ..Default::default()
        }
    }

    pub fn with_visible_pages(self, pages: Vec<CollectionPage>) -> Self {
        *self.visible_pages.lock() = pages.into();
        self
    }

    pub fn with_hidden_pages(self, pages: Vec<CollectionPage>) -> Self {
        *self.hidden_pages.lock() = pages.into();
        self
    }

    pub fn hide_calls(&self) -> usize {
        self.hide_calls.load(Ordering::SeqCst)
    }

    pub fn applied_ids(&self) -> Vec<u64> {
        self.applied.lock().iter().map(|(_, id)| *id).collect()
    }

    fn next_page(
        &self,
        queue: &Mutex<VecDeque<CollectionPage>>,
        token: &str,
    ) -> Result<CollectionPage, BandcampError> {
        self.tokens_seen.lock().push(token.to_string());
        if self.listing_fails {
            return Err(BandcampError::InvalidResponse("listing unavailable".into()));
        }
        Ok(queue.lock().pop_front().unwrap_or_default())
    }
}

pub fn item(item_id: u64, hidden: Option<u32>) -> CollectionItem {
    CollectionItem {
        item_id,
        item_type: ItemType::Album,
        hidden,
        item_title: Some(format!("Album {item_id}")),
        band_name: Some("Band".into()),
    }
}

pub fn page(items: Vec<CollectionItem>, more_available: bool, last_token: &str) -> CollectionPage {
    CollectionPage {
        items,
        more_available: Some(more_available),
        last_token: Some(last_token.to_string()),
    }
}

pub fn details(id: u64, price: f64, currency: &str) -> TralbumDetails {
    TralbumDetails {
        id,
        item_type: ItemType::Album,
        title: format!("Album {id}"),
        tralbum_artist: "Band".into(),
        price,
        currency: currency.into(),
        is_purchasable: true,
        bandcamp_url: format!("https://band.bandcamp.com/album/{id}"),
    }
}

#[async_trait]
impl BandcampApi for MockBandcamp {
    async fn collection_summary(&self) -> Result<CollectionSummary, BandcampError> {
        if self.summary_fails {
            return Err(BandcampError::InvalidResponse("not logged in".into()));
        }
        Ok(CollectionSummary {
            fan_id: self.fan_id,
            username: Some("fan".into()),
            url: None,
            tralbum_lookup: HashMap::new(),
        })
    }

    async fn collection_items(
        &self,
        _fan_id: u64,
        older_than_token: &str,
        _count: usize,
    ) -> Result<CollectionPage, BandcampError> {
        self.next_page(&self.visible_pages, older_than_token)
    }

    async fn hidden_items(
        &self,
        _fan_id: u64,
        older_than_token: &str,
        _count: usize,
    ) -> Result<CollectionPage, BandcampError> {
        self.next_page(&self.hidden_pages, older_than_token)
    }

    async fn hide_unhide_once(
        &self,
        action: HideAction,
        _fan_id: u64,
        _item_type: ItemType,
        item_id: u64,
        _crumb: Option<&str>,
    ) -> Result<HideUnhideOutcome, BandcampError> {
        self.hide_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.hide_delay {
            tokio::time::sleep(delay).await;
        }

        if self.refuse_ids.contains(&item_id) {
            return Ok(HideUnhideOutcome::Rejected {
                error: "not allowed".into(),
            });
        }
        self.applied.lock().push((action, item_id));
        Ok(HideUnhideOutcome::Ok)
    }

    async fn tralbum_details(
        &self,
        item_id: u64,
        _item_type: ItemType,
    ) -> Result<TralbumDetails, BandcampError> {
        self.details
            .get(&item_id)
            .cloned()
            .ok_or_else(|| BandcampError::InvalidResponse(format!("no tralbum {item_id}")))
    }

    async fn page_properties(&self, url: &str) -> Result<PageProperties, BandcampError> {
        self.pages
            .get(url)
            .copied()
            .ok_or_else(|| BandcampError::PageParse(format!("no page properties at {url}")))
    }
}

#[async_trait]
impl FileSource for MockBandcamp {
    async fn fetch_file(&self, url: &str) -> Result<DownloadedFile, BandcampError> {
        if let Some(delay) = self.file_delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_url.as_deref() == Some(url) {
            panic!("file source failed on {url}");
        }
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| BandcampError::Download(format!("{url} returned 404 Not Found")))
    }
}
