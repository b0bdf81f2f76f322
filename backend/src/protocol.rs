//! Messages exchanged over the two port kinds.
//!
//! The collection port uses externally tagged objects
//! (`{"hide": {"crumb": "..."}}`), the download port uses a `type` field
//! (`{"type": "downloadZip", "urls": [...]}`). Both shapes are what the
//! extension's content scripts already speak.

use bclient::ItemType;
use serde::{Deserialize, Serialize};

use crate::batch::state::{BatchState, Operation};
use crate::transport::ChunkEnvelope;

/// Port used for hide/unhide and cart import.
pub const COLLECTION_PORT: &str = "bes";

/// Port used for bulk zip downloads.
pub const DOWNLOAD_PORT: &str = "bes-download";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CrumbPayload {
    #[serde(default)]
    pub crumb: Option<String>,
}

/// One entry of an exported cart, as produced by the extension.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CartImportItem {
    pub item_id: u64,
    pub item_type: ItemType,
    #[serde(default)]
    pub item_title: String,
    #[serde(default)]
    pub band_name: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub unit_price: Option<f64>,
}

/// Instruction for the page to put an item in the cart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CartAddRequest {
    pub item_id: u64,
    /// `a` or `t`, as the cart endpoint expects.
    pub item_type: String,
    pub item_title: String,
    pub band_name: String,
    pub unit_price: f64,
    pub currency: String,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum CollectionRequest {
    Hide(CrumbPayload),
    Unhide(CrumbPayload),
    CartImport { items: Vec<CartImportItem> },
    CartUrlImport { urls: Vec<String> },
    GetCartImportState(bool),
    GetUnhideState(bool),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum CollectionResponse {
    HideState(BatchState),
    UnhideState(BatchState),
    CartImportState(BatchState),

    CartAddRequest(CartAddRequest),
    CartItemError { message: String },
    HideItemError { message: String },
    UnhideItemError { message: String },

    HideComplete { message: String },
    UnhideComplete { message: String },
    CartImportComplete { message: String },

    HideError { message: String },
    UnhideError { message: String },
    CartImportError { message: String },
}

impl CollectionResponse {
    /// Progress snapshot keyed the way the page listens for it.
    pub fn state(state: BatchState) -> Self {
        match state.operation {
            Operation::Hide => CollectionResponse::HideState(state),
            Operation::Unhide => CollectionResponse::UnhideState(state),
            Operation::CartImport | Operation::UrlImport => {
                CollectionResponse::CartImportState(state)
            }
        }
    }

    pub fn complete(operation: Operation, message: String) -> Self {
        match operation {
            Operation::Hide => CollectionResponse::HideComplete { message },
            Operation::Unhide => CollectionResponse::UnhideComplete { message },
            Operation::CartImport | Operation::UrlImport => {
                CollectionResponse::CartImportComplete { message }
            }
        }
    }

    pub fn error(operation: Operation, message: String) -> Self {
        match operation {
            Operation::Hide => CollectionResponse::HideError { message },
            Operation::Unhide => CollectionResponse::UnhideError { message },
            Operation::CartImport | Operation::UrlImport => {
                CollectionResponse::CartImportError { message }
            }
        }
    }

    pub fn item_error(operation: Operation, message: String) -> Self {
        match operation {
            Operation::Hide => CollectionResponse::HideItemError { message },
            Operation::Unhide => CollectionResponse::UnhideItemError { message },
            Operation::CartImport | Operation::UrlImport => {
                CollectionResponse::CartItemError { message }
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DownloadRequest {
    DownloadZip { urls: Vec<String> },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DownloadResponse {
    DownloadProgress {
        completed: usize,
        failed: usize,
        total: usize,
        message: String,
    },
    ZipChunk(ChunkEnvelope),
    DownloadComplete {
        success: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}
