use bclient::{HideAction, ItemType};

use crate::error::ItemError;
use crate::protocol::CartImportItem;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkKind {
    Hide,
    Unhide,
    CartAdd,
    UrlImport,
}

/// Everything a hide/unhide call needs for one collection entry.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionTarget {
    pub fan_id: u64,
    pub item_id: u64,
    pub item_type: ItemType,
    pub crumb: Option<String>,
}

/// One unit of batch work, consumed exactly once.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkItem {
    Hide(CollectionTarget),
    Unhide(CollectionTarget),
    CartAdd(CartImportItem),
    UrlImport(String),
}

impl WorkItem {
    pub fn collection(action: HideAction, target: CollectionTarget) -> Self {
        match action {
            HideAction::Hide => WorkItem::Hide(target),
            HideAction::Unhide => WorkItem::Unhide(target),
        }
    }

    pub fn kind(&self) -> WorkKind {
        match self {
            WorkItem::Hide(_) => WorkKind::Hide,
            WorkItem::Unhide(_) => WorkKind::Unhide,
            WorkItem::CartAdd(_) => WorkKind::CartAdd,
            WorkItem::UrlImport(_) => WorkKind::UrlImport,
        }
    }

    /// `None` for URL imports until the page has been read.
    pub fn item_id(&self) -> Option<u64> {
        match self {
            WorkItem::Hide(t) | WorkItem::Unhide(t) => Some(t.item_id),
            WorkItem::CartAdd(i) => Some(i.item_id),
            WorkItem::UrlImport(_) => None,
        }
    }

    /// Short human label for logs.
    pub fn label(&self) -> String {
        match self {
            WorkItem::Hide(t) | WorkItem::Unhide(t) => format!("{} {}", t.item_type, t.item_id),
            WorkItem::CartAdd(i) if !i.item_title.is_empty() => {
                format!("\"{}\" ({})", i.item_title, i.item_id)
            }
            WorkItem::CartAdd(i) => i.item_id.to_string(),
            WorkItem::UrlImport(url) => url.clone(),
        }
    }

    /// The text recorded in `BatchState::errors` for a failed item.
    pub fn failure_message(&self, err: &ItemError) -> String {
        match (self, err) {
            (WorkItem::Hide(t), ItemError::Refused) => {
                format!("Failed to hide item {} - API returned false", t.item_id)
            }
            (WorkItem::Unhide(t), ItemError::Refused) => {
                format!("Failed to unhide item {} - API returned false", t.item_id)
            }
            (WorkItem::Hide(t), _) => format!("Error hiding item {}: {err}", t.item_id),
            (WorkItem::Unhide(t), _) => format!("Error unhiding item {}: {err}", t.item_id),
            (WorkItem::CartAdd(i), _) => format!("Error processing item {}: {err}", i.item_id),
            (WorkItem::UrlImport(url), _) => format!("Error processing URL {url}: {err}"),
        }
    }
}
