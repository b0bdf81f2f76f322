use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bclient::HideAction;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Hide,
    Unhide,
    CartImport,
    UrlImport,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Hide => "hide",
            Operation::Unhide => "unhide",
            Operation::CartImport => "cart_import",
            Operation::UrlImport => "url_import",
        }
    }

    /// Completion text for a batch that found nothing to do.
    pub fn empty_message(self) -> &'static str {
        match self {
            Operation::Hide => "No visible items found",
            Operation::Unhide => "No hidden items found",
            Operation::CartImport | Operation::UrlImport => "No items found to import",
        }
    }

    /// Completion text once every item has been consumed.
    pub fn completion_message(self, succeeded: usize, failed: usize) -> String {
        match self {
            Operation::Hide | Operation::Unhide => {
                let done = if self == Operation::Hide { "hidden" } else { "unhidden" };
                if failed == 0 {
                    format!("Successfully {done} {succeeded} items")
                } else {
                    format!("{succeeded} items {done} with {failed} errors")
                }
            }
            Operation::CartImport | Operation::UrlImport => {
                if failed == 0 {
                    format!("Successfully added {succeeded} items to cart")
                } else {
                    format!(
                        "Successfully added {succeeded} items to cart. {failed} items could not be added"
                    )
                }
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HideAction> for Operation {
    fn from(action: HideAction) -> Self {
        match action {
            HideAction::Hide => Operation::Hide,
            HideAction::Unhide => Operation::Unhide,
        }
    }
}

/// Progress of the batch running on one port.
///
/// `processed_count` counts consumed items, successful or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchState {
    pub is_processing: bool,
    pub processed_count: usize,
    pub total_count: usize,
    pub errors: Vec<String>,
    pub operation: Operation,
}

impl BatchState {
    pub fn idle(operation: Operation) -> Self {
        Self {
            is_processing: false,
            processed_count: 0,
            total_count: 0,
            errors: Vec::new(),
            operation,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.processed_count.saturating_sub(self.errors.len())
    }
}

/// Owner of a port's `BatchState` plus the flag that keeps batches from
/// overlapping on that port.
///
/// All mutation and snapshotting go through one lock, so a reader never
/// observes a half-applied update.
#[derive(Clone)]
pub struct BatchTracker {
    state: Arc<Mutex<BatchState>>,
    busy: Arc<AtomicBool>,
}

impl Default for BatchTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BatchState::idle(Operation::Unhide))),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn snapshot(&self) -> BatchState {
        self.state.lock().clone()
    }

    /// Reserves the port for one batch. `None` while another batch holds it.
    pub fn try_claim(&self) -> Option<BatchClaim> {
        BatchClaim::acquire(&self.busy)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub(crate) fn begin(&self, operation: Operation, total: usize) -> BatchState {
        let mut s = self.state.lock();
        *s = BatchState {
            is_processing: true,
            processed_count: 0,
            total_count: total,
            errors: Vec::new(),
            operation,
        };
        s.clone()
    }

    /// Marks one more item consumed, with its error if it failed.
    pub(crate) fn record(&self, error: Option<String>) -> BatchState {
        let mut s = self.state.lock();
        s.processed_count = (s.processed_count + 1).min(s.total_count);
        if let Some(e) = error {
            s.errors.push(e);
        }
        s.clone()
    }

    pub(crate) fn finish(&self) -> BatchState {
        let mut s = self.state.lock();
        s.is_processing = false;
        s.clone()
    }
}

/// Held for the lifetime of a batch; releases the port when dropped, even if
/// the task holding it panics.
pub struct BatchClaim {
    busy: Arc<AtomicBool>,
}

impl BatchClaim {
    /// Sets `busy`, or returns `None` if it is already set.
    pub fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy: busy.clone() })
    }
}

impl Drop for BatchClaim {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
