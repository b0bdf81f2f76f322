pub mod processor;
pub mod state;
pub mod work;

pub use processor::BatchProcessor;
pub use state::{BatchClaim, BatchState, BatchTracker, Operation};
pub use work::{CollectionTarget, WorkItem, WorkKind};
