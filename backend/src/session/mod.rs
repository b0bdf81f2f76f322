//! One session per connected port, driven by that port's inbound messages.

pub mod collection;
pub mod download;

pub use collection::CollectionSession;
pub use download::DownloadSession;
