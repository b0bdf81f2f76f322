pub mod batch;
pub mod cart;
pub mod collection;
pub mod config;
pub mod download;
pub mod metrics;
pub mod port;
pub mod protocol;
pub mod rate_limit;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;

pub mod error;
pub mod logger;
pub mod time;
