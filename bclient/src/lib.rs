//! Client for the Bandcamp web and mobile endpoints used by the backend.
//!
//! Everything here is a thin wrapper: the backend treats these calls as
//! black boxes and applies its own rate limiting on top.

pub mod api;
pub mod client;
pub mod currency;
pub mod errors;
pub mod filename;
pub mod page;
pub mod types;

pub use api::{BandcampApi, FileSource};
pub use client::BandcampClient;
pub use currency::minimum_price;
pub use errors::BandcampError;
pub use types::*;
