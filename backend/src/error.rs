use bclient::BandcampError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("A batch operation is already in progress")]
    BatchInProgress,

    #[error("A download is already in progress")]
    DownloadInProgress,

    #[error("Failed to get collection summary: {0}")]
    CollectionSummary(String),

    #[error("Failed to fetch {what}: {reason}")]
    Listing { what: &'static str, reason: String },

    #[error("malformed message: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// Why a single work item failed. The batch keeps going.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    Api(#[from] BandcampError),

    #[error("API returned false")]
    Refused,

    #[error("Item \"{0}\" is not purchasable")]
    NotPurchasable(String),

    #[error("No minimum price known for currency {0:?}")]
    UnknownCurrency(String),
}
