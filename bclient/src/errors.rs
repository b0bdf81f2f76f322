use thiserror::Error;

#[derive(Error, Debug)]
pub enum BandcampError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from bandcamp: {0}")]
    InvalidResponse(String),

    #[error("could not read page metadata: {0}")]
    PageParse(String),

    #[error("download failed: {0}")]
    Download(String),
}
