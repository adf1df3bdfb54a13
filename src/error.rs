//! Error types for novelpub operations.

use thiserror::Error;

/// Errors that can occur while converting, packaging or inspecting a book.
///
/// Only `Io` and `Zip` abort a conversion. The remaining variants describe
/// optional inputs that the pipeline recovers from by falling back.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Could not determine text encoding: {0}")]
    DecodingAmbiguity(String),

    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Invalid cover URL: {0}")]
    InvalidCoverUrl(String),

    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[cfg(feature = "cli")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the archive could not be produced.
    ///
    /// Everything else is an optional input going missing.
    pub fn is_packaging_failure(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Zip(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
