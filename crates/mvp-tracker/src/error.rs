//! Error types for the listing source.

/// Errors that can occur while fetching the kill listing.
///
/// A `SourceError` only ever aborts the current poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The HTTP client could not be built from configuration.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request failed or timed out, or the body could not be read.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Listing URL.
        url: String,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned {status}")]
    Status {
        /// Listing URL.
        url: String,
        /// Response status.
        status: reqwest::StatusCode,
    },

    /// The cell selector did not compile.
    #[error("invalid cell selector: {0}")]
    Selector(String),

    /// The listing file could not be read.
    #[error("failed to read listing file {path}: {source}")]
    File {
        /// Path of the listing file.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
