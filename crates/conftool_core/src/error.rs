use thiserror::Error;

/// Failures surfaced by reference resolution, API calls, and tree walks.
#[derive(Debug, Error)]
pub enum Error {
    /// The input matches no recognized page reference shape, or a required
    /// component (such as a numeric content ID) is missing or zero.
    #[error("not a recognized page reference: {0}")]
    MalformedReference(String),

    /// A title/space search returned zero or more than one match.
    #[error("{0}")]
    AmbiguousReference(String),

    /// Tiny-link decoding was attempted on a string without the `/x/<code>` shape.
    #[error("not a tiny link: {0}")]
    NotATinyLink(String),

    /// Non-success HTTP status from the remote system.
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Network-level failure in the underlying transport.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// A response document is missing a field the caller depends on.
    #[error("unexpected response from {url}: {detail}")]
    UnexpectedResponse { url: String, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
