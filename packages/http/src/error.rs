use crate::types::Payload;

/// A response arrived but its status was not successful.
///
/// `description` holds the decoded response body, whatever its content type.
#[derive(thiserror::Error, Debug)]
#[error("HTTP {code} {message}")]
pub struct FetchError {
    pub code: u16,
    pub message: String,
    pub description: Payload,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("No base URL configured for relative path '{path}'")]
    MissingBaseUrl { path: String },

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Multipart error: {message}")]
    Multipart { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl Error {
    /// Status code of a completed-but-unsuccessful response.
    pub fn status(&self) -> Option<u16> {
        self.as_fetch().map(|e| e.code)
    }

    pub fn as_fetch(&self) -> Option<&FetchError> {
        match self {
            Error::Fetch(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
