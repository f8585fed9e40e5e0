use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Malformed query string: {0}")]
    MalformedQuery(String),

    #[error("Invalid header: {0}")]
    Header(String),

    #[error("Cannot encode request body: {0}")]
    Encoding(String),

    #[error("File upload failed: {0}")]
    Upload(#[source] std::io::Error),

    #[error("Request exceeded redirect limit")]
    RedirectLimitExceeded,

    #[error("Cannot decode response body: {0}")]
    Decode(String),

    #[error("Response body already consumed")]
    BodyConsumed,

    #[error("Request hook failed: {0}")]
    Hook(String),

    #[error("{0}")]
    Failed(Arc<HttpError>),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// True for errors raised while assembling the request, before any
    /// network traffic happened.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            HttpError::UrlParse(_)
                | HttpError::MalformedQuery(_)
                | HttpError::Header(_)
                | HttpError::Encoding(_)
                | HttpError::Upload(_)
                | HttpError::Hook(_)
        )
    }
}
