use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("Upstream returned an empty response body")]
    EmptyResponse,

    #[error("Malformed CSV response: expected annotation, header and data lines")]
    MalformedResponse,
}

pub type Result<T> = std::result::Result<T, Error>;
