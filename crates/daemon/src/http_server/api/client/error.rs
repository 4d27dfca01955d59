use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
