use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    StatusError(u16),

    #[error("invalid start URL: {0}")]
    InvalidStartUrl(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
