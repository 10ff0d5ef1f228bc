use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid quote response: {0}")]
    InvalidResponse(String),

    #[error("No quote available for fund {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Subscriber is closed")]
    Closed,

    #[error("Send timed out")]
    Timeout,

    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Refresh interval must be at least one second")]
    InvalidInterval,

    #[error("No position held for fund {0}")]
    UnknownFund(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
