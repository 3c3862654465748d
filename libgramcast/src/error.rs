//! Error types for Gramcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GramcastError>;

#[derive(Error, Debug)]
pub enum GramcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Caption fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Graph API error: {0}")]
    Remote(#[from] RemoteError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    /// The container never reached FINISHED (error status or poll bound exhausted)
    #[error("Media container {0} failed readiness")]
    ReadinessTimeout(String),

    #[error("{0}")]
    NoContentAvailable(String),

    #[error("No slides selected")]
    NoSelection,

    #[error("Invalid account index: {0}")]
    AccountNotFound(usize),

    #[error("A run is already in progress for state key '{0}'")]
    RunInProgress(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GramcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GramcastError::Config(_) => 2,
            GramcastError::NoSelection
            | GramcastError::InvalidInput(_)
            | GramcastError::AccountNotFound(_) => 3,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Missing environment var {0}")]
    MissingCredential(String),

    #[error("Invalid account: {0}")]
    InvalidAccount(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch caption_url {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Caption list is empty ({0})")]
    EmptyCaptionList(String),
}

/// Failures reported by the Graph API, split by call site
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Carousel container creation error: {0}")]
    ContainerCreation(String),

    #[error("media_publish error: {0}")]
    Publish(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON data: {0}")]
    Serialize(#[from] serde_json::Error),
}
