use thiserror::Error;

#[derive(Error, Debug)]
pub enum WidgetError {
    #[error("Secret store error: {0}")]
    SecretStore(#[from] keyring::Error),

    #[error("Spotify credentials not present in the secret store")]
    MissingCredentials,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("UI error: {0}")]
    Ui(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WidgetError>;

/// Classified outcome of a single "what is playing now" query. The poll
/// engine matches on this exhaustively and turns each kind into a scheduling
/// decision; none of these ever propagate past a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Credentials are expired or invalid. Requires re-authentication but
    /// must never crash the process.
    #[error("Spotify authorization rejected: {0}")]
    Auth(String),

    /// Transient network slowness; retried silently.
    #[error("Spotify query timed out")]
    Timeout,

    /// Any other API or network failure; retried at a reduced rate.
    #[error("Spotify query failed: {0}")]
    Api(String),
}
