//! Error types for the Move Everything installer

use thiserror::Error;

/// Main error type for installer operations
#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Device address not resolved: {0}")]
    NotResolved(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Device protocol error: {0}")]
    Protocol(String),

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("Key parsing error: {0}")]
    KeyParsing(String),

    #[error("Remote command `{command}` failed with exit status {exit_status}\n\nOutput:\n{stdout}\n\nErrors:\n{stderr}")]
    RemoteExecution {
        command: String,
        exit_status: i32,
        stdout: String,
        stderr: String,
    },

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("{tool} is required but was not found.\n\n{hint}")]
    MissingTool { tool: String, hint: String },

    #[error("Path must be within {root}: {path}")]
    PathOutsideModules { root: String, path: String },

    #[error("Not found on device: {0}")]
    NotFound(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation queue closed")]
    QueueClosed,

    #[error("Operation panicked: {0}")]
    OperationPanicked(String),
}

impl InstallerError {
    /// Whether the failure is about reaching the device rather than what it answered
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            InstallerError::Network(_)
                | InstallerError::Http(_)
                | InstallerError::Timeout(_)
                | InstallerError::NotResolved(_)
        )
    }
}

impl From<ssh2::Error> for InstallerError {
    fn from(err: ssh2::Error) -> Self {
        InstallerError::Ssh(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InstallerError>;
