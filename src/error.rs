use thiserror::Error;

/// Unified error type for the Prospector core
#[derive(Error, Debug)]
pub enum ProspectorError {
    // Engine errors
    #[error("Engine failed to start proxy on port {port}")]
    EngineStart { port: u16 },

    // Pool errors
    #[error("No working backends available")]
    NoBackendsAvailable,

    #[error("Port pool exhausted")]
    PortPoolExhausted,

    // Persistence errors
    #[error("Persist error: {0}")]
    Persist(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Messaging errors
    #[error("Messaging error: {0}")]
    Messaging(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Prospector operations
pub type Result<T> = std::result::Result<T, ProspectorError>;

impl ProspectorError {
    /// Whether the error should abort the current cycle
    ///
    /// Per-item failures never abort loops; only configuration problems
    /// surface to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProspectorError::InvalidConfig(_))
    }
}
