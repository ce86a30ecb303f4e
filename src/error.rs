//! Error types for the sniper pipeline

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration / startup errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Insecure keypair permissions: {0}")]
    InsecureKeypair(String),

    #[error("Fatal startup error: {0}")]
    FatalStartup(String),

    // Network errors
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("HTTP error: {0}")]
    Http(String),

    // Event stream errors
    #[error("Event stream error: {0}")]
    Stream(String),

    #[error("Event stream disconnected")]
    StreamDisconnected,

    // Pump.fun protocol errors
    #[error("Bonding curve decode failed: {0}")]
    CurveDecode(String),

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    // Submission errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Simulation failed: {0}")]
    SimulationFailure(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Relay rejected bundle: {0}")]
    RelayRejection(String),

    #[error("Confirmation timed out for {signature} after {waited_ms}ms")]
    ConfirmationTimeout { signature: String, waited_ms: u64 },

    #[error("Transaction {signature} landed with error: {reason}")]
    TransactionFailed { signature: String, reason: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    // Budget / position errors
    #[error("Fee budget exceeded: spent {spent_lamports} of {limit_lamports} lamports")]
    BudgetExceeded {
        spent_lamports: u64,
        limit_lamports: u64,
    },

    #[error("Position already live for {0}")]
    PositionAlreadyLive(String),

    #[error("Invalid position transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientNetwork(_)
                | Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::Http(_)
                | Error::TransactionSend(_)
                | Error::StreamDisconnected
        )
    }

    /// Errors that must stop the entry loop rather than skip a candidate
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FatalStartup(_)
                | Error::InsecureKeypair(_)
                | Error::InvalidKeypair(_)
                | Error::Internal(_)
        )
    }

    /// Outcome of the submission is unknown and must be reconciled later
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, Error::ConfirmationTimeout { .. })
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::TransientNetwork(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Rpc("503".into()).is_retryable());
        assert!(Error::TransactionSend("blockhash not found".into()).is_retryable());
        assert!(!Error::SimulationFailure("custom program error".into()).is_retryable());
        assert!(!Error::RelayRejection("bundle dropped".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::FatalStartup("no keypair".into()).is_fatal());
        assert!(!Error::BudgetExceeded {
            spent_lamports: 10,
            limit_lamports: 5
        }
        .is_fatal());
        assert!(Error::ConfirmationTimeout {
            signature: "sig".into(),
            waited_ms: 1000
        }
        .is_unknown_outcome());
    }

    #[test]
    fn test_retries_exhausted_message_carries_last_error() {
        let err = Error::RetriesExhausted {
            attempts: 3,
            last: Box::new(Error::TransactionSend("node is behind".into())),
        };
        assert!(err.to_string().contains("node is behind"));
    }
}
