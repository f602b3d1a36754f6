use thiserror::Error;

/// Main error type for the Weave ledger
#[derive(Error, Debug)]
pub enum WeaveError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Threshold error: {0}")]
    Threshold(#[from] ThresholdError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Cryptographic operation errors
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// Ledger graph and mempool errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Transaction already exists: {0}")]
    DuplicateTransaction(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Mempool full: capacity {capacity}")]
    MempoolFull { capacity: usize },

    #[error("Unknown ledger: {0}")]
    UnknownLedger(String),
}

/// Consensus validation errors.
///
/// These are raised by a policy when it cannot decide, as opposed to
/// deciding `false`. The mempool drain treats them as transient.
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Transaction validation failed: {0}")]
    ValidationFailed(String),

    #[error("Consensus timeout")]
    Timeout,
}

/// Threshold secret sharing errors
#[derive(Error, Debug)]
pub enum ThresholdError {
    #[error("Participant already exists: {0}")]
    DuplicateParticipant(u32),

    #[error("Modulus cannot be zero")]
    ZeroModulus,

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Value has no modular inverse: {0}")]
    NotInvertible(String),

    #[error("Invalid share: {0}")]
    InvalidShare(String),
}

/// Persistence gateway errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Serialization/deserialization errors
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonFailed(#[from] serde_json::Error),
}

/// Result type alias for Weave operations
pub type WeaveResult<T> = Result<T, WeaveError>;

impl From<serde_json::Error> for WeaveError {
    fn from(err: serde_json::Error) -> Self {
        WeaveError::Serialization(SerializationError::JsonFailed(err))
    }
}

/// Utility functions for error handling
impl WeaveError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WeaveError::Consensus(ConsensusError::ValidationFailed(_))
                | WeaveError::Consensus(ConsensusError::Timeout)
                | WeaveError::Storage(StorageError::Unavailable(_))
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WeaveError::Crypto(_) => ErrorSeverity::Critical,
            WeaveError::Config(_) => ErrorSeverity::High,
            WeaveError::Threshold(_) => ErrorSeverity::High,
            WeaveError::Consensus(_) => ErrorSeverity::Medium,
            WeaveError::Storage(_) => ErrorSeverity::Medium,
            _ => ErrorSeverity::Low,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// Error context for better debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub operation: String,
    pub transaction_id: Option<String>,
    pub participant_id: Option<u32>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            transaction_id: None,
            participant_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_transaction(mut self, transaction_id: &str) -> Self {
        self.transaction_id = Some(transaction_id.to_string());
        self
    }

    pub fn with_participant(mut self, participant_id: u32) -> Self {
        self.participant_id = Some(participant_id);
        self
    }
}

/// Macro for creating contextual errors
#[macro_export]
macro_rules! weave_error {
    ($error:expr, $context:expr) => {{
        let error = $crate::error::WeaveError::from($error);
        tracing::error!(
            error = %error,
            severity = ?error.severity(),
            context = ?$context,
            "Weave error occurred"
        );
        error
    }};
}

/// Macro for creating and logging errors with context
#[macro_export]
macro_rules! weave_bail {
    ($error:expr, $operation:expr) => {
        return Err($crate::weave_error!(
            $error,
            $crate::error::ErrorContext::new($operation)
        ))
    };
    ($error:expr, $operation:expr, transaction = $transaction:expr) => {
        return Err($crate::weave_error!(
            $error,
            $crate::error::ErrorContext::new($operation).with_transaction($transaction)
        ))
    };
    ($error:expr, $operation:expr, participant = $participant:expr) => {
        return Err($crate::weave_error!(
            $error,
            $crate::error::ErrorContext::new($operation).with_participant($participant)
        ))
    };
}
