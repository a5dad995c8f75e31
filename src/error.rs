//! Error types for audit-trail

use thiserror::Error;

/// Errors that can occur in the audit subsystem
#[derive(Debug, Error)]
pub enum AuditError {
    /// Entity type has no registered describer — capture skips it, never fatal
    #[error("No describer registered for entity type '{0}'")]
    UnregisteredEntity(String),

    /// A field value could not be encoded — recovered locally with a
    /// fallback marker and logged
    #[error("Failed to encode field '{field}' of '{entity}': {reason}")]
    Serialization {
        entity: String,
        field: String,
        reason: String,
    },

    /// Primary key could not be read after identity assignment — fatal,
    /// the audit record would be unaddressable
    #[error("Failed to extract primary key for '{entity}': {reason}")]
    KeyExtraction { entity: String, reason: String },

    /// The host change tracker itself failed — fatal, aborts the commit
    #[error("Change enumeration failed: {0}")]
    HostEnumeration(String),

    /// Audit store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Entity or row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Registry or pipeline configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
