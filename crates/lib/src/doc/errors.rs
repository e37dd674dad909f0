//! Error types for document and wrapper operations.

use thiserror::Error;

/// Structured error types for document, map and array operations.
///
/// Every variant is raised before any mutation is applied, so a failed call
/// leaves the document untouched.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CrdtError {
    /// The binding already belongs to a wrapper or a parent
    #[error("Binding {binding} is already bound")]
    AlreadyBound { binding: String },

    /// A typed lookup named a key or zid that is not present
    #[error("No typed element at {key}")]
    MissingTypedElement { key: String },

    /// Push and delete accept exactly one element per call
    #[error("{operation} supports exactly one element per call, got {len}")]
    UnsupportedBatchSize { operation: String, len: usize },

    /// The slot holds something other than what was asked for
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Positional access past the end of an array
    #[error("Index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The wrapper's binding has been removed from the document
    #[error("Wrapper binding has been released")]
    Released,

    /// The wrapper belongs to a different document
    #[error("Wrapper belongs to another document")]
    ForeignDocument,

    /// Attaching the binding would make it its own ancestor
    #[error("Binding {binding} cannot be nested inside itself")]
    CyclicBinding { binding: String },

    /// Parent links and slot contents disagree
    #[error("Corrupt binding tree: {reason}")]
    CorruptBinding { reason: String },

    /// A whole-document operation was attempted inside an open transaction
    #[error("Operation not allowed while a transaction is open")]
    TransactionInProgress,
}

impl CrdtError {
    /// Check if this error is a double-binding attempt
    pub fn is_already_bound(&self) -> bool {
        matches!(self, CrdtError::AlreadyBound { .. })
    }

    /// Check if this error is related to element lookup
    pub fn is_not_found_error(&self) -> bool {
        matches!(
            self,
            CrdtError::MissingTypedElement { .. } | CrdtError::IndexOutOfBounds { .. }
        )
    }

    /// Check if this error rejected a batched push or delete
    pub fn is_batch_size_error(&self) -> bool {
        matches!(self, CrdtError::UnsupportedBatchSize { .. })
    }

    /// Check if this error is related to type mismatches
    pub fn is_type_error(&self) -> bool {
        matches!(self, CrdtError::TypeMismatch { .. })
    }

    /// Check if this error came from a wrapper that is no longer usable here
    pub fn is_detached_error(&self) -> bool {
        matches!(self, CrdtError::Released | CrdtError::ForeignDocument)
    }

    /// Check if this error indicates an internal inconsistency
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            CrdtError::CorruptBinding { .. } | CrdtError::CyclicBinding { .. }
        )
    }

    /// Get the key if this is a key-related error
    pub fn key(&self) -> Option<&str> {
        match self {
            CrdtError::MissingTypedElement { key } => Some(key),
            _ => None,
        }
    }
}

impl From<CrdtError> for crate::Error {
    fn from(err: CrdtError) -> Self {
        crate::Error::Crdt(err)
    }
}
