//! Error types for the update protocol.

use thiserror::Error;

/// Errors that can occur while decoding or applying update messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// The inbound transaction starts past the local clock.
    ///
    /// Recovering requires a full `STATE_RESET` from the peer.
    #[error("Transaction starts at clock {start_clock} but local clock is {clock}; desynced")]
    Desync { start_clock: u32, clock: u32 },

    /// The clock did not land where the transaction said it would.
    #[error("Clock out of sync after apply: expected {expected}, got {actual}")]
    ClockMismatch { expected: u32, actual: u32 },

    /// Applying more events would move the clock past `u32::MAX`.
    #[error("Clock {clock} cannot advance by {events} events")]
    ClockOverflow { clock: u32, events: usize },

    /// The inbound transaction reaches behind the retained history.
    #[error("Transaction starts at clock {start_clock} but history only reaches back to {oldest}")]
    HistoryTruncated { start_clock: u32, oldest: u32 },

    /// The message ended before a field could be read.
    #[error("Update truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// An embedded key path was not valid JSON of the expected shape.
    #[error("Invalid key path: {reason}")]
    InvalidKeyPath { reason: String },

    /// A map key was not valid UTF-8.
    #[error("Invalid UTF-8 in map key")]
    InvalidUtf8,

    /// A decoded state snapshot had the wrong shape.
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },
}

impl SyncError {
    /// Check if this error requires a full state reset to recover.
    pub fn needs_reset(&self) -> bool {
        matches!(
            self,
            SyncError::Desync { .. }
                | SyncError::ClockMismatch { .. }
                | SyncError::HistoryTruncated { .. }
        )
    }

    /// Check if this error came from malformed bytes.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            SyncError::Truncated { .. }
                | SyncError::InvalidKeyPath { .. }
                | SyncError::InvalidUtf8
                | SyncError::InvalidState { .. }
        )
    }
}

impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
