//!
//! zdoc: a replicated, observable document model.
//!
//! A document is a tree of maps and arrays holding plain values. Every local
//! mutation is captured as an event, batched per transaction, and emitted as a
//! compact binary update that peers apply to converge on the same content.
//!
//! ## Core Concepts
//!
//! * **Documents (`doc::Doc`)**: Own the binding tree, the logical clock and the
//!   history used to rebase concurrent updates.
//! * **Wrappers (`doc::Map`, `doc::Array`)**: Handles to container bindings.
//!   Wrappers are stable: every handle to a binding shares observers and keeps
//!   pointing at it across state resets.
//! * **Events (`event::Event`)**: One mutation each, addressed by a
//!   [`path::KeyPath`] from the document root.
//! * **Transactions (`transaction::TransactionCache`)**: The batch that travels
//!   on the wire, stamped with the clock it started at and the sender's resolve
//!   priority.
//! * **Sync (`sync`)**: Encoding full state, and applying updates with rebase
//!   of concurrent writes. The lower resolve priority wins a conflict.
//!
//! ```
//! use zdoc::{Doc, apply_update};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let alice = Doc::new();
//! let bob = Doc::new();
//!
//! let outbox = Rc::new(RefCell::new(Vec::new()));
//! let sink = outbox.clone();
//! alice.on_update(move |event| sink.borrow_mut().push(event.update.to_vec()));
//!
//! alice.get_map("root")?.set("greeting", "hello")?;
//! for update in outbox.borrow().iter() {
//!     apply_update(&bob, update, None)?;
//! }
//! assert_eq!(bob.to_json(), alice.to_json());
//! # Ok::<(), zdoc::Error>(())
//! ```

pub mod binding;
pub mod codec;
pub mod constants;
pub mod doc;
pub mod event;
pub mod path;
pub mod sync;
pub mod transaction;
pub mod value;

pub use doc::{Action, Array, Change, Doc, DocOptions, Entry, Map, Member, ObserverId, UpdateEvent};
pub use path::KeyPath;
pub use sync::{apply_update, encode_state_as_update};
pub use transaction::{HistoryEntry, Origin};
pub use value::{TypedBuffer, Value};

/// Result type used throughout the zdoc library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the zdoc library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured document errors from the doc module
    #[error(transparent)]
    Crdt(doc::CrdtError),

    /// Structured protocol errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),

    /// Value codec errors
    #[error(transparent)]
    Codec(codec::CodecError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Serialize(_) => "serialize",
            Error::Crdt(_) => "doc",
            Error::Sync(_) => "sync",
            Error::Codec(_) => "codec",
        }
    }

    /// Check if this error indicates a missing key or element.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Crdt(crdt_err) => crdt_err.is_not_found_error(),
            _ => false,
        }
    }

    /// Check if this error is type-related.
    pub fn is_type_mismatch(&self) -> bool {
        match self {
            Error::Crdt(crdt_err) => crdt_err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error comes from a released or foreign wrapper.
    pub fn is_detached_error(&self) -> bool {
        match self {
            Error::Crdt(crdt_err) => crdt_err.is_detached_error(),
            _ => false,
        }
    }

    /// Check if the receiver must be brought back in sync with a state reset.
    pub fn is_desync(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.needs_reset(),
            _ => false,
        }
    }

    /// Check if an update message could not be decoded.
    pub fn is_malformed_update(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_malformed(),
            Error::Codec(codec_err) => codec_err.is_decode_error(),
            Error::Crdt(crdt_err) => crdt_err.is_batch_size_error(),
            Error::Serialize(_) => false,
        }
    }

    /// Check if this error indicates a data integrity issue.
    pub fn is_integrity_error(&self) -> bool {
        match self {
            Error::Crdt(crdt_err) => crdt_err.is_integrity_error(),
            Error::Sync(sync::SyncError::ClockMismatch { .. } | sync::SyncError::ClockOverflow { .. }) => {
                true
            }
            _ => false,
        }
    }

    /// Check if this error is a codec failure.
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Error::Codec(_))
    }
}
