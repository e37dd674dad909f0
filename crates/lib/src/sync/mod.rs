//! Update protocol.
//!
//! Peers exchange two kinds of message, both starting with a `u32` tag:
//!
//! - `STATE_RESET`: `[tag][u32 clock][encoded root snapshot]`, produced by
//!   [`encode_state_as_update`]. Applying it replaces the receiver's content.
//! - `TRANSACTION`: one batch of events as emitted through
//!   [`Doc::on_update`](crate::Doc::on_update).
//!
//! A transaction that started at the receiver's clock applies as is. One that
//! started earlier is rebased onto the receiver's history first (see
//! [`crate::transaction`]). One that started later means messages were lost;
//! the receiver rejects it with [`SyncError::Desync`] and needs a state reset.
//!
//! Transports are out of scope: relaying is up to the caller, with the bytes
//! handed to `update` handlers.

pub mod error;

pub use error::SyncError;

use tracing::{debug, warn};

use crate::binding::State;
use crate::codec;
use crate::constants::{STATE_RESET, TRANSACTION};
use crate::doc::{CrdtError, Doc};
use crate::event::wire::{Reader, Writer};
use crate::transaction::{Origin, TransactionCache};
use crate::Result;

/// Serializes the whole document as a `STATE_RESET` message.
pub fn encode_state_as_update(doc: &Doc) -> Result<Vec<u8>> {
    let state = doc.snapshot();
    let encoded = codec::encode(&state)?;
    let mut w = Writer::with_capacity(8 + encoded.len());
    w.u32(STATE_RESET);
    w.u32(doc.clock());
    w.raw(&encoded);
    Ok(w.into_bytes())
}

/// Applies an update message produced by a peer.
///
/// `origin` is passed through to this document's `update` handlers. Messages
/// with an unknown tag are ignored.
pub fn apply_update(doc: &Doc, update: &[u8], origin: Option<Origin>) -> Result<()> {
    let mut r = Reader::new(update);
    match r.u32()? {
        STATE_RESET => {
            let clock = r.u32()?;
            let state: State = codec::decode(r.rest())?;
            doc.set_clock_state(clock, state)
        }
        TRANSACTION => apply_transaction(doc, update, origin),
        other => {
            warn!(method = other, "Ignoring update with unknown method");
            Ok(())
        }
    }
}

fn apply_transaction(doc: &Doc, update: &[u8], origin: Option<Origin>) -> Result<()> {
    let shared = doc.shared();
    let mut cache = TransactionCache::deserialize_update(update)?;
    cache.set_origin(origin);

    let expected = {
        let mut inner = shared.borrow_mut();
        if inner.depth > 0 {
            return Err(CrdtError::TransactionInProgress.into());
        }
        let start_clock = cache.start_clock();
        let clock = inner.clock;
        if start_clock > clock {
            warn!(start_clock, clock, "Transaction is ahead of the local clock");
            return Err(SyncError::Desync { start_clock, clock }.into());
        }
        if start_clock < clock {
            let priority = inner.resolve_priority;
            let tail = inner.history_tail(start_clock)?;
            debug!(behind = tail.len(), "Rebasing transaction onto local history");
            cache.rebase(tail, priority);
        }
        inner.clock_after(cache.len())?
    };

    // Each event binds against the tree left by the ones before it, so a
    // batch may write into containers it created itself.
    for index in 0..cache.len() {
        {
            let mut inner = shared.borrow_mut();
            let event = &mut cache.events_mut()[index];
            if !event.bind(&mut inner) {
                warn!(path = %event.key_path(), kind = event.kind().name(), "Event target not found, skipping");
                event.torpedo();
            }
            event.apply(&mut inner);
            event.gc();
            inner.clock = inner.clock_after(1)?;
        }
        shared.drain();
    }
    let relay = cache.serialize_update();

    {
        let mut inner = shared.borrow_mut();
        inner.push_history(cache.retire());
        if inner.clock != expected {
            warn!(expected, actual = inner.clock, "Clock mismatch after applying transaction");
            return Err(SyncError::ClockMismatch {
                expected,
                actual: inner.clock,
            }
            .into());
        }
    }

    debug!(events = cache.len(), clock = expected, "Applied transaction");
    shared.dispatch_update(&relay, cache.origin());
    Ok(())
}
