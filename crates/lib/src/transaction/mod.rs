//! Transaction batching and rebase.
//!
//! A [`TransactionCache`] holds the events of one top-level transaction together
//! with the clock it started at and the resolve priority of the document that
//! produced it. It is the unit that travels on the wire as a `TRANSACTION`
//! message:
//!
//! ```text
//! [u32 tag][u32 start clock][u32 resolve priority][u32 count]
//! { [u32 event length][event bytes] }*
//! ```
//!
//! # Rebase
//!
//! An inbound transaction that started behind the local clock is rebased onto
//! the local history written since then (the *tail*). Each incoming event is
//! either kept or torpedoed into a no-op:
//!
//! - anything below a key path that the tail set, deleted or array-deleted is
//!   torpedoed, since its target no longer exists;
//! - a map write that hits a key path the tail also wrote is decided by
//!   priority: the numerically lower resolve priority wins. When the incoming
//!   side wins, the conflicting tail entries are torpedoed in place;
//! - an array delete of an element the tail already deleted is torpedoed.
//!
//! Afterwards the transaction's start clock is moved to the end of the tail.


use tracing::debug;

use crate::constants::{TRANSACTION, WORD};
use crate::event::wire::{Reader, Writer};
use crate::event::{Event, EventKind};
use crate::path::KeyPath;
use crate::Result;

/// Opaque tag describing who opened a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Implicit transaction opened by a single mutation call.
    Mutation(EventKind),
    /// Caller-supplied origin.
    Named(String),
}

impl From<&str> for Origin {
    fn from(value: &str) -> Self {
        Origin::Named(value.to_string())
    }
}

impl From<String> for Origin {
    fn from(value: String) -> Self {
        Origin::Named(value)
    }
}

/// What the document remembers of an applied event.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    kind: EventKind,
    key_path: KeyPath,
}

impl HistoryEntry {
    pub fn new(kind: EventKind, key_path: KeyPath) -> Self {
        Self { kind, key_path }
    }

    pub fn null() -> Self {
        Self::new(EventKind::Null, KeyPath::new())
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    pub fn is_null(&self) -> bool {
        self.kind == EventKind::Null
    }
}

#[derive(Debug, Clone)]
pub struct TransactionCache {
    origin: Option<Origin>,
    start_clock: u32,
    resolve_priority: u32,
    events: Vec<Event>,
}

impl TransactionCache {
    pub fn new(start_clock: u32, resolve_priority: u32, origin: Option<Origin>) -> Self {
        Self {
            origin,
            start_clock,
            resolve_priority,
            events: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn start_clock(&self) -> u32 {
        self.start_clock
    }

    pub fn resolve_priority(&self) -> u32 {
        self.resolve_priority
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub(crate) fn set_origin(&mut self, origin: Option<Origin>) {
        self.origin = origin;
    }

    /// History entries for every event, in order.
    pub(crate) fn retire(&self) -> impl Iterator<Item = HistoryEntry> + '_ {
        self.events.iter().map(Event::retire)
    }

    /// Rebases the batch onto `tail`, the local history since `start_clock`.
    ///
    /// `local_priority` is the receiving document's current resolve priority.
    /// Equal priorities keep the local side.
    pub fn rebase(&mut self, tail: &mut [HistoryEntry], local_priority: u32) {
        let incoming_priority = self.resolve_priority;
        for event in &mut self.events {
            let path = event.key_path().clone();
            let torpedo = match event.kind() {
                EventKind::Null => false,
                EventKind::MapSet | EventKind::MapDelete => {
                    if parent_was_replaced(&path, tail) {
                        debug!(%path, "Torpedoing incoming write below a replaced parent");
                        true
                    } else if has_conflict(&path, tail) {
                        if incoming_priority < local_priority {
                            debug!(%path, incoming_priority, local_priority, "Incoming write wins, torpedoing local history");
                            for entry in tail.iter_mut() {
                                if entry.kind.is_map_write() && entry.key_path.same_keys(&path) {
                                    *entry = HistoryEntry::null();
                                }
                            }
                            false
                        } else {
                            debug!(%path, incoming_priority, local_priority, "Local write wins, torpedoing incoming");
                            true
                        }
                    } else {
                        false
                    }
                }
                EventKind::ArrayPush => parent_was_replaced(&path, tail),
                EventKind::ArrayDelete => parent_was_replaced(&path, tail) || already_deleted(&path, tail),
            };
            if torpedo {
                event.torpedo();
            }
        }
        self.start_clock += tail.len() as u32;
    }

    pub fn encoded_len(&self) -> usize {
        4 * WORD + self.events.iter().map(|e| WORD + e.encoded_len()).sum::<usize>()
    }

    pub fn serialize_update(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(self.encoded_len());
        w.u32(TRANSACTION);
        w.u32(self.start_clock);
        w.u32(self.resolve_priority);
        w.u32(self.events.len() as u32);
        for event in &self.events {
            w.u32(event.encoded_len() as u32);
            event.encode(&mut w);
        }
        w.into_bytes()
    }

    /// Decodes a `TRANSACTION` message into an unbound batch.
    pub fn deserialize_update(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let _method = r.u32()?;
        let start_clock = r.u32()?;
        let resolve_priority = r.u32()?;
        let count = r.u32()? as usize;

        let mut events = Vec::with_capacity(count.min(r.remaining() / WORD));
        for _ in 0..count {
            let len = r.u32()? as usize;
            let data = r.take(len)?;
            r.realign();
            events.push(Event::decode(data)?);
        }
        Ok(Self {
            origin: None,
            start_clock,
            resolve_priority,
            events,
        })
    }
}

fn parent_was_replaced(path: &KeyPath, tail: &[HistoryEntry]) -> bool {
    tail.iter()
        .any(|e| e.kind.replaces_subtree() && e.key_path.is_proper_prefix_of(path))
}

fn has_conflict(path: &KeyPath, tail: &[HistoryEntry]) -> bool {
    tail.iter()
        .any(|e| e.kind.is_map_write() && e.key_path.same_keys(path))
}

fn already_deleted(path: &KeyPath, tail: &[HistoryEntry]) -> bool {
    tail.iter()
        .any(|e| e.kind == EventKind::ArrayDelete && e.key_path.same_keys(path))
}
