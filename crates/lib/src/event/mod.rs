//! Mutation events.
//!
//! An [`Event`] describes one mutation: its [`Op`], the key path of the mutated
//! slot, and (once bound) the container binding it applies to. Local events are
//! bound to the wrapper that created them; events decoded from the wire are
//! bound by resolving their key path against the live tree.
//!
//! Wire layout of one event, every block 4-byte aligned:
//!
//! | Kind | Layout |
//! |---|---|
//! | Null | `[u32 tag]` |
//! | MapSet | `[u32 tag][path][key][value]` |
//! | MapDelete | `[u32 tag][path][key]` |
//! | ArrayPush | `[u32 tag][path][single-element array]` |
//! | ArrayDelete | `[u32 tag][path]` |
//!
//! where each bracketed field after the tag is a `[u32 len][bytes]` block.

pub mod wire;

use tracing::{trace, warn};

use crate::binding::{NodeId, NodeKind, Slot, State};
use crate::codec;
use crate::constants::WORD;
use crate::doc::{Action, CrdtError, DocInner};
use crate::path::KeyPath;
use crate::sync::SyncError;
use crate::transaction::HistoryEntry;
use crate::Result;

use wire::{Reader, Writer, block_len};

/// Closed set of event kinds, numbered by their wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Null = 1,
    MapSet = 2,
    MapDelete = 3,
    ArrayPush = 4,
    ArrayDelete = 5,
}

impl EventKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(EventKind::Null),
            2 => Some(EventKind::MapSet),
            3 => Some(EventKind::MapDelete),
            4 => Some(EventKind::ArrayPush),
            5 => Some(EventKind::ArrayDelete),
            _ => None,
        }
    }

    /// Writes that conflict with another write to the same key path.
    pub fn is_map_write(self) -> bool {
        matches!(self, EventKind::MapSet | EventKind::MapDelete)
    }

    /// Events after which nothing below their key path survives.
    pub fn replaces_subtree(self) -> bool {
        matches!(
            self,
            EventKind::MapSet | EventKind::MapDelete | EventKind::ArrayDelete
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Null => "null",
            EventKind::MapSet => "map-set",
            EventKind::MapDelete => "map-delete",
            EventKind::ArrayPush => "array-push",
            EventKind::ArrayDelete => "array-delete",
        }
    }
}

/// Value carried by a map-set or array-push.
///
/// The snapshot and its encoding are taken when the event is built, so later
/// mutations of an attached container travel as their own events.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    state: State,
    encoded: Vec<u8>,
    /// Existing binding to attach in place of materializing `state`.
    node: Option<NodeId>,
}

impl Payload {
    /// Payload of a map-set: the encoded value itself.
    pub(crate) fn for_set(state: State, node: Option<NodeId>) -> Result<Self> {
        let encoded = codec::encode(&state)?;
        Ok(Self { state, encoded, node })
    }

    /// Payload of an array-push: a single-element array.
    pub(crate) fn for_push(state: State, node: Option<NodeId>) -> Result<Self> {
        let encoded = codec::encode(std::slice::from_ref(&state))?;
        Ok(Self { state, encoded, node })
    }

    pub fn state(&self) -> &State {
        &self.state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Null,
    MapSet { key: String, value: Payload },
    MapDelete { key: String },
    ArrayPush { value: Payload },
    /// `removed` is filled in by apply, for notification only.
    ArrayDelete { removed: Option<Slot> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    key_path: KeyPath,
    path_json: Vec<u8>,
    op: Op,
    target: Option<NodeId>,
}

impl Event {
    /// The placeholder left behind by a torpedoed event.
    pub fn null() -> Self {
        Self {
            key_path: KeyPath::new(),
            path_json: Vec::new(),
            op: Op::Null,
            target: None,
        }
    }

    fn with_op(key_path: KeyPath, op: Op) -> Result<Self> {
        let path_json = key_path.to_json()?.into_bytes();
        Ok(Self {
            key_path,
            path_json,
            op,
            target: None,
        })
    }

    pub(crate) fn map_set(key_path: KeyPath, key: String, value: Payload) -> Result<Self> {
        Self::with_op(key_path, Op::MapSet { key, value })
    }

    pub(crate) fn map_delete(key_path: KeyPath, key: String) -> Result<Self> {
        Self::with_op(key_path, Op::MapDelete { key })
    }

    pub(crate) fn array_push(key_path: KeyPath, value: Payload) -> Result<Self> {
        Self::with_op(key_path, Op::ArrayPush { value })
    }

    pub(crate) fn array_delete(key_path: KeyPath) -> Result<Self> {
        Self::with_op(key_path, Op::ArrayDelete { removed: None })
    }

    /// Binds the event to a known container binding.
    pub(crate) fn bound_to(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn kind(&self) -> EventKind {
        match self.op {
            Op::Null => EventKind::Null,
            Op::MapSet { .. } => EventKind::MapSet,
            Op::MapDelete { .. } => EventKind::MapDelete,
            Op::ArrayPush { .. } => EventKind::ArrayPush,
            Op::ArrayDelete { .. } => EventKind::ArrayDelete,
        }
    }

    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub(crate) fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn is_null(&self) -> bool {
        matches!(self.op, Op::Null)
    }

    /// Replaces this event with a no-op, keeping its slot in the batch.
    pub(crate) fn torpedo(&mut self) {
        *self = Event::null();
    }

    /// What history keeps of this event once applied.
    pub(crate) fn retire(&self) -> HistoryEntry {
        HistoryEntry::new(self.kind(), self.key_path.clone())
    }

    /// Resolves the mutated container from the key path.
    ///
    /// Returns `false` when the path no longer leads to a container of the
    /// right kind; the caller turns such events into no-ops.
    pub(crate) fn bind(&mut self, inner: &mut DocInner) -> bool {
        let expected = match self.kind() {
            EventKind::Null => return true,
            EventKind::MapSet | EventKind::MapDelete => NodeKind::Map,
            EventKind::ArrayPush | EventKind::ArrayDelete => {
                if self.key_path.last_zid().is_none() {
                    return false;
                }
                NodeKind::Array
            }
        };
        let container = self.key_path.parent();
        if container.is_empty() {
            return false;
        }
        let Some(Slot::Node(target)) = inner.resolve(&container) else {
            return false;
        };
        if inner.arena.get(target).map(|n| n.kind()) != Some(expected) {
            return false;
        }
        self.target = Some(target);
        true
    }

    /// Mutates the bound container and queues the matching notification.
    pub(crate) fn apply(&mut self, inner: &mut DocInner) {
        let Some(target) = self.target else {
            return;
        };
        trace!(kind = self.kind().name(), path = %self.key_path, "Applying event");
        match &mut self.op {
            Op::Null => {}
            Op::MapSet { key, value } => {
                let slot = inner.attach(value.state.clone(), value.node.take(), target);
                let previous = inner
                    .arena
                    .get_mut(target)
                    .and_then(|n| n.record_mut())
                    .and_then(|r| r.insert(key.clone(), slot.clone()));
                if let Some(Slot::Node(old)) = previous {
                    if slot.node() != Some(old) {
                        inner.defer_release(old);
                    }
                }
                inner.notify_key(target, key, Action::Update);
            }
            Op::MapDelete { key } => {
                let previous = inner
                    .arena
                    .get_mut(target)
                    .and_then(|n| n.record_mut())
                    .and_then(|r| r.remove(key.as_str()));
                if let Some(Slot::Node(old)) = previous {
                    inner.defer_release(old);
                }
                inner.notify_key(target, key, Action::Update);
            }
            Op::ArrayPush { value } => {
                let Some(zid) = self.key_path.last_zid() else {
                    return;
                };
                let slot = inner.attach(value.state.clone(), value.node.take(), target);
                if let Some(seq) = inner.arena.get_mut(target).and_then(|n| n.sequence_mut()) {
                    if seq.position(zid).is_some() {
                        warn!(zid, "Pushing an element whose zid is already present");
                    }
                    seq.push(slot.clone(), zid);
                }
                inner.notify_value(target, &slot, Action::Add);
            }
            Op::ArrayDelete { removed } => {
                let Some(zid) = self.key_path.last_zid() else {
                    return;
                };
                let slot = inner
                    .arena
                    .get_mut(target)
                    .and_then(|n| n.sequence_mut())
                    .and_then(|s| s.remove(zid));
                let Some(slot) = slot else {
                    warn!(zid, path = %self.key_path, "Array delete found no element with this zid");
                    return;
                };
                inner.notify_value(target, &slot, Action::Delete);
                if let Slot::Node(old) = slot {
                    inner.defer_release(old);
                }
                *removed = Some(slot);
            }
        }
    }

    /// Drops references into the binding tree once the event has been applied.
    pub(crate) fn gc(&mut self) {
        self.target = None;
    }

    /// Size of the encoded event, a multiple of the wire alignment.
    pub fn encoded_len(&self) -> usize {
        let path = block_len(self.path_json.len());
        WORD + match &self.op {
            Op::Null => 0,
            Op::MapSet { key, value } => path + block_len(key.len()) + block_len(value.encoded.len()),
            Op::MapDelete { key } => path + block_len(key.len()),
            Op::ArrayPush { value } => path + block_len(value.encoded.len()),
            Op::ArrayDelete { .. } => path,
        }
    }

    pub fn encode(&self, w: &mut Writer) {
        w.u32(self.kind().tag());
        match &self.op {
            Op::Null => {}
            Op::MapSet { key, value } => {
                w.block(&self.path_json);
                w.block(key.as_bytes());
                w.block(&value.encoded);
            }
            Op::MapDelete { key } => {
                w.block(&self.path_json);
                w.block(key.as_bytes());
            }
            Op::ArrayPush { value } => {
                w.block(&self.path_json);
                w.block(&value.encoded);
            }
            Op::ArrayDelete { .. } => w.block(&self.path_json),
        }
    }

    /// Decodes one unbound event. Unknown tags decode as a no-op.
    pub fn decode(bytes: &[u8]) -> Result<Event> {
        let mut r = Reader::new(bytes);
        let tag = r.u32()?;
        let Some(kind) = EventKind::from_tag(tag) else {
            warn!(tag, "Unknown event tag, treating as null");
            return Ok(Event::null());
        };
        if kind == EventKind::Null {
            return Ok(Event::null());
        }

        let path_json = r.block()?.to_vec();
        let key_path = KeyPath::from_json(&path_json).map_err(|e| SyncError::InvalidKeyPath {
            reason: e.to_string(),
        })?;
        let op = match kind {
            EventKind::MapSet => {
                let key = read_key(&mut r)?;
                let encoded = r.block()?.to_vec();
                let state: State = codec::decode(&encoded)?;
                Op::MapSet {
                    key,
                    value: Payload {
                        state,
                        encoded,
                        node: None,
                    },
                }
            }
            EventKind::MapDelete => Op::MapDelete {
                key: read_key(&mut r)?,
            },
            EventKind::ArrayPush => {
                let encoded = r.block()?.to_vec();
                let mut items: Vec<State> = codec::decode(&encoded)?;
                if items.len() != 1 {
                    return Err(CrdtError::UnsupportedBatchSize {
                        operation: "push".to_string(),
                        len: items.len(),
                    }
                    .into());
                }
                let state = items.remove(0);
                Op::ArrayPush {
                    value: Payload {
                        state,
                        encoded,
                        node: None,
                    },
                }
            }
            EventKind::ArrayDelete => Op::ArrayDelete { removed: None },
            EventKind::Null => Op::Null,
        };
        Ok(Event {
            key_path,
            path_json,
            op,
            target: None,
        })
    }
}

fn read_key(r: &mut Reader<'_>) -> Result<String> {
    let raw = r.block()?;
    String::from_utf8(raw.to_vec()).map_err(|_| SyncError::InvalidUtf8.into())
}
