//! Replicated documents.
//!
//! A [`Doc`] owns a tree of bindings: a root record whose top-level entries are
//! [`Map`] and [`Array`] containers, which in turn hold plain values or further
//! containers. Wrappers are lightweight handles; every handle to the same
//! binding shares observers and follows the binding across state resets.
//!
//! # Example
//!
//! ```
//! use zdoc::{Doc, Entry};
//!
//! let doc = Doc::new();
//! let root = doc.get_map("root")?;
//! root.set("x", 1)?;
//!
//! assert_eq!(doc.clock(), 1);
//! assert_eq!(root.get("x"), Some(Entry::from(1)));
//! assert_eq!(doc.to_json(), serde_json::json!({"root": {"x": 1}}));
//! # Ok::<(), zdoc::Error>(())
//! ```
//!
//! # Transactions
//!
//! Every mutation runs inside a transaction. A mutation made outside
//! [`Doc::transact`] opens and closes its own; mutations inside share the
//! outermost one, and closing it emits exactly one `update` for the whole batch.
//! The clock advances by one per event when the batch closes.

mod array;
mod errors;
mod map;
mod observer;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use rand::Rng;
use tracing::{debug, warn};

pub use array::Array;
pub use errors::CrdtError;
pub use map::Map;
pub use observer::{Action, Change, Changes, Member, ObserverId, UpdateEvent};
pub(crate) use observer::{Observers, RawChange, RawMember};

use crate::binding::{Arena, Node, NodeId, NodeKind, Registry, Sequence, Slot, State, WrapperId, Zid};
use crate::codec;
use crate::constants::ID_MAX;
use crate::path::{KeyPath, KeyType, PathKey, PathSegment};
use crate::sync::SyncError;
use crate::transaction::{HistoryEntry, Origin, TransactionCache};
use crate::value::{TypedBuffer, Value};
use crate::Result;

/// Random 24-bit identifier, used for zids and resolve priorities.
pub(crate) fn random_id() -> u32 {
    rand::thread_rng().gen_range(0..=ID_MAX)
}

/// Construction options for a [`Doc`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocOptions {
    resolve_priority: Option<u32>,
    history_limit: Option<usize>,
}

impl DocOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the resolve priority instead of drawing a random one.
    pub fn with_resolve_priority(mut self, priority: u32) -> Self {
        self.resolve_priority = Some(priority);
        self
    }

    /// Keeps at most `limit` history entries.
    ///
    /// Inbound transactions that start before the retained window fail with
    /// [`SyncError::HistoryTruncated`].
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn resolve_priority(&self) -> Option<u32> {
        self.resolve_priority
    }

    pub fn history_limit(&self) -> Option<usize> {
        self.history_limit
    }
}

/// A value read from, or written into, a container slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    Map(Map),
    Array(Array),
}

impl Entry {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Entry::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Entry::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Entry::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Entry::Value(v) => v.type_name(),
            Entry::Map(_) => "map",
            Entry::Array(_) => "array",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Entry::Value(v) => v.to_json(),
            Entry::Map(m) => m.to_json(),
            Entry::Array(a) => a.to_json(),
        }
    }

    fn shared(&self) -> Option<&Shared> {
        match self {
            Entry::Value(_) => None,
            Entry::Map(m) => Some(&m.shared),
            Entry::Array(a) => Some(&a.shared),
        }
    }
}

macro_rules! entry_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Entry {
            fn from(value: $ty) -> Self {
                Entry::Value(Value::from(value))
            }
        })*
    };
}

entry_from_value!(bool, i64, i32, u32, f64, String, &str, TypedBuffer);

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Value(value)
    }
}

impl From<Map> for Entry {
    fn from(value: Map) -> Self {
        Entry::Map(value)
    }
}

impl From<&Map> for Entry {
    fn from(value: &Map) -> Self {
        Entry::Map(value.clone())
    }
}

impl From<Array> for Entry {
    fn from(value: Array) -> Self {
        Entry::Array(value)
    }
}

impl From<&Array> for Entry {
    fn from(value: &Array) -> Self {
        Entry::Array(value.clone())
    }
}

/// Mutable state of one document.
#[derive(Debug)]
pub(crate) struct DocInner {
    pub(crate) arena: Arena,
    pub(crate) registry: Registry,
    pub(crate) root: NodeId,
    pub(crate) clock: u32,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) resolve_priority: u32,
    pub(crate) options: DocOptions,
    pub(crate) depth: usize,
    pub(crate) cache: Option<TransactionCache>,
    pub(crate) observers: Observers,
    pending: VecDeque<RawChange>,
    releases: Vec<NodeId>,
}

impl DocInner {
    fn new(options: DocOptions) -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(Node::Root(BTreeMap::new()));
        Self {
            arena,
            registry: Registry::new(),
            root,
            clock: 0,
            history: Vec::new(),
            resolve_priority: options.resolve_priority.unwrap_or_else(random_id),
            options,
            depth: 0,
            cache: None,
            observers: Observers::default(),
            pending: VecDeque::new(),
            releases: Vec::new(),
        }
    }

    /// The live binding behind a wrapper.
    pub(crate) fn node_of(&self, wrapper: WrapperId) -> std::result::Result<NodeId, CrdtError> {
        self.registry
            .binding_of(wrapper)
            .filter(|node| self.arena.contains(*node))
            .ok_or(CrdtError::Released)
    }

    /// True when `node` hangs off the document root.
    pub(crate) fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        while let Some(parent) = self.registry.parent_of(current) {
            current = parent;
        }
        current == self.root
    }

    /// Walks parent links up from `node` and records the route down.
    ///
    /// For a detached binding the path is relative to its topmost ancestor.
    pub(crate) fn key_path_of(&self, node: NodeId) -> std::result::Result<KeyPath, CrdtError> {
        let mut segments = Vec::new();
        let mut current = node;
        while let Some(parent) = self.registry.parent_of(current) {
            let tag = match self.arena.get(current).map(Node::kind) {
                Some(NodeKind::Array) => KeyType::Array,
                _ => KeyType::Map,
            };
            let segment = match self.arena.get(parent) {
                Some(Node::Root(record)) | Some(Node::Map(record)) => {
                    let key = record
                        .iter()
                        .find(|(_, slot)| slot.node() == Some(current))
                        .map(|(key, _)| key.clone())
                        .ok_or_else(|| CrdtError::CorruptBinding {
                            reason: format!("{current} is not a member of its parent {parent}"),
                        })?;
                    PathSegment(PathKey::Name(key), tag)
                }
                Some(Node::Array(seq)) => {
                    let index = seq
                        .elements
                        .iter()
                        .position(|slot| slot.node() == Some(current))
                        .ok_or_else(|| CrdtError::CorruptBinding {
                            reason: format!("{current} is not an element of its parent {parent}"),
                        })?;
                    PathSegment(PathKey::Id(seq.ids[index]), tag.element())
                }
                None => {
                    return Err(CrdtError::CorruptBinding {
                        reason: format!("parent {parent} of {current} is gone"),
                    });
                }
            };
            segments.push(segment);
            current = parent;
        }
        segments.reverse();
        Ok(segments.into_iter().collect())
    }

    /// Fetches or creates a top-level container.
    pub(crate) fn root_container(&mut self, key: &str, kind: NodeKind) -> std::result::Result<NodeId, CrdtError> {
        let root = self.root;
        let existing = self
            .arena
            .get(root)
            .and_then(Node::record)
            .and_then(|r| r.get(key))
            .cloned();
        match existing {
            Some(Slot::Node(id)) => {
                let actual = self.arena.get(id).map(Node::kind);
                if actual == Some(kind) {
                    Ok(id)
                } else {
                    Err(CrdtError::TypeMismatch {
                        expected: kind.name().to_string(),
                        actual: actual.map(NodeKind::name).unwrap_or("nothing").to_string(),
                    })
                }
            }
            Some(Slot::Value(v)) => Err(CrdtError::TypeMismatch {
                expected: kind.name().to_string(),
                actual: v.type_name().to_string(),
            }),
            None => {
                let id = self.arena.alloc(empty_node(kind));
                if let Some(record) = self.arena.get_mut(root).and_then(Node::record_mut) {
                    record.insert(key.to_string(), Slot::Node(id));
                }
                self.registry.set_parent(id, root);
                Ok(id)
            }
        }
    }

    /// Allocates a parentless container.
    pub(crate) fn detached(&mut self, kind: NodeKind) -> WrapperId {
        let id = self.arena.alloc(empty_node(kind));
        self.registry.wrapper_for(id)
    }

    /// Follows a key path from the root, creating top-level containers on the way.
    pub(crate) fn resolve(&mut self, path: &KeyPath) -> Option<Slot> {
        let mut current = Slot::Node(self.root);
        for segment in path.segments() {
            let node = current.node()?;
            let key_type = segment.key_type();
            let child = if key_type.is_element() {
                let zid = segment.key().as_zid()?;
                let seq = self.arena.get(node)?.sequence()?;
                seq.elements.get(seq.position(zid)?)?.clone()
            } else {
                let key = segment.key().as_name()?;
                let existing = self.arena.get(node)?.record()?.get(key).cloned();
                match existing {
                    Some(slot) => slot,
                    None if node == self.root && key_type != KeyType::Value => {
                        let kind = if key_type == KeyType::Array {
                            NodeKind::Array
                        } else {
                            NodeKind::Map
                        };
                        Slot::Node(self.root_container(key, kind).ok()?)
                    }
                    None => return None,
                }
            };
            let fits = match (key_type, &child) {
                (KeyType::Value | KeyType::ElementValue, _) => true,
                (KeyType::Map | KeyType::ElementMap, Slot::Node(id)) => self.arena.get(*id).map(Node::kind) == Some(NodeKind::Map),
                (KeyType::Array | KeyType::ElementArray, Slot::Node(id)) => {
                    self.arena.get(*id).map(Node::kind) == Some(NodeKind::Array)
                }
                _ => false,
            };
            if !fits {
                return None;
            }
            current = child;
        }
        Some(current)
    }

    /// Validates an entry about to be stored under `parent` and snapshots it.
    ///
    /// Returns the snapshot, the binding to attach (for wrappers) and the key
    /// type tag of the new slot.
    pub(crate) fn prepare(
        &self,
        entry: Entry,
        parent: NodeId,
    ) -> std::result::Result<(State, Option<NodeId>, KeyType), CrdtError> {
        let (wrapper, tag) = match entry {
            Entry::Value(v) => return Ok((State::Value(v), None, KeyType::Value)),
            Entry::Map(m) => (m.id, KeyType::Map),
            Entry::Array(a) => (a.id, KeyType::Array),
        };
        let node = self.node_of(wrapper)?;
        if node == self.root || self.registry.parent_of(node).is_some() {
            return Err(CrdtError::AlreadyBound {
                binding: node.to_string(),
            });
        }
        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == node {
                return Err(CrdtError::CyclicBinding {
                    binding: node.to_string(),
                });
            }
            ancestor = self.registry.parent_of(current);
        }
        Ok((self.arena.snapshot(node), Some(node), tag))
    }

    /// A zid not yet used by the array at `node`.
    pub(crate) fn fresh_zid(&self, node: NodeId) -> Zid {
        let seq = self.arena.get(node).and_then(Node::sequence);
        loop {
            let zid = random_id();
            if seq.and_then(|s| s.position(zid)).is_none() {
                return zid;
            }
        }
    }

    /// Turns a payload into a slot under `parent`.
    pub(crate) fn attach(&mut self, state: State, node: Option<NodeId>, parent: NodeId) -> Slot {
        match node {
            Some(id) if self.arena.contains(id) => {
                self.registry.set_parent(id, parent);
                Slot::Node(id)
            }
            _ => self.arena.materialize(state, Some(parent), &mut self.registry),
        }
    }

    /// Schedules a removed subtree for release once notifications are delivered.
    pub(crate) fn defer_release(&mut self, node: NodeId) {
        self.registry.clear_parent(node);
        self.releases.push(node);
    }

    fn release(&mut self, node: NodeId) {
        for id in self.arena.remove_subtree(node) {
            if let Some(wrapper) = self.registry.forget(id) {
                self.observers.drop_wrapper(wrapper);
            }
        }
    }

    fn flush_releases(&mut self) {
        for node in std::mem::take(&mut self.releases) {
            self.release(node);
        }
    }

    fn observed(&self, node: NodeId) -> Option<WrapperId> {
        self.registry
            .lookup(node)
            .filter(|wrapper| self.observers.is_observed(*wrapper))
    }

    pub(crate) fn member_for(&mut self, slot: &Slot) -> RawMember {
        match slot {
            Slot::Value(v) => RawMember::Value(v.clone()),
            Slot::Node(id) => {
                let wrapper = self.registry.wrapper_for(*id);
                match self.arena.get(*id).map(Node::kind) {
                    Some(NodeKind::Array) => RawMember::Array(wrapper),
                    _ => RawMember::Map(wrapper),
                }
            }
        }
    }

    pub(crate) fn notify_key(&mut self, target: NodeId, key: &str, action: Action) {
        if let Some(wrapper) = self.observed(target) {
            self.pending.push_back(RawChange::new(wrapper).key(key, action));
        }
    }

    pub(crate) fn notify_value(&mut self, target: NodeId, slot: &Slot, action: Action) {
        if let Some(wrapper) = self.observed(target) {
            let member = self.member_for(slot);
            self.pending.push_back(RawChange::new(wrapper).value(member, action));
        }
    }

    /// Queues one whole-content notification per observed container under `node`.
    fn queue_reset(&mut self, node: NodeId, action: Action) {
        let (children, keys, slots): (Vec<NodeId>, Vec<String>, Vec<Slot>) = match self.arena.get(node) {
            Some(Node::Root(record)) => (record.values().filter_map(Slot::node).collect(), Vec::new(), Vec::new()),
            Some(Node::Map(record)) => (
                record.values().filter_map(Slot::node).collect(),
                record.keys().cloned().collect(),
                Vec::new(),
            ),
            Some(Node::Array(seq)) => (
                seq.elements.iter().filter_map(Slot::node).collect(),
                Vec::new(),
                seq.elements.clone(),
            ),
            None => return,
        };
        if let Some(wrapper) = self.observed(node) {
            if !keys.is_empty() {
                let change = keys
                    .into_iter()
                    .fold(RawChange::new(wrapper), |change, key| change.key(key, action));
                self.pending.push_back(change);
            } else if !slots.is_empty() {
                let mut change = RawChange::new(wrapper);
                for slot in &slots {
                    let member = self.member_for(slot);
                    change = change.value(member, action);
                }
                self.pending.push_back(change);
            }
        }
        for child in children {
            self.queue_reset(child, action);
        }
    }

    /// Moves wrappers of the old tree onto the structurally matching new bindings.
    fn remap(&mut self, old: NodeId, new: NodeId) {
        let (Some(old_node), Some(new_node)) = (self.arena.get(old), self.arena.get(new)) else {
            return;
        };
        if old_node.kind() != new_node.kind() {
            return;
        }
        let pairs: Vec<(NodeId, NodeId)> = match (old_node, new_node) {
            (Node::Array(before), Node::Array(after)) => after
                .ids
                .iter()
                .zip(&after.elements)
                .filter_map(|(zid, slot)| {
                    let previous = before.elements.get(before.position(*zid)?)?;
                    Some((previous.node()?, slot.node()?))
                })
                .collect(),
            (Node::Root(before) | Node::Map(before), Node::Root(after) | Node::Map(after)) => after
                .iter()
                .filter_map(|(key, slot)| Some((before.get(key)?.node()?, slot.node()?)))
                .collect(),
            _ => Vec::new(),
        };
        if let Some(wrapper) = self.registry.lookup(old) {
            if let Err(err) = self.registry.rebind(wrapper, new) {
                warn!(%err, %old, %new, "Wrapper not remapped");
            }
        }
        for (before, after) in pairs {
            self.remap(before, after);
        }
    }

    pub(crate) fn open_transaction(&mut self, origin: Option<Origin>) {
        self.depth += 1;
        if self.depth == 1 {
            self.cache = Some(TransactionCache::new(self.clock, self.resolve_priority, origin));
        }
    }

    /// Leaves one transaction level. At the outermost level the batch is
    /// retired into history and its serialized form is returned.
    fn close_transaction(&mut self) -> Option<(Vec<u8>, Option<Origin>)> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return None;
        }
        let cache = self.cache.take()?;
        if cache.is_empty() {
            return None;
        }
        let update = cache.serialize_update();
        // commit() refuses events that would not fit on the clock.
        self.clock = self.clock.saturating_add(cache.len() as u32);
        self.push_history(cache.retire());
        Some((update, cache.origin().cloned()))
    }

    /// The clock after `events` more events, if it fits.
    pub(crate) fn clock_after(&self, events: usize) -> std::result::Result<u32, SyncError> {
        u32::try_from(events)
            .ok()
            .and_then(|n| self.clock.checked_add(n))
            .ok_or(SyncError::ClockOverflow {
                clock: self.clock,
                events,
            })
    }

    pub(crate) fn push_history(&mut self, entries: impl Iterator<Item = HistoryEntry>) {
        self.history.extend(entries);
        if let Some(limit) = self.options.history_limit {
            if self.history.len() > limit {
                let excess = self.history.len() - limit;
                self.history.drain(..excess);
            }
        }
    }

    /// The local history written since `start_clock`.
    pub(crate) fn history_tail(&mut self, start_clock: u32) -> std::result::Result<&mut [HistoryEntry], SyncError> {
        let behind = self.clock.saturating_sub(start_clock) as usize;
        let len = self.history.len();
        if behind > len {
            return Err(SyncError::HistoryTruncated {
                start_clock,
                oldest: self.clock - len as u32,
            });
        }
        Ok(&mut self.history[len - behind..])
    }
}

fn empty_node(kind: NodeKind) -> Node {
    match kind {
        NodeKind::Array => Node::Array(Sequence::default()),
        NodeKind::Root | NodeKind::Map => Node::Map(BTreeMap::new()),
    }
}

/// Shared handle to a document's state, held by the document and its wrappers.
#[derive(Clone)]
pub(crate) struct Shared(Rc<RefCell<DocInner>>);

impl Shared {
    fn new(inner: DocInner) -> Self {
        Self(Rc::new(RefCell::new(inner)))
    }

    pub(crate) fn borrow(&self) -> Ref<'_, DocInner> {
        self.0.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> RefMut<'_, DocInner> {
        self.0.borrow_mut()
    }

    pub(crate) fn same_doc(&self, other: &Shared) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn entry_for(&self, inner: &mut DocInner, slot: Slot) -> Entry {
        match slot {
            Slot::Value(v) => Entry::Value(v),
            Slot::Node(id) => {
                let wrapper = inner.registry.wrapper_for(id);
                match inner.arena.get(id).map(Node::kind) {
                    Some(NodeKind::Array) => Entry::Array(Array::from_parts(self.clone(), wrapper)),
                    _ => Entry::Map(Map::from_parts(self.clone(), wrapper)),
                }
            }
        }
    }

    pub(crate) fn check_entry(&self, entry: &Entry) -> std::result::Result<(), CrdtError> {
        match entry.shared() {
            Some(other) if !self.same_doc(other) => Err(CrdtError::ForeignDocument),
            _ => Ok(()),
        }
    }

    /// Builds, applies and records one local mutation.
    ///
    /// `build` returns an event already bound to its container. Mutations of
    /// detached containers apply without a transaction.
    pub(crate) fn commit<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(&mut DocInner) -> Result<crate::event::Event>,
    {
        let attached = {
            let mut inner = self.borrow_mut();
            let mut event = build(&mut inner)?;
            let attached = event.target().is_some_and(|t| inner.is_attached(t));
            if attached {
                let pending = inner.cache.as_ref().map_or(0, TransactionCache::len);
                inner.clock_after(pending + 1)?;
                inner.open_transaction(Some(Origin::Mutation(event.kind())));
            }
            event.apply(&mut inner);
            event.gc();
            if attached {
                if let Some(cache) = inner.cache.as_mut() {
                    cache.push(event);
                }
            }
            attached
        };
        let _guard = attached.then(|| TransactionGuard::new(self));
        self.drain();
        Ok(())
    }

    /// Delivers queued notifications, then releases removed bindings.
    ///
    /// No borrow is held while a callback runs.
    pub(crate) fn drain(&self) {
        loop {
            let next = {
                let mut inner = self.borrow_mut();
                match inner.pending.pop_front() {
                    Some(raw) => {
                        let listeners = inner.observers.listeners(raw.wrapper);
                        Some((raw, listeners))
                    }
                    None => {
                        inner.flush_releases();
                        None
                    }
                }
            };
            let Some((raw, listeners)) = next else {
                break;
            };
            if listeners.is_empty() {
                continue;
            }
            let change = raw.into_change(self);
            for listener in listeners {
                listener(&change);
            }
        }
    }

    pub(crate) fn dispatch_update(&self, update: &[u8], origin: Option<&Origin>) {
        let handlers = self.borrow().observers.update_handlers();
        let event = UpdateEvent { update, origin };
        for handler in handlers {
            handler(&event);
        }
    }

    fn close_transaction(&self, dispatch: bool) {
        let flushed = match self.0.try_borrow_mut() {
            Ok(mut inner) => inner.close_transaction(),
            Err(_) => {
                warn!("Document borrowed while closing a transaction; update dropped");
                return;
            }
        };
        if let Some((update, origin)) = flushed {
            if dispatch {
                self.dispatch_update(&update, origin.as_ref());
            } else {
                warn!(
                    bytes = update.len(),
                    "Transaction unwound after applying events; update not sent, peers will need a state reset"
                );
            }
        }
    }

    /// Replaces the whole binding tree, keeping wrappers that still match.
    fn reset(&self, clock: u32, record: BTreeMap<String, State>) -> Result<()> {
        {
            let mut inner = self.borrow_mut();
            if inner.depth > 0 {
                return Err(CrdtError::TransactionInProgress.into());
            }
            let root = inner.root;
            inner.queue_reset(root, Action::Delete);
        }
        self.drain();
        {
            let mut inner = self.borrow_mut();
            let old_root = inner.root;
            let new_root = {
                let DocInner { arena, registry, .. } = &mut *inner;
                arena.materialize_root(record, registry)
            };
            inner.remap(old_root, new_root);
            inner.root = new_root;
            inner.release(old_root);
            inner.clock = clock;
            inner.history.clear();
            inner.queue_reset(new_root, Action::Add);
            debug!(clock, nodes = inner.arena.len(), "Adopted full state");
        }
        self.drain();
        Ok(())
    }
}

/// Closes one transaction level on drop, including during unwinding.
///
/// Events already applied are always retired into history; update handlers
/// only run on the normal path.
struct TransactionGuard<'a> {
    shared: &'a Shared,
}

impl<'a> TransactionGuard<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        self.shared.close_transaction(!std::thread::panicking());
    }
}

/// A replicated document.
///
/// `Clone` produces an independent deep copy at the same clock, with its own
/// resolve priority and no observers.
pub struct Doc {
    shared: Shared,
}

impl Doc {
    pub fn new() -> Self {
        Self::with_options(DocOptions::default())
    }

    pub fn with_options(options: DocOptions) -> Self {
        Self {
            shared: Shared::new(DocInner::new(options)),
        }
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Fetches the top-level map at `key`, creating it if absent.
    pub fn get_map(&self, key: &str) -> Result<Map> {
        let mut inner = self.shared.borrow_mut();
        let node = inner.root_container(key, NodeKind::Map)?;
        let wrapper = inner.registry.wrapper_for(node);
        Ok(Map::from_parts(self.shared.clone(), wrapper))
    }

    /// Fetches the top-level array at `key`, creating it if absent.
    pub fn get_array(&self, key: &str) -> Result<Array> {
        let mut inner = self.shared.borrow_mut();
        let node = inner.root_container(key, NodeKind::Array)?;
        let wrapper = inner.registry.wrapper_for(node);
        Ok(Array::from_parts(self.shared.clone(), wrapper))
    }

    /// A detached map; it joins the tree when set or pushed into a container.
    pub fn create_map(&self) -> Map {
        let wrapper = self.shared.borrow_mut().detached(NodeKind::Map);
        Map::from_parts(self.shared.clone(), wrapper)
    }

    /// A detached array; it joins the tree when set or pushed into a container.
    pub fn create_array(&self) -> Array {
        let wrapper = self.shared.borrow_mut().detached(NodeKind::Array);
        Array::from_parts(self.shared.clone(), wrapper)
    }

    /// Runs `f` inside one transaction.
    ///
    /// Nested calls join the outer transaction. The batch closes, and emits
    /// its update, even when `f` returns an error.
    pub fn transact<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.run_transaction(None, f)
    }

    /// [`Doc::transact`] with an origin carried to update handlers.
    pub fn transact_with<R>(&self, origin: impl Into<Origin>, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.run_transaction(Some(origin.into()), f)
    }

    fn run_transaction<R>(&self, origin: Option<Origin>, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.shared.borrow_mut().open_transaction(origin);
        let _guard = TransactionGuard::new(&self.shared);
        f()
    }

    /// Registers an `update` handler.
    pub fn on_update(&self, f: impl Fn(&UpdateEvent<'_>) + 'static) -> ObserverId {
        self.shared.borrow_mut().observers.on_update(Rc::new(f))
    }

    pub fn off_update(&self, id: ObserverId) -> bool {
        self.shared.borrow_mut().observers.off_update(id)
    }

    pub fn clock(&self) -> u32 {
        self.shared.borrow().clock
    }

    pub fn resolve_priority(&self) -> u32 {
        self.shared.borrow().resolve_priority
    }

    pub fn set_resolve_priority(&self, priority: u32) {
        self.shared.borrow_mut().resolve_priority = priority;
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.shared.borrow().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.shared.borrow().history.len()
    }

    pub fn options(&self) -> DocOptions {
        self.shared.borrow().options.clone()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let inner = self.shared.borrow();
        inner.arena.to_json(inner.root)
    }

    /// Snapshot of the whole binding tree.
    pub fn snapshot(&self) -> State {
        let inner = self.shared.borrow();
        inner.arena.snapshot(inner.root)
    }

    /// Resolves a key path to whatever it currently points at.
    pub fn get_by_key_path(&self, path: &KeyPath) -> Option<Entry> {
        let mut inner = self.shared.borrow_mut();
        let slot = inner.resolve(path)?;
        if slot.node() == Some(inner.root) {
            return None;
        }
        Some(self.shared.entry_for(&mut inner, slot))
    }

    /// Replaces the document with `state` at `clock`.
    ///
    /// Observers see the old content deleted and the new content added.
    /// Wrappers whose key path (zid, for array elements) still exists in the
    /// new tree move onto the new binding. History is reset.
    pub fn set_clock_state(&self, clock: u32, state: State) -> Result<()> {
        let record = match state {
            State::Map(record) => record,
            other => {
                return Err(SyncError::InvalidState {
                    reason: format!("root must be a map, found {}", other.kind_name()),
                }
                .into());
            }
        };
        self.shared.reset(clock, record)
    }
}

impl Default for Doc {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Doc {
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|err| {
            warn!(%err, "Codec copy failed, copying the arena directly");
            self.copy_arena()
        })
    }
}

impl Doc {
    /// Deep copy of the binding tree through the value codec.
    ///
    /// The copy has the same content, zids, clock and history, a fresh
    /// resolve priority and no observers or update handlers.
    pub fn try_clone(&self) -> Result<Self> {
        let (state, clock, history, options) = {
            let inner = self.shared.borrow();
            (
                inner.arena.snapshot(inner.root),
                inner.clock,
                inner.history.clone(),
                inner.options.clone(),
            )
        };
        let record = match codec::clone(&state)? {
            State::Map(record) => record,
            other => {
                return Err(SyncError::InvalidState {
                    reason: format!("root must be a map, found {}", other.kind_name()),
                }
                .into());
            }
        };
        let mut arena = Arena::new();
        let mut registry = Registry::new();
        let root = arena.materialize_root(record, &mut registry);
        let copy = DocInner {
            arena,
            registry,
            root,
            clock,
            history,
            resolve_priority: random_id(),
            options,
            depth: 0,
            cache: None,
            observers: Observers::default(),
            pending: VecDeque::new(),
            releases: Vec::new(),
        };
        Ok(Self {
            shared: Shared::new(copy),
        })
    }

    fn copy_arena(&self) -> Self {
        let inner = self.shared.borrow();
        let copy = DocInner {
            arena: inner.arena.clone(),
            registry: inner.registry.structure_only(),
            root: inner.root,
            clock: inner.clock,
            history: inner.history.clone(),
            resolve_priority: random_id(),
            options: inner.options.clone(),
            depth: 0,
            cache: None,
            observers: Observers::default(),
            pending: VecDeque::new(),
            releases: Vec::new(),
        };
        Self {
            shared: Shared::new(copy),
        }
    }
}

impl fmt::Debug for Doc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.borrow();
        f.debug_struct("Doc")
            .field("clock", &inner.clock)
            .field("resolve_priority", &inner.resolve_priority)
            .field("history", &inner.history.len())
            .finish()
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:p})", Rc::as_ptr(&self.0))
    }
}
