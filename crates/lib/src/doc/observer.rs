//! Change records and observer tables.
//!
//! Mutations queue [`RawChange`]s while the document is borrowed. The queue is
//! drained once the borrow is released, and only then are raw records turned
//! into public [`Change`]s and handed to callbacks, so a callback may freely
//! mutate the document it is observing.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::{Array, Entry, Map, Shared};
use crate::binding::WrapperId;
use crate::transaction::Origin;
use crate::value::Value;

/// Handle returned by `observe` / `on_update`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// What happened to a key or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Update,
    Delete,
}

/// A member of the `added` / `deleted` sets: a map key or an array value.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Key(String),
    Value(Entry),
}

/// Per-member actions of one change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub keys: BTreeMap<String, Action>,
    pub values: Vec<(Entry, Action)>,
}

/// Structured change record delivered to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    pub added: Vec<Member>,
    pub deleted: Vec<Member>,
    pub changes: Changes,
}

impl Change {
    /// Action recorded for a map key, if any.
    pub fn key_action(&self, key: &str) -> Option<Action> {
        self.changes.keys.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.changes.keys.is_empty() && self.changes.values.is_empty()
    }
}

/// Payload of an `update` notification.
#[derive(Debug, Clone, Copy)]
pub struct UpdateEvent<'a> {
    /// The serialized update message, ready to relay to peers.
    pub update: &'a [u8],
    /// Origin the transaction was opened with.
    pub origin: Option<&'a Origin>,
}

pub(crate) type ChangeFn = Rc<dyn Fn(&Change)>;
pub(crate) type UpdateFn = Rc<dyn Fn(&UpdateEvent<'_>)>;

/// Member captured while the document is borrowed.
#[derive(Debug, Clone)]
pub(crate) enum RawMember {
    Key(String),
    Value(Value),
    Map(WrapperId),
    Array(WrapperId),
}

impl RawMember {
    fn entry(self, shared: &Shared) -> Member {
        match self {
            RawMember::Key(key) => Member::Key(key),
            RawMember::Value(v) => Member::Value(Entry::Value(v)),
            RawMember::Map(id) => Member::Value(Entry::Map(Map::from_parts(shared.clone(), id))),
            RawMember::Array(id) => Member::Value(Entry::Array(Array::from_parts(shared.clone(), id))),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RawChange {
    pub(crate) wrapper: WrapperId,
    added: Vec<RawMember>,
    deleted: Vec<RawMember>,
    keys: Vec<(String, Action)>,
    values: Vec<(RawMember, Action)>,
}

impl RawChange {
    pub(crate) fn new(wrapper: WrapperId) -> Self {
        Self {
            wrapper,
            added: Vec::new(),
            deleted: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    pub(crate) fn key(mut self, key: impl Into<String>, action: Action) -> Self {
        let key = key.into();
        match action {
            Action::Add => self.added.push(RawMember::Key(key.clone())),
            Action::Delete => self.deleted.push(RawMember::Key(key.clone())),
            Action::Update => {}
        }
        self.keys.push((key, action));
        self
    }

    pub(crate) fn value(mut self, member: RawMember, action: Action) -> Self {
        match action {
            Action::Add => self.added.push(member.clone()),
            Action::Delete => self.deleted.push(member.clone()),
            Action::Update => {}
        }
        self.values.push((member, action));
        self
    }

    pub(crate) fn into_change(self, shared: &Shared) -> Change {
        let mut change = Change {
            added: self.added.into_iter().map(|m| m.entry(shared)).collect(),
            deleted: self.deleted.into_iter().map(|m| m.entry(shared)).collect(),
            changes: Changes::default(),
        };
        change.changes.keys = self.keys.into_iter().collect();
        for (member, action) in self.values {
            if let Member::Value(entry) = member.entry(shared) {
                change.changes.values.push((entry, action));
            }
        }
        change
    }
}

/// Callback tables of one document.
#[derive(Default)]
pub(crate) struct Observers {
    changes: HashMap<WrapperId, Vec<(ObserverId, ChangeFn)>>,
    updates: Vec<(ObserverId, UpdateFn)>,
    next: u64,
}

impl Observers {
    fn next_id(&mut self) -> ObserverId {
        let id = ObserverId(self.next);
        self.next += 1;
        id
    }

    pub(crate) fn observe(&mut self, wrapper: WrapperId, f: ChangeFn) -> ObserverId {
        let id = self.next_id();
        self.changes.entry(wrapper).or_default().push((id, f));
        id
    }

    pub(crate) fn unobserve(&mut self, wrapper: WrapperId, id: ObserverId) -> bool {
        let Some(list) = self.changes.get_mut(&wrapper) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.changes.remove(&wrapper);
        }
        removed
    }

    pub(crate) fn is_observed(&self, wrapper: WrapperId) -> bool {
        self.changes.contains_key(&wrapper)
    }

    /// Callbacks for `wrapper`, in registration order.
    pub(crate) fn listeners(&self, wrapper: WrapperId) -> Vec<ChangeFn> {
        self.changes
            .get(&wrapper)
            .map(|list| list.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn drop_wrapper(&mut self, wrapper: WrapperId) {
        self.changes.remove(&wrapper);
    }

    pub(crate) fn on_update(&mut self, f: UpdateFn) -> ObserverId {
        let id = self.next_id();
        self.updates.push((id, f));
        id
    }

    pub(crate) fn off_update(&mut self, id: ObserverId) -> bool {
        let before = self.updates.len();
        self.updates.retain(|(existing, _)| *existing != id);
        self.updates.len() != before
    }

    pub(crate) fn update_handlers(&self) -> Vec<UpdateFn> {
        self.updates.iter().map(|(_, f)| f.clone()).collect()
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("observed_wrappers", &self.changes.len())
            .field("update_handlers", &self.updates.len())
            .finish()
    }
}
