//! List container wrapper.
//!
//! Elements are addressed positionally for reads and deletes, but every
//! element also carries a zid, a random identifier that stays the same on
//! every replica. Key paths into arrays use zids, so concurrent pushes and
//! deletes never shift each other's targets.

use std::fmt;
use std::rc::Rc;

use super::{Change, CrdtError, Entry, Map, ObserverId, Shared};
use crate::binding::{Node, Sequence, WrapperId, Zid};
use crate::event::{Event, Payload};
use crate::path::{KeyPath, KeyType};
use crate::Result;

/// Handle to an array binding.
#[derive(Clone)]
pub struct Array {
    pub(crate) shared: Shared,
    pub(crate) id: WrapperId,
}

impl Array {
    pub(crate) fn from_parts(shared: Shared, id: WrapperId) -> Self {
        Self { shared, id }
    }

    fn read<R>(&self, f: impl FnOnce(&Sequence) -> R) -> Option<R> {
        let inner = self.shared.borrow();
        let node = inner.node_of(self.id).ok()?;
        inner.arena.get(node).and_then(Node::sequence).map(f)
    }

    pub fn len(&self) -> usize {
        self.read(Sequence::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zid of the element at `index`.
    pub fn zid_at(&self, index: usize) -> Option<Zid> {
        self.read(|s| s.ids.get(index).copied()).flatten()
    }

    /// Zids of all elements, in order.
    pub fn zids(&self) -> Vec<Zid> {
        self.read(|s| s.ids.clone()).unwrap_or_default()
    }

    pub fn get(&self, index: usize) -> Option<Entry> {
        let mut inner = self.shared.borrow_mut();
        let node = inner.node_of(self.id).ok()?;
        let slot = inner.arena.get(node)?.sequence()?.elements.get(index)?.clone();
        Some(self.shared.entry_for(&mut inner, slot))
    }

    pub fn get_by_id(&self, zid: Zid) -> Option<Entry> {
        let mut inner = self.shared.borrow_mut();
        let node = inner.node_of(self.id).ok()?;
        let seq = inner.arena.get(node)?.sequence()?;
        let slot = seq.elements.get(seq.position(zid)?)?.clone();
        Some(self.shared.entry_for(&mut inner, slot))
    }

    pub fn get_map_by_id(&self, zid: Zid) -> Result<Map> {
        match self.get_by_id(zid) {
            Some(Entry::Map(map)) => Ok(map),
            Some(other) => Err(mismatch("map", &other).into()),
            None => Err(missing(zid).into()),
        }
    }

    pub fn get_array_by_id(&self, zid: Zid) -> Result<Array> {
        match self.get_by_id(zid) {
            Some(Entry::Array(array)) => Ok(array),
            Some(other) => Err(mismatch("array", &other).into()),
            None => Err(missing(zid).into()),
        }
    }

    /// Elements in order. Zids are snapshotted at call time and elements
    /// deleted in the meantime are skipped.
    pub fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        self.zids().into_iter().filter_map(|zid| self.get_by_id(zid))
    }

    /// Appends one element and returns its zid.
    ///
    /// Exactly one item is accepted per call; anything else fails with
    /// [`CrdtError::UnsupportedBatchSize`].
    pub fn push<I, E>(&self, items: I) -> Result<Zid>
    where
        I: IntoIterator<Item = E>,
        E: Into<Entry>,
    {
        let mut items: Vec<Entry> = items.into_iter().map(Into::into).collect();
        if items.len() != 1 {
            return Err(CrdtError::UnsupportedBatchSize {
                operation: "push".to_string(),
                len: items.len(),
            }
            .into());
        }
        let value = items.remove(0);
        self.shared.check_entry(&value)?;

        let mut zid = 0;
        self.shared.commit(|inner| {
            let target = inner.node_of(self.id)?;
            let (state, node, tag) = inner.prepare(value, target)?;
            zid = inner.fresh_zid(target);
            let path = inner.key_path_of(target)?.with(zid, tag.element());
            let payload = Payload::for_push(state, node)?;
            Ok(Event::array_push(path, payload)?.bound_to(target))
        })?;
        Ok(zid)
    }

    /// Removes `length` elements starting at `index`. Only `length == 1` is
    /// supported.
    pub fn delete(&self, index: usize, length: usize) -> Result<()> {
        if length != 1 {
            return Err(CrdtError::UnsupportedBatchSize {
                operation: "delete".to_string(),
                len: length,
            }
            .into());
        }
        self.shared.commit(|inner| {
            let target = inner.node_of(self.id)?;
            let len = inner.arena.get(target).and_then(Node::sequence).map_or(0, Sequence::len);
            let zid = inner
                .arena
                .get(target)
                .and_then(Node::sequence)
                .and_then(|s| s.ids.get(index).copied())
                .ok_or(CrdtError::IndexOutOfBounds { index, len })?;
            let path = inner.key_path_of(target)?.with(zid, KeyType::ElementValue);
            Ok(Event::array_delete(path)?.bound_to(target))
        })
    }

    pub fn key_path(&self) -> Result<KeyPath> {
        let inner = self.shared.borrow();
        let node = inner.node_of(self.id)?;
        Ok(inner.key_path_of(node)?)
    }

    pub fn is_attached(&self) -> bool {
        let inner = self.shared.borrow();
        inner.node_of(self.id).is_ok_and(|node| inner.is_attached(node))
    }

    pub fn is_live(&self) -> bool {
        self.shared.borrow().node_of(self.id).is_ok()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let inner = self.shared.borrow();
        match inner.node_of(self.id) {
            Ok(node) => inner.arena.to_json(node),
            Err(_) => serde_json::Value::Array(Vec::new()),
        }
    }

    pub fn observe(&self, f: impl Fn(&Change) + 'static) -> ObserverId {
        self.shared.borrow_mut().observers.observe(self.id, Rc::new(f))
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.shared.borrow_mut().observers.unobserve(self.id, id)
    }
}

fn mismatch(expected: &str, found: &Entry) -> CrdtError {
    CrdtError::TypeMismatch {
        expected: expected.to_string(),
        actual: found.type_name().to_string(),
    }
}

fn missing(zid: Zid) -> CrdtError {
    CrdtError::MissingTypedElement { key: zid.to_string() }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.shared.same_doc(&other.shared)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array").field("id", &self.id).field("doc", &self.shared).finish()
    }
}
