//! Keyed container wrapper.

use std::fmt;
use std::rc::Rc;

use super::{Array, Change, CrdtError, Entry, ObserverId, Shared};
use crate::binding::{Node, NodeKind, Slot, WrapperId};
use crate::event::{Event, Payload};
use crate::path::{KeyPath, KeyType};
use crate::Result;

/// Handle to a map binding.
///
/// Cloning a `Map` yields another handle to the same wrapper. Mutations of an
/// attached map are replicated; mutations of a detached one (see
/// [`Doc::create_map`](super::Doc::create_map)) apply locally until the map is
/// placed into the tree.
#[derive(Clone)]
pub struct Map {
    pub(crate) shared: Shared,
    pub(crate) id: WrapperId,
}

impl Map {
    pub(crate) fn from_parts(shared: Shared, id: WrapperId) -> Self {
        Self { shared, id }
    }

    /// Reads this map's record. A released map reads as empty.
    fn read<R>(&self, f: impl FnOnce(&std::collections::BTreeMap<String, Slot>) -> R) -> Option<R> {
        let inner = self.shared.borrow();
        let node = inner.node_of(self.id).ok()?;
        inner.arena.get(node).and_then(Node::record).map(f)
    }

    pub fn has(&self, key: &str) -> bool {
        self.read(|r| r.contains_key(key)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.read(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at `key`; containers come back as wrappers.
    pub fn get(&self, key: &str) -> Option<Entry> {
        let mut inner = self.shared.borrow_mut();
        let node = inner.node_of(self.id).ok()?;
        let slot = inner.arena.get(node)?.record()?.get(key)?.clone();
        Some(self.shared.entry_for(&mut inner, slot))
    }

    /// The map at `key`.
    ///
    /// Fails with [`CrdtError::MissingTypedElement`] when the key is absent and
    /// with [`CrdtError::TypeMismatch`] when it holds something else.
    pub fn get_map(&self, key: &str) -> Result<Map> {
        match self.typed(key, NodeKind::Map)? {
            Entry::Map(map) => Ok(map),
            other => Err(mismatch("map", &other).into()),
        }
    }

    /// The array at `key`. Errors as for [`Map::get_map`].
    pub fn get_array(&self, key: &str) -> Result<Array> {
        match self.typed(key, NodeKind::Array)? {
            Entry::Array(array) => Ok(array),
            other => Err(mismatch("array", &other).into()),
        }
    }

    fn typed(&self, key: &str, kind: NodeKind) -> std::result::Result<Entry, CrdtError> {
        let entry = self.get(key).ok_or_else(|| CrdtError::MissingTypedElement {
            key: key.to_string(),
        })?;
        let matches = match (&entry, kind) {
            (Entry::Map(_), NodeKind::Map) | (Entry::Array(_), NodeKind::Array) => true,
            _ => false,
        };
        if matches {
            Ok(entry)
        } else {
            Err(mismatch(kind.name(), &entry))
        }
    }

    /// Stores `value` at `key`, replacing whatever was there.
    ///
    /// A detached map or array becomes the stored binding itself, so the
    /// handle passed in stays valid and observes the stored container.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Entry>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        self.shared.check_entry(&value)?;
        self.shared.commit(|inner| {
            let target = inner.node_of(self.id)?;
            let (state, node, tag) = inner.prepare(value, target)?;
            let path = inner.key_path_of(target)?.with(key.as_str(), tag);
            let payload = Payload::for_set(state, node)?;
            Ok(Event::map_set(path, key, payload)?.bound_to(target))
        })
    }

    /// Removes `key`. Deleting an absent key is still replicated.
    pub fn delete(&self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        self.shared.commit(|inner| {
            let target = inner.node_of(self.id)?;
            let path = inner.key_path_of(target)?.with(key.as_str(), KeyType::Value);
            Ok(Event::map_delete(path, key)?.bound_to(target))
        })
    }

    /// Keys in order, snapshotted at call time.
    pub fn keys(&self) -> impl Iterator<Item = String> + use<> {
        self.read(|r| r.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
    }

    /// Values in key order.
    ///
    /// Keys are snapshotted at call time; each value is read when reached,
    /// and keys deleted in the meantime are skipped.
    pub fn values(&self) -> impl Iterator<Item = Entry> + '_ {
        self.keys().filter_map(|key| self.get(&key))
    }

    pub fn entries(&self) -> impl Iterator<Item = (String, Entry)> + '_ {
        self.keys().filter_map(|key| {
            let entry = self.get(&key)?;
            Some((key, entry))
        })
    }

    /// Key path from the document root, or from the topmost ancestor while
    /// detached.
    pub fn key_path(&self) -> Result<KeyPath> {
        let inner = self.shared.borrow();
        let node = inner.node_of(self.id)?;
        Ok(inner.key_path_of(node)?)
    }

    pub fn is_attached(&self) -> bool {
        let inner = self.shared.borrow();
        inner.node_of(self.id).is_ok_and(|node| inner.is_attached(node))
    }

    /// False once the binding behind this handle has been deleted.
    pub fn is_live(&self) -> bool {
        self.shared.borrow().node_of(self.id).is_ok()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let inner = self.shared.borrow();
        match inner.node_of(self.id) {
            Ok(node) => inner.arena.to_json(node),
            Err(_) => serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Registers a change observer. Every handle to this map shares it.
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

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.shared.same_doc(&other.shared)
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map").field("id", &self.id).field("doc", &self.shared).finish()
    }
}
