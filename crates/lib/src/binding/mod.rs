//! The binding tree: the raw replicated state behind every wrapper.
//!
//! Bindings live in a per-document [`Arena`] and are addressed by [`NodeId`]
//! handles handed out on creation. A record slot or array element is a
//! [`Slot`]: either a plain [`Value`] or a handle to a child binding.
//!
//! [`State`] is the owned, serializable snapshot of a binding subtree. It is
//! what the codec sees for `STATE_RESET` messages and for container payloads
//! carried by map-set and array-push events.

pub mod registry;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub use registry::{Registry, WrapperId};

/// Stable array element identifier (24 bits of randomness).
pub type Zid = u32;

/// Arena handle for a binding node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Contents of a record slot or array element.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Node(NodeId),
}

impl Slot {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Slot::Node(id) => Some(*id),
            Slot::Value(_) => None,
        }
    }
}

/// Parallel element/zid sequences of an array binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    pub(crate) elements: Vec<Slot>,
    pub(crate) ids: Vec<Zid>,
}

impl Sequence {
    /// Positional index of the element carrying `zid`.
    pub fn position(&self, zid: Zid) -> Option<usize> {
        self.ids.iter().position(|id| *id == zid)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub(crate) fn push(&mut self, slot: Slot, zid: Zid) {
        self.elements.push(slot);
        self.ids.push(zid);
    }

    /// Removes the element carrying `zid` from both sequences.
    pub(crate) fn remove(&mut self, zid: Zid) -> Option<Slot> {
        let index = self.position(zid)?;
        self.ids.remove(index);
        Some(self.elements.remove(index))
    }
}

/// Shape of a binding node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Map,
    Array,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Root => "doc",
            NodeKind::Map => "map",
            NodeKind::Array => "array",
        }
    }
}

/// A binding node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Document root: a keyed record of top-level containers.
    Root(BTreeMap<String, Slot>),
    /// Map binding: a keyed record.
    Map(BTreeMap<String, Slot>),
    /// Array binding.
    Array(Sequence),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Root(_) => NodeKind::Root,
            Node::Map(_) => NodeKind::Map,
            Node::Array(_) => NodeKind::Array,
        }
    }

    /// Keyed slots of a root or map binding.
    pub fn record(&self) -> Option<&BTreeMap<String, Slot>> {
        match self {
            Node::Root(r) | Node::Map(r) => Some(r),
            Node::Array(_) => None,
        }
    }

    pub fn record_mut(&mut self) -> Option<&mut BTreeMap<String, Slot>> {
        match self {
            Node::Root(r) | Node::Map(r) => Some(r),
            Node::Array(_) => None,
        }
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        match self {
            Node::Array(s) => Some(s),
            _ => None,
        }
    }

    pub fn sequence_mut(&mut self) -> Option<&mut Sequence> {
        match self {
            Node::Array(s) => Some(s),
            _ => None,
        }
    }

    /// Child bindings in slot order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Root(r) | Node::Map(r) => r.values().filter_map(Slot::node).collect(),
            Node::Array(s) => s.elements.iter().filter_map(Slot::node).collect(),
        }
    }
}

/// Serializable snapshot of a binding subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum State {
    /// A plain value leaf.
    Value(Value),
    /// A map binding (also used for the document root).
    Map(BTreeMap<String, State>),
    /// An array binding: elements and their zids, equal length.
    Array { e: Vec<State>, i: Vec<Zid> },
}

impl State {
    /// An empty document root.
    pub fn empty_root() -> Self {
        State::Map(BTreeMap::new())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            State::Value(v) => v.type_name(),
            State::Map(_) => "map",
            State::Array { .. } => "array",
        }
    }
}

/// Owner of all binding nodes of one document.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Snapshots a node and everything below it. The root snapshots as a map.
    pub fn snapshot(&self, id: NodeId) -> State {
        match self.nodes.get(&id) {
            Some(Node::Root(r)) | Some(Node::Map(r)) => State::Map(
                r.iter()
                    .map(|(k, slot)| (k.clone(), self.snapshot_slot(slot)))
                    .collect(),
            ),
            Some(Node::Array(s)) => State::Array {
                e: s.elements.iter().map(|slot| self.snapshot_slot(slot)).collect(),
                i: s.ids.clone(),
            },
            None => State::Value(Value::Null),
        }
    }

    pub fn snapshot_slot(&self, slot: &Slot) -> State {
        match slot {
            Slot::Value(v) => State::Value(v.clone()),
            Slot::Node(id) => self.snapshot(*id),
        }
    }

    /// Builds bindings for a snapshot, recording parent links in `registry`.
    ///
    /// Plain values come back as [`Slot::Value`] without touching the arena.
    pub fn materialize(&mut self, state: State, parent: Option<NodeId>, registry: &mut Registry) -> Slot {
        let (node, children) = match state {
            State::Value(v) => return Slot::Value(v),
            State::Map(record) => (Node::Map(BTreeMap::new()), Pending::Record(record)),
            State::Array { e, i } => {
                if e.len() != i.len() {
                    tracing::warn!(elements = e.len(), ids = i.len(), "Array snapshot has mismatched zid count");
                }
                (Node::Array(Sequence::default()), Pending::Sequence(e, i))
            }
        };
        let id = self.alloc(node);
        if let Some(parent) = parent {
            registry.set_parent(id, parent);
        }
        match children {
            Pending::Record(record) => {
                for (key, child) in record {
                    let slot = self.materialize(child, Some(id), registry);
                    if let Some(r) = self.nodes.get_mut(&id).and_then(Node::record_mut) {
                        r.insert(key, slot);
                    }
                }
            }
            Pending::Sequence(elements, ids) => {
                for (child, zid) in elements.into_iter().zip(ids) {
                    let slot = self.materialize(child, Some(id), registry);
                    if let Some(s) = self.nodes.get_mut(&id).and_then(Node::sequence_mut) {
                        s.push(slot, zid);
                    }
                }
            }
        }
        Slot::Node(id)
    }

    /// Builds a fresh root binding from a root snapshot.
    pub fn materialize_root(&mut self, record: BTreeMap<String, State>, registry: &mut Registry) -> NodeId {
        let root = self.alloc(Node::Root(BTreeMap::new()));
        for (key, child) in record {
            let slot = self.materialize(child, Some(root), registry);
            if let Some(r) = self.nodes.get_mut(&root).and_then(Node::record_mut) {
                r.insert(key, slot);
            }
        }
        root
    }

    /// Removes a node and all its descendants, returning the removed handles.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children());
                removed.push(next);
            }
        }
        removed
    }

    /// Renders a node as JSON, dropping zids.
    pub fn to_json(&self, id: NodeId) -> serde_json::Value {
        match self.nodes.get(&id) {
            Some(Node::Root(r)) | Some(Node::Map(r)) => serde_json::Value::Object(
                r.iter()
                    .map(|(k, slot)| (k.clone(), self.slot_json(slot)))
                    .collect(),
            ),
            Some(Node::Array(s)) => {
                serde_json::Value::Array(s.elements.iter().map(|slot| self.slot_json(slot)).collect())
            }
            None => serde_json::Value::Null,
        }
    }

    pub fn slot_json(&self, slot: &Slot) -> serde_json::Value {
        match slot {
            Slot::Value(v) => v.to_json(),
            Slot::Node(id) => self.to_json(*id),
        }
    }
}

enum Pending {
    Record(BTreeMap<String, State>),
    Sequence(Vec<State>, Vec<Zid>),
}
