//! Identity registry.
//!
//! Per-document side tables associating binding nodes with their typed wrapper
//! and with their parent binding. Entries are only ever looked up, never
//! iterated, and are dropped explicitly when their binding is released.

use std::collections::HashMap;

use super::NodeId;
use crate::doc::CrdtError;

/// Identity of a typed wrapper (a `Map` or `Array` handle).
///
/// All handles sharing a `WrapperId` are the same wrapper: they share
/// observers and follow the same binding across state resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

#[derive(Debug, Clone, Default)]
pub struct Registry {
    wrappers: HashMap<NodeId, WrapperId>,
    bindings: HashMap<WrapperId, NodeId>,
    parents: HashMap<NodeId, NodeId>,
    next_wrapper: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a wrapper identity that is not yet bound to anything.
    pub fn allocate(&mut self) -> WrapperId {
        let id = WrapperId(self.next_wrapper);
        self.next_wrapper += 1;
        id
    }

    /// Registers a 1:1 association between a binding and a wrapper.
    pub fn bind(&mut self, node: NodeId, wrapper: WrapperId) -> Result<(), CrdtError> {
        if let Some(existing) = self.wrappers.get(&node) {
            if *existing != wrapper {
                return Err(CrdtError::AlreadyBound {
                    binding: node.to_string(),
                });
            }
            return Ok(());
        }
        self.link(node, wrapper);
        Ok(())
    }

    fn link(&mut self, node: NodeId, wrapper: WrapperId) {
        self.wrappers.insert(node, wrapper);
        self.bindings.insert(wrapper, node);
    }

    pub fn lookup(&self, node: NodeId) -> Option<WrapperId> {
        self.wrappers.get(&node).copied()
    }

    /// Returns the wrapper for `node`, creating it on first access.
    pub fn wrapper_for(&mut self, node: NodeId) -> WrapperId {
        if let Some(existing) = self.lookup(node) {
            return existing;
        }
        let wrapper = self.allocate();
        self.link(node, wrapper);
        wrapper
    }

    /// The binding a wrapper currently points at.
    pub fn binding_of(&self, wrapper: WrapperId) -> Option<NodeId> {
        self.bindings.get(&wrapper).copied()
    }

    /// Moves a wrapper onto a different binding.
    ///
    /// Fails with `AlreadyBound`, leaving both associations intact, when
    /// `node` already belongs to another wrapper.
    pub fn rebind(&mut self, wrapper: WrapperId, node: NodeId) -> Result<(), CrdtError> {
        if self.lookup(node).is_some_and(|existing| existing != wrapper) {
            return Err(CrdtError::AlreadyBound {
                binding: node.to_string(),
            });
        }
        if let Some(old) = self.bindings.remove(&wrapper) {
            if self.wrappers.get(&old) == Some(&wrapper) {
                self.wrappers.remove(&old);
            }
        }
        self.bind(node, wrapper)
    }

    pub fn set_parent(&mut self, node: NodeId, parent: NodeId) {
        self.parents.insert(node, parent);
    }

    pub fn clear_parent(&mut self, node: NodeId) {
        self.parents.remove(&node);
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.parents.get(&node).copied()
    }

    /// Drops every entry keyed by a released binding.
    ///
    /// A wrapper that was remapped elsewhere keeps its new binding. Returns the
    /// wrapper that lost its binding, if any.
    pub fn forget(&mut self, node: NodeId) -> Option<WrapperId> {
        self.parents.remove(&node);
        let wrapper = self.wrappers.remove(&node)?;
        if self.bindings.get(&wrapper) == Some(&node) {
            self.bindings.remove(&wrapper);
            return Some(wrapper);
        }
        None
    }

    /// Copy carrying parent links only, for an independent document.
    pub fn structure_only(&self) -> Self {
        Self {
            wrappers: HashMap::new(),
            bindings: HashMap::new(),
            parents: self.parents.clone(),
            next_wrapper: 0,
        }
    }
}
