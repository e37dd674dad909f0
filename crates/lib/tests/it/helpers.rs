use std::cell::RefCell;
use std::rc::Rc;

use zdoc::{Doc, DocOptions, Origin, Result, apply_update, encode_state_as_update};

/// Origin used when a test relays an update to another peer.
pub const REMOTE: &str = "remote";

/// A document plus the updates it emitted for its own local transactions.
///
/// Updates applied with the [`REMOTE`] origin are not recorded, so relaying
/// between two peers never echoes a transaction back to its author.
pub struct Peer {
    pub doc: Doc,
    outbox: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Peer {
    pub fn new(priority: u32) -> Self {
        Self::from_doc(Doc::with_options(DocOptions::new().with_resolve_priority(priority)))
    }

    pub fn from_doc(doc: Doc) -> Self {
        let outbox = Rc::new(RefCell::new(Vec::new()));
        let sink = outbox.clone();
        doc.on_update(move |event| {
            if event.origin != Some(&Origin::from(REMOTE)) {
                sink.borrow_mut().push(event.update.to_vec());
            }
        });
        Self { doc, outbox }
    }

    /// Drains the recorded updates.
    pub fn take_updates(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    pub fn pending(&self) -> usize {
        self.outbox.borrow().len()
    }

    /// Applies every pending update of `self` to `other`.
    pub fn send_to(&self, other: &Peer) -> Result<()> {
        for update in self.take_updates() {
            apply_update(&other.doc, &update, Some(Origin::from(REMOTE)))?;
        }
        Ok(())
    }

    /// Replaces `other`'s content with a full snapshot of `self`.
    pub fn reset(&self, other: &Peer) -> Result<()> {
        let update = encode_state_as_update(&self.doc)?;
        apply_update(&other.doc, &update, Some(Origin::from(REMOTE)))
    }
}

/// Two peers at the same clock and content, with the given priorities.
pub fn synced_pair(first: u32, second: u32) -> (Peer, Peer) {
    let a = Peer::new(first);
    let b = Peer::new(second);
    a.doc.get_map("root").unwrap().set("seed", true).unwrap();
    a.take_updates();
    a.reset(&b).unwrap();
    assert_eq!(a.doc.clock(), b.doc.clock());
    (a, b)
}

/// Exchanges pending updates in both directions, `a`'s first.
pub fn exchange(a: &Peer, b: &Peer) -> Result<()> {
    let from_a = a.take_updates();
    let from_b = b.take_updates();
    for update in &from_b {
        apply_update(&a.doc, update, Some(Origin::from(REMOTE)))?;
    }
    for update in &from_a {
        apply_update(&b.doc, update, Some(Origin::from(REMOTE)))?;
    }
    Ok(())
}
