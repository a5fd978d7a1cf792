//! Domain types synchronized by the engine.
//!
//! Children are owned by their parent in a plain `Vec` and point back at the
//! parent by id only; there are no parent pointers.

mod campaign;
mod character;

pub use campaign::{Campaign, Section};
pub use character::{ChatMessage, ChatRole, Character, Memory};

use crate::RemoteId;

/// A value owned by an entity that the server gives its own id.
pub(crate) trait Child: Clone + PartialEq {
    fn id(&self) -> Option<RemoteId>;
    fn parent_id(&self) -> Option<RemoteId>;
    fn set_ids(&mut self, id: Option<RemoteId>, parent_id: Option<RemoteId>);

    /// Equal apart from the server-assigned ids.
    fn same_content(&self, other: &Self) -> bool {
        let mut a = self.clone();
        a.set_ids(None, None);
        let mut b = other.clone();
        b.set_ids(None, None);
        a == b
    }
}

/// Number new children and point every child at `parent_id`.
pub(crate) fn link_all<C: Child>(
    children: &mut [C],
    parent_id: RemoteId,
    next_id: &mut dyn FnMut() -> RemoteId,
) {
    for child in children {
        let id = child.id().unwrap_or_else(|| next_id());
        child.set_ids(Some(id), Some(parent_id));
    }
}

/// Copy ids the server gave to the children of `sent` (as echoed back in
/// `stored`) onto the matching children of `local`.
///
/// `local` may have changed since `sent` went out. A child is matched by
/// content first, then by position; children that already have an id are
/// left alone.
pub(crate) fn adopt_ids<C: Child>(local: &mut [C], sent: &[C], stored: &[C]) {
    for (index, (sent_child, stored_child)) in sent.iter().zip(stored).enumerate() {
        if sent_child.id().is_some() {
            continue;
        }
        let Some(id) = stored_child.id() else {
            continue;
        };
        if local.iter().any(|c| c.id() == Some(id)) {
            continue;
        }

        let target = local
            .iter()
            .position(|c| c.id().is_none() && c.same_content(sent_child))
            .or_else(|| {
                local
                    .get(index)
                    .filter(|c| c.id().is_none())
                    .map(|_| index)
            });
        if let Some(target) = target {
            local[target].set_ids(Some(id), stored_child.parent_id());
        }
    }
}
