//! The unresolved types table.
//!
//! A method, field or class the runtime cannot resolve at build time is given
//! a slot here. The `Resolve*` node emitted for it names the slot, and the
//! slot is patched with the real pointer the first time the code runs.
//! Registering the same entity twice yields the same slot.

use std::{collections::HashMap, fmt};

use crate::runtime::EntityId;

/// What a deferred-patch slot will hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SlotKind {
    /// Entry point of a static (or non-virtual) method
    #[strum(serialize = "static-method")]
    StaticMethod,
    /// Vtable index of a virtual method
    #[strum(serialize = "virtual-method")]
    VirtualMethod,
    /// Offset of an instance field
    #[strum(serialize = "field")]
    Field,
    /// Address of a static field
    #[strum(serialize = "static-field")]
    StaticField,
    /// Class pointer
    #[strum(serialize = "class")]
    Class,
}

/// Index of a slot in the [`UnresolvedTypesTable`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    /// Returns the slot's position in the table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// One registered slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnresolvedEntry {
    /// What the slot resolves to.
    pub kind: SlotKind,
    /// The entity to resolve.
    pub id: EntityId,
}

/// Registry of deferred-patch slots for one method.
#[derive(Debug, Clone, Default)]
pub struct UnresolvedTypesTable {
    entries: Vec<UnresolvedEntry>,
    index: HashMap<(SlotKind, EntityId), SlotId>,
}

impl UnresolvedTypesTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` as `kind`, returning the existing slot if already present.
    pub fn add(&mut self, kind: SlotKind, id: EntityId) -> SlotId {
        if let Some(&slot) = self.index.get(&(kind, id)) {
            return slot;
        }
        let slot = SlotId(self.entries.len() as u32);
        self.entries.push(UnresolvedEntry { kind, id });
        self.index.insert((kind, id), slot);
        tracing::trace!(%slot, %kind, %id, "registered unresolved slot");
        slot
    }

    /// Looks up an existing slot.
    #[must_use]
    pub fn find(&self, kind: SlotKind, id: EntityId) -> Option<SlotId> {
        self.index.get(&(kind, id)).copied()
    }

    /// Returns the entry of `slot`.
    #[must_use]
    pub fn get(&self, slot: SlotId) -> Option<&UnresolvedEntry> {
        self.entries.get(slot.index())
    }

    /// Number of registered slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the slots in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &UnresolvedEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (SlotId(i as u32), e))
    }

    /// Drops every slot.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
