use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use log::warn;

use crate::ghosts::replicable::Replicable;

/// Identifies an object held by an [`ObjectRegistry`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn to_u32(&self) -> u32 {
        self.0
    }
}

bitflags! {
    /// How an object takes part in ghosting
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u8 {
        /// May be ghosted at all
        const GHOSTABLE = 1 << 0;
        /// Ghosted to every connection, ahead of normal ghosting
        const SCOPE_ALWAYS = 1 << 1;
        /// Ghosted only to in-process connections
        const SCOPE_LOCAL = 1 << 2;
    }
}

/// A change every connection ghosting from this registry has to hear about
pub enum ObjectChange {
    Dirty { id: ObjectId, mask: u32 },
    ScopeAlwaysSet { id: ObjectId },
    ScopeAlwaysCleared { id: ObjectId },
    /// The object is gone; it is carried along so connections can still
    /// send its final state
    Removed { id: ObjectId, object: Box<dyn Replicable> },
}

struct ObjectRecord {
    object: Box<dyn Replicable>,
    flags: ObjectFlags,
}

/// The server's set of replicable objects.
///
/// Mutations are recorded as [`ObjectChange`]s. Dirty masks are merged per
/// object and reported ahead of the structural changes.
pub struct ObjectRegistry {
    objects: BTreeMap<ObjectId, ObjectRecord>,
    next_id: u32,
    dirty: BTreeMap<ObjectId, u32>,
    changes: Vec<ObjectChange>,
    scope_always: BTreeSet<ObjectId>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
            dirty: BTreeMap::new(),
            changes: Vec::new(),
            scope_always: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, object: Box<dyn Replicable>, flags: ObjectFlags) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.objects.insert(id, ObjectRecord { object, flags });
        if flags.contains(ObjectFlags::SCOPE_ALWAYS) {
            self.scope_always.insert(id);
            self.changes.push(ObjectChange::ScopeAlwaysSet { id });
        }
        id
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&dyn Replicable> {
        self.objects.get(&id).map(|record| record.object.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut dyn Replicable> {
        match self.objects.get_mut(&id) {
            Some(record) => Some(record.object.as_mut()),
            None => None,
        }
    }

    pub fn get_as<R: Replicable>(&self, id: ObjectId) -> Option<&R> {
        self.get(id)?.as_any().downcast_ref::<R>()
    }

    pub fn get_mut_as<R: Replicable>(&mut self, id: ObjectId) -> Option<&mut R> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<R>()
    }

    pub fn flags(&self, id: ObjectId) -> Option<ObjectFlags> {
        self.objects.get(&id).map(|record| record.flags)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &dyn Replicable, ObjectFlags)> {
        self.objects
            .iter()
            .map(|(id, record)| (*id, record.object.as_ref(), record.flags))
    }

    /// Marks state parts of `id` dirty on every connection ghosting it
    pub fn set_mask_bits(&mut self, id: ObjectId, mask: u32) {
        if mask == 0 {
            return;
        }
        if !self.objects.contains_key(&id) {
            warn!("ObjectRegistry: set_mask_bits on unknown object {:?}", id);
            return;
        }
        *self.dirty.entry(id).or_insert(0) |= mask;
    }

    pub fn set_scope_always(&mut self, id: ObjectId) {
        let Some(record) = self.objects.get_mut(&id) else {
            return;
        };
        if record.flags.contains(ObjectFlags::SCOPE_ALWAYS) {
            return;
        }
        record.flags.insert(ObjectFlags::SCOPE_ALWAYS);
        self.scope_always.insert(id);
        self.changes.push(ObjectChange::ScopeAlwaysSet { id });
    }

    pub fn clear_scope_always(&mut self, id: ObjectId) {
        let Some(record) = self.objects.get_mut(&id) else {
            return;
        };
        if !record.flags.contains(ObjectFlags::SCOPE_ALWAYS) {
            return;
        }
        record.flags.remove(ObjectFlags::SCOPE_ALWAYS);
        self.scope_always.remove(&id);
        self.changes.push(ObjectChange::ScopeAlwaysCleared { id });
    }

    /// Returns false if there was no such object
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(record) = self.objects.remove(&id) else {
            return false;
        };
        self.scope_always.remove(&id);
        self.changes.push(ObjectChange::Removed {
            id,
            object: record.object,
        });
        true
    }

    /// Ghostable scope-always objects, in id order
    pub fn scope_always_objects(&self) -> Vec<ObjectId> {
        self.scope_always
            .iter()
            .filter(|id| {
                self.flags(**id)
                    .map(|flags| flags.contains(ObjectFlags::GHOSTABLE))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// Everything that changed since the last call: merged dirty masks
    /// first, then structural changes in the order they happened
    pub fn take_changes(&mut self) -> Vec<ObjectChange> {
        let mut changes: Vec<ObjectChange> = std::mem::take(&mut self.dirty)
            .into_iter()
            .map(|(id, mask)| ObjectChange::Dirty { id, mask })
            .collect();
        changes.append(&mut self.changes);
        changes
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
