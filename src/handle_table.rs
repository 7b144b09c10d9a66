//! Table of live objects, addressed by integer id.
//!
//! Ids are handed out in increasing order and never reused. Ids 0 and 1 are
//! reserved so that callers can use them as "no object" markers.

use std::fmt;

/// Id of an entry in a [`LocalObjectTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object {}", self.0)
    }
}

/// First id handed out by an empty table.
pub const FIRST_OBJECT_ID: u32 = 2;

/// Slot table. Released slots stay behind as tombstones.
#[derive(Debug)]
pub struct LocalObjectTable<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for LocalObjectTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LocalObjectTable<T> {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(16);
        slots.resize_with(FIRST_OBJECT_ID as usize, || None);
        Self { slots, live: 0 }
    }

    /// Store `value` under the next id.
    pub fn put(&mut self, value: T) -> ObjectId {
        let id = ObjectId(self.slots.len() as u32);
        self.slots.push(Some(value));
        self.live += 1;
        id
    }

    pub fn find(&self, id: ObjectId) -> Option<&T> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn find_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Remove an entry, leaving a tombstone.
    pub fn take(&mut self, id: ObjectId) -> Option<T> {
        let taken = self.slots.get_mut(id.0 as usize).and_then(Option::take);
        if taken.is_some() {
            self.live -= 1;
        }
        taken
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Id the next [`put`](Self::put) will return.
    pub fn next_id(&self) -> ObjectId {
        ObjectId(self.slots.len() as u32)
    }
}
