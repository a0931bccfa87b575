//! Generation-checked typed handles and the slot storage that issues them.
//!
//! A [`Handle<T>`] is an index into a [`HandleMap<T>`] paired with the
//! generation of the slot at the time the value was inserted. Removing a
//! value bumps the slot generation, so a stale handle never resolves to a
//! value inserted later into the same slot.
//!
//! # Example
//!
//! ```
//! use ironframe_core::handle::HandleMap;
//!
//! let mut map = HandleMap::new();
//! let a = map.insert("albedo");
//! assert_eq!(map.get(a), Some(&"albedo"));
//!
//! map.remove(a);
//! let b = map.insert("normal");
//! assert_eq!(a.index(), b.index());
//! assert!(map.get(a).is_none());
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed, generation-checked reference to a value stored in a [`HandleMap`].
///
/// `Handle<Buffer>` and `Handle<Texture>` are distinct types, so a buffer
/// handle cannot be used for a texture lookup.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index of this handle.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls so that `T` does not need to implement these traits.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense slot storage with a free list and per-slot generations.
pub struct HandleMap<T> {
    slots: Vec<Slot<T>>,
    /// Recyclable slot indices (LIFO).
    free_list: Vec<u32>,
    len: usize,
}

impl<T> HandleMap<T> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Stores `value` and returns a fresh handle for it, reusing a free slot
    /// when one is available.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            Handle::new(index, 0)
        }
    }

    /// Removes and returns the value for `handle`, or `None` if the handle is
    /// unknown or stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns `true` if `handle` refers to a live value.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates live values together with their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Removes every live value, returning them in slot order.
    ///
    /// Slot generations are bumped so that all outstanding handles go stale.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                out.push(value);
            }
        }
        self.len = 0;
        out
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleMap")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .field("free", &self.free_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn insert_and_get() {
        let mut map = HandleMap::new();
        let a = map.insert(10u32);
        let b = map.insert(20u32);
        assert_eq!(map.get(a), Some(&10));
        assert_eq!(map.get(b), Some(&20));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn handles_are_pairwise_distinct() {
        let mut map = HandleMap::new();
        let handles: Vec<_> = (0..100).map(|i| map.insert(i)).collect();
        let unique: HashSet<_> = handles.iter().copied().collect();
        assert_eq!(unique.len(), handles.len());
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(map.get(*handle), Some(&i));
        }
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let mut map = HandleMap::new();
        let old = map.insert("old");
        assert_eq!(map.remove(old), Some("old"));

        let new = map.insert("new");
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(map.get(old).is_none());
        assert_eq!(map.get(new), Some(&"new"));
    }

    #[test]
    fn double_remove_returns_none() {
        let mut map = HandleMap::new();
        let a = map.insert(1);
        assert!(map.remove(a).is_some());
        assert!(map.remove(a).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn out_of_range_handle() {
        let map: HandleMap<u8> = HandleMap::new();
        assert!(map.get(Handle::new(42, 0)).is_none());
    }

    #[test]
    fn drain_invalidates_all_handles() {
        let mut map = HandleMap::new();
        let a = map.insert(1);
        let b = map.insert(2);
        assert_eq!(map.drain(), vec![1, 2]);
        assert!(map.is_empty());
        assert!(!map.contains(a));
        assert!(!map.contains(b));
    }

    #[test]
    fn iter_skips_removed() {
        let mut map = HandleMap::new();
        let a = map.insert('a');
        let _b = map.insert('b');
        map.remove(a);
        let values: Vec<_> = map.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['b']);
    }

    #[test]
    fn debug_format() {
        let handle: Handle<()> = Handle::new(3, 7);
        assert_eq!(format!("{:?}", handle), "Handle(3v7)");
        assert_eq!(format!("{}", handle), "3v7");
    }
}
