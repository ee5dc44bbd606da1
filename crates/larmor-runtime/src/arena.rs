#![forbid(unsafe_code)]

//! Generation-tagged wrapper arena.
//!
//! Wrappers live in slots addressed by [`ObjHandle`], a copyable
//! `(index, generation)` pair. Removing a wrapper retires the slot's
//! generation, so a handle that outlives its object dereferences to `None`
//! instead of whatever moved into the reused slot. Notifier closures and
//! scripting code hold handles, never owned wrappers; a retired handle is a
//! loud, typed failure at the lookup site.
//!
//! # Invariants
//!
//! 1. A slot's generation increments exactly once per removal.
//! 2. `get(h)` returns `Some` iff `h` was produced by `insert` and the value
//!    has not been removed since.
//! 3. Slot indices are reused; generations are not.

use std::fmt;

/// Stable handle to one wrapper slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjHandle {
    index: u32,
    generation: u32,
}

impl ObjHandle {
    /// Slot index, exposed for diagnostics only.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the handle was minted with.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena with generation tagging.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Insert a value, returning its handle.
    pub fn insert(&mut self, value: T) -> ObjHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ObjHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ObjHandle {
            index,
            generation: 0,
        }
    }

    /// Look up a live value; `None` if the handle's generation is retired.
    #[must_use]
    pub fn get(&self, handle: ObjHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable lookup with the same staleness rules as [`Arena::get`].
    pub fn get_mut(&mut self, handle: ObjHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// True when the handle still points at a live value.
    #[must_use]
    pub fn contains(&self, handle: ObjHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Remove a value, retiring the slot's generation.
    pub fn remove(&mut self, handle: ObjHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(value)
    }

    /// Number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// True when no values are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live `(handle, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    ObjHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut arena = Arena::new();
        let h = arena.insert("spectrum");
        assert_eq!(arena.get(h), Some(&"spectrum"));
        assert_eq!(arena.len(), 1);

        assert_eq!(arena.remove(h), Some("spectrum"));
        assert!(arena.is_empty());
        assert_eq!(arena.get(h), None);
    }

    #[test]
    fn stale_handle_after_slot_reuse() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        arena.remove(old);

        let new = arena.insert(2);
        // Slot index is reused, generation is not.
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn double_remove_is_none() {
        let mut arena = Arena::new();
        let h = arena.insert(5);
        assert_eq!(arena.remove(h), Some(5));
        assert_eq!(arena.remove(h), None);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn get_mut_respects_generation() {
        let mut arena = Arena::new();
        let h = arena.insert(10);
        *arena.get_mut(h).unwrap() += 1;
        assert_eq!(arena.get(h), Some(&11));

        arena.remove(h);
        assert!(arena.get_mut(h).is_none());
    }

    #[test]
    fn iter_skips_dead_slots() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        let c = arena.insert("c");
        arena.remove(b);

        let live: Vec<_> = arena.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(live, vec![(a, "a"), (c, "c")]);
    }

    #[test]
    fn handle_display() {
        let mut arena = Arena::new();
        let h = arena.insert(());
        assert_eq!(h.to_string(), "#0v0");
    }
}
