//! Generational arena backing every graph node.
//!
//! Slots are reused after removal, but each reuse bumps the slot's
//! generation, so an id held past its node's removal never aliases a newer
//! node. Lookups with a stale id simply return `None`.

use std::fmt;
use std::marker::PhantomData;

/// Raw slot address: position plus generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

/// Declare a typed id over [`Index`].
macro_rules! arena_id {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $name($crate::graph::arena::Index);

        impl From<$crate::graph::arena::Index> for $name {
            fn from(index: $crate::graph::arena::Index) -> Self {
                Self(index)
            }
        }

        impl From<$name> for $crate::graph::arena::Index {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }
    };
}

pub(crate) use arena_id;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A slab of `T` addressed by typed ids `K`.
pub(crate) struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K, T> Arena<K, T>
where
    K: Copy + From<Index> + Into<Index>,
{
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> K {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.value = Some(value);
            return K::from(Index {
                slot,
                generation: entry.generation,
            });
        }

        let slot = u32::try_from(self.slots.len()).expect("arena exhausted u32 slots");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        K::from(Index {
            slot,
            generation: 0,
        })
    }

    pub fn remove(&mut self, id: K) -> Option<T> {
        let index: Index = id.into();
        let entry = self.slots.get_mut(index.slot as usize)?;
        if entry.generation != index.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index.slot);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, id: K) -> Option<&T> {
        let index: Index = id.into();
        self.slots
            .get(index.slot as usize)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn get_mut(&mut self, id: K) -> Option<&mut T> {
        let index: Index = id.into();
        self.slots
            .get_mut(index.slot as usize)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    pub fn contains(&self, id: K) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Remove every value, invalidating all outstanding ids.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if let Some(value) = entry.value.take() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(slot as u32);
                values.push(value);
            }
        }
        self.len = 0;
        values
    }
}

impl<K, T> Default for Arena<K, T>
where
    K: Copy + From<Index> + Into<Index>,
{
    fn default() -> Self {
        Self::new()
    }
}
