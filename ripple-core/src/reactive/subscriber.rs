//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: effects
//! and computeds. The graph only stores a weak [`Reactive`] handle per
//! subscriber, so it never keeps a dropped computation alive.

use std::fmt;

use crate::error::Result;
use crate::graph::arena::arena_id;

arena_id! {
    /// Unique identifier for a subscriber.
    ///
    /// Each effect or computed gets an id when created. Ids are generational:
    /// once the subscriber is dropped (or the runtime is reset) the id never
    /// refers to another subscriber.
    pub struct SubscriberId;
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:?}", self.0)
    }
}

/// Behaviour the runtime needs from a subscriber without knowing its type.
pub(crate) trait Reactive {
    /// Called by the scheduler when a queued subscriber is flushed.
    fn run_job(&self) -> Result<()>;

    /// Bring a cached value up to date, re-evaluating only if needed.
    fn refresh(&self) -> Result<()>;
}

/// Anything an [`EffectScope`](crate::reactive::EffectScope) can stop.
pub(crate) trait Stoppable {
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::arena::Arena;

    #[test]
    fn subscriber_ids_are_unique() {
        let mut arena: Arena<SubscriberId, ()> = Arena::new();
        let id1 = arena.insert(());
        let id2 = arena.insert(());
        let id3 = arena.insert(());

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn display_is_compact() {
        let mut arena: Arena<SubscriberId, ()> = Arena::new();
        let id = arena.insert(());
        assert_eq!(id.to_string(), "#0v0");
    }
}
