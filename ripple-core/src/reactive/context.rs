//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when observable state is read,
//! the runtime links it to the innermost running subscriber.
//!
//! # Implementation
//!
//! The runtime keeps a per-thread stack of running subscribers. Entering a
//! context pushes the subscriber and starts a new tracking generation; the
//! returned guard pops it again and prunes dependencies that were not read.
//!
//! Tracking can also be suspended for a stretch of code with
//! [`pause_tracking`] / [`reset_tracking`] or the [`untracked`] helper.

use super::runtime::Runtime;
use super::SubscriberId;
use crate::error::Result;

/// Guard that keeps a subscriber on the running stack.
///
/// Dropping the guard ends the run, even if the computation panics. A
/// computed whose run unwinds is left dirty.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, observable reads register the
    /// subscriber as a dependent.
    pub(crate) fn enter(subscriber_id: SubscriberId) -> Result<Self> {
        Runtime::enter(subscriber_id)?;
        Ok(Self { subscriber_id })
    }

    /// Check if any subscriber is running.
    pub fn is_active() -> bool {
        Runtime::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        Runtime::current_subscriber()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        Runtime::exit(self.subscriber_id, std::thread::panicking());
    }
}

/// Stop recording reads until the matching [`reset_tracking`].
pub fn pause_tracking() {
    Runtime::pause_tracking();
}

/// Record reads again until the matching [`reset_tracking`], even inside a
/// paused region.
pub fn enable_tracking() {
    Runtime::enable_tracking();
}

/// Undo the most recent [`pause_tracking`] or [`enable_tracking`].
pub fn reset_tracking() {
    Runtime::reset_tracking();
}

struct PauseGuard;

impl Drop for PauseGuard {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without recording any of its reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    pause_tracking();
    let _guard = PauseGuard;
    f()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::reactive::{Effect, Ref};

    #[test]
    fn context_tracks_subscriber() {
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        let inside = Rc::new(Cell::new(None));
        let seen = inside.clone();
        let effect = Effect::new(move || seen.set(ReactiveContext::current_subscriber()));

        // Context should be cleaned up after the run
        assert_eq!(inside.get(), Some(effect.id()));
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let outer_seen = Rc::new(Cell::new(None));
        let after_inner = Rc::new(Cell::new(None));

        let outer_slot = outer_seen.clone();
        let after_slot = after_inner.clone();
        let _outer = Effect::new(move || {
            outer_slot.set(ReactiveContext::current_subscriber());
            let _inner = Effect::new(|| {});
            // After inner run ends, outer should be current
            after_slot.set(ReactiveContext::current_subscriber());
        });

        assert!(outer_seen.get().is_some());
        assert_eq!(outer_seen.get(), after_inner.get());
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let source = Ref::new(1);
        let runs = Rc::new(Cell::new(0));

        let src = source.clone();
        let counter = runs.clone();
        let effect = Effect::new(move || {
            untracked(|| src.get());
            counter.set(counter.get() + 1);
        });

        assert_eq!(effect.dependency_count(), 0);
        source.set(2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn enable_tracking_overrides_a_pause() {
        let source = Ref::new(1);
        let src = source.clone();
        let effect = Effect::new(move || {
            pause_tracking();
            enable_tracking();
            src.get();
            reset_tracking();
            reset_tracking();
        });

        assert_eq!(effect.dependency_count(), 1);
    }
}
