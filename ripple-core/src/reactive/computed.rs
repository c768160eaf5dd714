//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Construction does not evaluate. On first access, the computed runs its
//!    getter under tracking and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, the cached value
//!    is returned.
//!
//! 3. When a direct dependency changes, the computed is marked dirty and its
//!    own readers "maybe dirty". Nothing is recomputed at that point.
//!
//! 4. On next access (or when a maybe-dirty reader is about to re-run), the
//!    computed first refreshes the computeds it read itself, then recomputes
//!    only if it is still dirty.
//!
//! 5. If the new value equals the cached one (`PartialEq`), maybe-dirty
//!    readers stay clean; otherwise they are upgraded to dirty.
//!
//! A computed is never queued by the scheduler: evaluation is always pulled
//! by a reader.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::context::{untracked, ReactiveContext};
use super::runtime::Runtime;
use super::scope;
use super::subscriber::{Reactive, Stoppable, SubscriberId};
use crate::error::{ReactiveError, Result};
use crate::graph::{DepId, DirtyLevel};

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (a computed might return the same value even if inputs changed).
pub struct Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    id: SubscriberId,
    dep: DepId,
    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
    evaluations: Cell<usize>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new computed with the given getter.
    ///
    /// The getter is not run immediately. It runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, None)
    }

    /// Create a writable computed. Writes go to `setter`, bypassing the getter.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)), None)
    }

    /// Create a computed whose label appears in logs and errors.
    pub fn labeled<F>(label: impl Into<Cow<'static, str>>, getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, Some(label.into()))
    }

    fn build(
        getter: Box<dyn Fn() -> T>,
        setter: Option<Box<dyn Fn(T)>>,
        label: Option<Cow<'static, str>>,
    ) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let handle: Weak<dyn Reactive> = this.clone();
            let (id, dep) = Runtime::register_computed(handle, label);
            ComputedInner {
                id,
                dep,
                getter,
                setter,
                value: RefCell::new(None),
                evaluations: Cell::new(0),
            }
        });
        scope::record(inner.clone());
        Self { inner }
    }

    /// Get the subscriber ID for this computed.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the getter panics, or with the error of [`try_get`] when the
    /// getter (transitively) reads this computed.
    ///
    /// [`try_get`]: Self::try_get
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Returns [`ReactiveError::CyclicComputed`] when read from inside its own
    /// getter.
    pub fn try_get(&self) -> Result<T> {
        let inner = &self.inner;
        if !Runtime::is_active(inner.id) {
            if Runtime::is_running(inner.id) {
                return Err(inner.cyclic());
            }
            // stopped: plain function call
            return Ok(untracked(|| (inner.getter)()));
        }

        inner.refresh()?;
        Runtime::track_dep(inner.dep);
        inner
            .value
            .borrow()
            .clone()
            .ok_or_else(|| ReactiveError::Disposed {
                subscriber: Runtime::describe(inner.id),
            })
    }

    /// Write through the setter.
    pub fn set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::ReadonlyComputed),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Stop tracking sources. Later reads call the getter directly.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        Runtime::is_active(self.inner.id)
    }

    /// Whether the next read has to re-evaluate (or at least re-check).
    pub fn is_dirty(&self) -> bool {
        Runtime::level(self.inner.id).is_some_and(|level| level != DirtyLevel::Clean)
    }

    /// Number of times the getter ran under tracking.
    pub fn evaluations(&self) -> usize {
        self.inner.evaluations.get()
    }

    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }

    /// Number of subscribers currently reading this computed.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.dep)
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn cyclic(&self) -> ReactiveError {
        ReactiveError::CyclicComputed {
            subscriber: Runtime::describe(self.id),
        }
    }

    fn recompute(&self) -> Result<()> {
        let value = {
            let _ctx = ReactiveContext::enter(self.id)?;
            (self.getter)()
        };
        self.evaluations.set(self.evaluations.get() + 1);

        let changed = self.value.borrow().as_ref() != Some(&value);
        if changed {
            let previous = self.value.replace(Some(value));
            drop(previous);
            Runtime::mark_readers_dirty(self.dep);
        }
        Ok(())
    }

    fn stop(&self) {
        Runtime::stop_subscriber(self.id);
    }
}

impl<T> Reactive for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn run_job(&self) -> Result<()> {
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        if Runtime::is_running(self.id) {
            return Err(self.cyclic());
        }
        if !Runtime::is_active(self.id) {
            return Ok(());
        }
        if Runtime::is_dirty(self.id)? || self.value.borrow().is_none() {
            self.recompute()?;
        }
        Ok(())
    }
}

impl<T> Stoppable for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn stop(&self) {
        ComputedInner::stop(self);
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::dispose_subscriber(self.id);
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("dirty", &self.is_dirty())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create a read-only computed. Shorthand for [`Computed::new`].
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;
    use crate::reactive::{Effect, Ref};

    #[test]
    fn computed_is_lazy() {
        let source = Ref::new(1);
        let src = source.clone();
        let doubled = Computed::new(move || src.get() * 2);

        // Not computed yet
        assert!(!doubled.has_value());
        assert_eq!(doubled.evaluations(), 0);

        // Mutation does not evaluate either
        source.set(2);
        assert_eq!(doubled.evaluations(), 0);

        // First access triggers computation
        assert_eq!(doubled.get(), 4);
        assert_eq!(doubled.evaluations(), 1);

        // Second access uses the cache
        assert_eq!(doubled.get(), 4);
        assert_eq!(doubled.evaluations(), 1);
    }

    #[test]
    fn computed_recomputes_after_source_change() {
        let source = Ref::new(1);
        let src = source.clone();
        let doubled = Computed::new(move || src.get() * 2);

        assert_eq!(doubled.get(), 2);
        source.set(5);
        assert!(doubled.is_dirty());
        assert_eq!(doubled.get(), 10);
        assert_eq!(doubled.evaluations(), 2);
        assert!(!doubled.is_dirty());
    }

    #[test]
    fn unchanged_result_does_not_rerun_readers() {
        let source = Ref::new(2);
        let src = source.clone();
        let parity = Computed::new(move || src.get() % 2);

        let runs = Rc::new(Cell::new(0));
        let reader = parity.clone();
        let counter = runs.clone();
        let _effect = Effect::new(move || {
            reader.get();
            counter.set(counter.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        // parity stays 0: the computed re-evaluates, the effect does not
        source.set(4);
        assert_eq!(parity.evaluations(), 2);
        assert_eq!(runs.get(), 1);

        source.set(5);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn computed_chains_propagate() {
        let source = Ref::new(1);
        let src = source.clone();
        let plus_one = Computed::new(move || src.get() + 1);
        let inner = plus_one.clone();
        let times_ten = Computed::new(move || inner.get() * 10);

        assert_eq!(times_ten.get(), 20);
        source.set(2);
        assert_eq!(times_ten.get(), 30);
        assert_eq!(plus_one.evaluations(), 2);
        assert_eq!(times_ten.evaluations(), 2);
    }

    #[test]
    fn writable_computed_uses_setter() {
        let source = Ref::new(1);
        let src = source.clone();
        let sink = source.clone();
        let doubled = Computed::with_setter(move || src.get() * 2, move |v: i32| sink.set(v / 2));

        assert!(doubled.is_writable());
        doubled.set(10).unwrap();
        assert_eq!(source.get(), 5);
        assert_eq!(doubled.get(), 10);

        let readonly = Computed::new(|| 1);
        assert_eq!(readonly.set(2), Err(ReactiveError::ReadonlyComputed));
    }

    #[test]
    fn self_dependency_is_reported() {
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let lookup = slot.clone();
        let looping = Computed::labeled("looping", move || {
            let this = lookup.borrow().clone();
            match this {
                Some(this) => this.try_get().unwrap_or(-1),
                None => 0,
            }
        });
        *slot.borrow_mut() = Some(looping.clone());

        assert_eq!(looping.get(), -1);
        slot.borrow_mut().take();
    }

    #[test]
    fn panicking_getter_stays_dirty() {
        let fail = Rc::new(Cell::new(true));
        let flag = fail.clone();
        let fragile = Computed::new(move || {
            if flag.get() {
                panic!("not yet");
            }
            7
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| fragile.get()));
        assert!(result.is_err());
        assert!(fragile.is_dirty());

        fail.set(false);
        assert_eq!(fragile.get(), 7);
    }

    #[test]
    fn stopped_computed_evaluates_on_every_read() {
        let source = Ref::new(1);
        let src = source.clone();
        let doubled = Computed::new(move || src.get() * 2);
        assert_eq!(doubled.get(), 2);

        doubled.stop();
        assert_eq!(doubled.dependency_count(), 0);
        source.set(3);
        assert_eq!(doubled.get(), 6);
        assert_eq!(source.subscriber_count(), 0);
    }
}
