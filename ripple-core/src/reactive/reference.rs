//! Ref Implementation
//!
//! A Ref is the simplest observable: a single mutable value that behaves like
//! a one-key container.
//!
//! # How Refs Work
//!
//! 1. When a ref is read while a subscriber is running, the ref's dep is
//!    linked to that subscriber.
//!
//! 2. When a new value is set and it differs from the current one
//!    (`PartialEq`), every linked subscriber is notified.
//!
//! 3. In-place changes made through [`Ref::with_mut`] are invisible to the
//!    runtime until [`trigger_ref`] is called.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::Runtime;
use crate::graph::DepId;

/// A reactive cell holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the ref. Must be Clone + PartialEq.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Ref;
///
/// let count = Ref::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<RefInner<T>>,
}

struct RefInner<T> {
    dep: DepId,
    value: RefCell<T>,
}

impl<T> Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                dep: Runtime::create_dep(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the current value.
    ///
    /// If called while a subscriber runs, this also registers the
    /// subscriber as a dependent.
    pub fn get(&self) -> T {
        Runtime::track_dep(self.inner.dep);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the value for the duration of `f`, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track_dep(self.inner.dep);
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers if it changed.
    pub fn set(&self, value: T) {
        if *self.inner.value.borrow() == value {
            return;
        }
        let previous = self.inner.value.replace(value);
        drop(previous);
        Runtime::trigger_dep(self.inner.dep);
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Mutate the value in place without notifying anyone.
    ///
    /// Follow up with [`trigger_ref`] once the change should be observed.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.value.borrow_mut())
    }

    /// Number of subscribers currently reading this ref.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.dep)
    }
}

/// Notify every reader of `target`, whether or not its value changed.
pub fn trigger_ref<T>(target: &Ref<T>)
where
    T: Clone + PartialEq + 'static,
{
    Runtime::trigger_dep(target.inner.dep);
}

impl<T> Drop for RefInner<T> {
    fn drop(&mut self) {
        Runtime::dispose_dep(self.dep);
    }
}

impl<T> Clone for Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Ref<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &self.inner.value.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
