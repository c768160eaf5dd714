//! Effect Scopes
//!
//! A scope collects the effects and computeds created while it runs, along
//! with nested scopes and cleanup callbacks, so they can all be stopped with
//! one call.
//!
//! Scopes form a tree. A scope created while another one is running becomes
//! its child unless it is created detached; stopping a scope stops its
//! children transitively and removes it from its parent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::subscriber::Stoppable;
use crate::error::{ReactiveError, Result};

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Rc<ScopeInner>>> = const { RefCell::new(Vec::new()) };
}

/// A disposal group for subscribers.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{EffectScope, Effect, Ref};
///
/// let count = Ref::new(0);
/// let scope = EffectScope::new();
///
/// scope
///     .run(|| {
///         let reader = count.clone();
///         let _ = Effect::new(move || {
///             reader.get();
///         });
///     })
///     .unwrap();
/// assert_eq!(count.subscriber_count(), 1);
///
/// scope.stop();
/// assert_eq!(count.subscriber_count(), 0);
/// ```
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    active: Cell<bool>,
    members: RefCell<Vec<Rc<dyn Stoppable>>>,
    children: RefCell<Vec<Rc<ScopeInner>>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    parent: Weak<ScopeInner>,
}

impl EffectScope {
    /// Create a scope attached to the currently running scope, if any.
    pub fn new() -> Self {
        let parent = active_scope().filter(|scope| scope.active.get());
        let inner = Rc::new(ScopeInner {
            active: Cell::new(true),
            parent: parent.as_ref().map(Rc::downgrade).unwrap_or_default(),
            ..ScopeInner::default()
        });
        if let Some(parent) = parent {
            parent.children.borrow_mut().push(inner.clone());
        }
        Self { inner }
    }

    /// Create a scope that is not collected by the running scope.
    pub fn detached() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                active: Cell::new(true),
                ..ScopeInner::default()
            }),
        }
    }

    /// Run `f` with this scope active, collecting what it creates.
    ///
    /// Returns [`ReactiveError::ScopeInactive`] without calling `f` once the
    /// scope has been stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        if !self.inner.active.get() {
            warn!("cannot run an inactive effect scope");
            return Err(ReactiveError::ScopeInactive);
        }
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(self.inner.clone()));
        let _guard = ScopeGuard;
        Ok(f())
    }

    /// Stop every member, run cleanups, then stop nested scopes.
    ///
    /// Idempotent.
    pub fn stop(&self) {
        self.inner.stop(true);
    }

    /// Register a callback to run when this scope stops.
    ///
    /// On an already stopped scope the callback runs immediately.
    pub fn on_dispose<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        if self.inner.active.get() {
            self.inner.cleanups.borrow_mut().push(Box::new(f));
        } else {
            f();
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of effects and computeds collected so far.
    pub fn member_count(&self) -> usize {
        self.inner.members.borrow().len()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("members", &self.member_count())
            .field("children", &self.child_count())
            .finish()
    }
}

impl ScopeInner {
    fn stop(self: &Rc<Self>, from_root: bool) {
        if !self.active.replace(false) {
            return;
        }

        let members = std::mem::take(&mut *self.members.borrow_mut());
        for member in &members {
            member.stop();
        }
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in &children {
            child.stop(false);
        }

        if from_root {
            if let Some(parent) = self.parent.upgrade() {
                parent
                    .children
                    .borrow_mut()
                    .retain(|child| !Rc::ptr_eq(child, self));
            }
        }
        debug!(members = members.len(), children = children.len(), "effect scope stopped");
    }
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let popped = SCOPE_STACK
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten();
        drop(popped);
    }
}

fn active_scope() -> Option<Rc<ScopeInner>> {
    SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// The scope currently running, if any.
pub fn current_scope() -> Option<EffectScope> {
    active_scope().map(|inner| EffectScope { inner })
}

/// Register a cleanup on the running scope.
///
/// Returns `false` (and drops `f`) when no scope is running.
pub fn on_scope_dispose<F>(f: F) -> bool
where
    F: FnOnce() + 'static,
{
    match current_scope() {
        Some(scope) => {
            scope.on_dispose(f);
            true
        }
        None => {
            warn!("on_scope_dispose called without an active effect scope");
            false
        }
    }
}

/// Add a new effect or computed to the running scope.
pub(crate) fn record(member: Rc<dyn Stoppable>) {
    if let Some(scope) = active_scope().filter(|scope| scope.active.get()) {
        scope.members.borrow_mut().push(member);
    }
}

pub(crate) fn reset_scope_stack() {
    let stack = SCOPE_STACK.try_with(|stack| std::mem::take(&mut *stack.borrow_mut()));
    drop(stack);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
