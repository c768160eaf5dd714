//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazy).
//!
//! 2. When any dependency changes, the effect is marked dirty and queued.
//!
//! 3. At the next flush the effect re-runs, tracking a fresh set of
//!    dependencies and dropping the ones it no longer reads.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps
//!   change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Lifetime
//!
//! An effect lives as long as any [`Effect`] handle or the
//! [`EffectScope`](super::EffectScope) it was created in. Dropping the last
//! handle disposes its graph node.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::runtime::{batched, report, Runtime};
use super::scope;
use super::subscriber::{Reactive, Stoppable, SubscriberId};
use crate::error::{ReactiveError, Result};
use crate::graph::DirtyLevel;

/// Callback used instead of re-running a dirty effect.
pub type EffectScheduler = Rc<dyn Fn(&Effect)>;

/// Options accepted by [`Effect::with_options`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    pub scheduler: Option<EffectScheduler>,
    pub on_stop: Option<Box<dyn FnOnce()>>,
    /// Receives a panic of the effect function instead of it unwinding to the
    /// caller of [`Effect::run`].
    pub on_error: Option<Rc<dyn Fn(&ReactiveError)>>,
    pub label: Option<Cow<'static, str>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    #[must_use]
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect) + 'static,
    {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    #[must_use]
    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.on_stop = Some(Box::new(on_stop));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&ReactiveError) + 'static,
    {
        self.on_error = Some(Rc::new(on_error));
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("label", &self.label)
            .finish()
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Effect, Ref};
///
/// let count = Ref::new(0);
/// let reader = count.clone();
///
/// let _effect = Effect::new(move || {
///     println!("Count is: {}", reader.get());
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    id: SubscriberId,
    run: Box<dyn Fn()>,
    scheduler: Option<EffectScheduler>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    on_error: Option<Rc<dyn Fn(&ReactiveError)>>,
    this: Weak<EffectInner>,
    run_count: Cell<usize>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    #[must_use = "dropping the last handle stops the effect"]
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new effect without running it immediately.
    #[must_use = "dropping the last handle stops the effect"]
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_options(run, EffectOptions::new().lazy())
    }

    #[must_use = "dropping the last handle stops the effect"]
    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() + 'static,
    {
        let EffectOptions {
            lazy,
            scheduler,
            on_stop,
            on_error,
            label,
        } = options;

        let inner = Rc::new_cyclic(|this: &Weak<EffectInner>| {
            let handle: Weak<dyn Reactive> = this.clone();
            EffectInner {
                id: Runtime::register_effect(handle, label),
                run: Box::new(run),
                scheduler,
                on_stop: RefCell::new(on_stop),
                on_error,
                this: this.clone(),
                run_count: Cell::new(0),
            }
        });
        scope::record(inner.clone());

        let effect = Self { inner };
        if !lazy {
            if let Err(err) = effect.run() {
                report(err);
            }
        }
        effect
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the effect function now, tracking what it reads.
    ///
    /// A stopped effect still runs, but untracked. Returns
    /// [`ReactiveError::Disposed`] once the runtime has forgotten the effect,
    /// and the flush error when the run's closing flush fails.
    ///
    /// # Panics
    ///
    /// A panic of the effect function is propagated unless an `on_error`
    /// handler was supplied.
    pub fn run(&self) -> Result<()> {
        self.inner.run()
    }

    /// Stop the effect: drop every dependency and never run it again.
    ///
    /// Idempotent; the `on_stop` callback fires on the first call only.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        Runtime::is_active(self.inner.id)
    }

    /// Whether a dependency changed since the last run.
    pub fn is_dirty(&self) -> bool {
        Runtime::level(self.inner.id).is_some_and(|level| level != DirtyLevel::Clean)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

impl EffectInner {
    fn run(&self) -> Result<()> {
        if !Runtime::is_active(self.id) {
            if !Runtime::contains(self.id) {
                return Err(ReactiveError::Disposed {
                    subscriber: self.id.to_string(),
                });
            }
            super::context::untracked(|| (self.run)());
            return Ok(());
        }

        batched(|| -> Result<()> {
            let outcome = {
                let _ctx = ReactiveContext::enter(self.id)?;
                self.run_count.set(self.run_count.get() + 1);
                match &self.on_error {
                    None => {
                        (self.run)();
                        Ok(())
                    }
                    Some(_) => panic::catch_unwind(AssertUnwindSafe(|| (self.run)())),
                }
            };

            if let (Err(payload), Some(on_error)) = (outcome, &self.on_error) {
                let err = ReactiveError::panicked(Runtime::describe(self.id), payload.as_ref());
                on_error(&err);
            }
            Ok(())
        })?
    }

    fn stop(&self) {
        if !Runtime::stop_subscriber(self.id) {
            return;
        }
        let on_stop = self.on_stop.borrow_mut().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
    }
}

impl Reactive for EffectInner {
    fn run_job(&self) -> Result<()> {
        if !Runtime::is_dirty(self.id)? {
            return Ok(());
        }
        match (&self.scheduler, self.this.upgrade()) {
            (Some(scheduler), Some(inner)) => {
                scheduler(&Effect { inner });
                Ok(())
            }
            _ => self.run(),
        }
    }

    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

impl Stoppable for EffectInner {
    fn stop(&self) {
        EffectInner::stop(self);
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        Runtime::dispose_subscriber(self.id);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Create an effect that runs immediately. Shorthand for [`Effect::new`].
#[must_use = "dropping the last handle stops the effect"]
pub fn effect<F>(run: F) -> Effect
where
    F: Fn() + 'static,
{
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{flush, Ref};

    fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone) {
        let count = Rc::new(Cell::new(0));
        let inc = {
            let count = count.clone();
            move || count.set(count.get() + 1)
        };
        (count, inc)
    }

    #[test]
    fn effect_runs_on_creation() {
        let (runs, inc) = counter();
        let _effect = Effect::new(inc);

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let (runs, inc) = counter();
        let effect = Effect::new_lazy(inc);

        assert_eq!(runs.get(), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually execute
        effect.run().unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let source = Ref::new(1);
        let seen = Rc::new(Cell::new(0));

        let src = source.clone();
        let sink = seen.clone();
        let effect = Effect::new(move || sink.set(src.get()));
        assert_eq!(seen.get(), 1);

        source.set(7);
        assert_eq!(seen.get(), 7);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_stop() {
        let source = Ref::new(0);
        let stopped = Rc::new(Cell::new(0));

        let src = source.clone();
        let on_stop = stopped.clone();
        let effect = Effect::with_options(
            move || {
                src.get();
            },
            EffectOptions::new().on_stop(move || on_stop.set(on_stop.get() + 1)),
        );
        assert_eq!(effect.dependency_count(), 1);

        effect.stop();
        effect.stop();
        assert!(!effect.is_active());
        assert_eq!(stopped.get(), 1);
        assert_eq!(effect.dependency_count(), 0);

        source.set(1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn stopped_effect_runs_untracked() {
        let source = Ref::new(0);
        let src = source.clone();
        let effect = Effect::new(move || {
            src.get();
        });
        effect.stop();

        effect.run().unwrap();
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn scheduler_replaces_rerun() {
        let source = Ref::new(0);
        let (calls, inc) = counter();

        let src = source.clone();
        let effect = Effect::with_options(
            move || {
                src.get();
            },
            EffectOptions::new().scheduler(move |_| inc()),
        );

        source.set(1);
        assert_eq!(calls.get(), 1);
        assert_eq!(effect.run_count(), 1);
        assert!(effect.is_dirty());

        // once per batch, however many writes
        crate::reactive::batch(|| {
            source.set(2);
            source.set(3);
        })
        .unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn on_error_receives_panics() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let effect = Effect::with_options(
            || panic!("boom"),
            EffectOptions::new()
                .label("exploding")
                .on_error(move |err| sink.borrow_mut().push(err.clone())),
        );

        assert_eq!(effect.run_count(), 1);
        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            ReactiveError::Panicked {
                subscriber: "exploding".into(),
                message: "boom".into(),
            }
        );
    }

    #[test]
    fn panics_propagate_without_handler() {
        let effect = Effect::new_lazy(|| panic!("direct"));
        let result = panic::catch_unwind(AssertUnwindSafe(|| effect.run()));
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn panicking_run_still_flushes_its_writes() {
        let source = Ref::new(0);
        let seen = Rc::new(Cell::new(0));

        let (reader, sink) = (source.clone(), seen.clone());
        let _observer = Effect::new(move || sink.set(reader.get()));

        let writer = source.clone();
        let failing = Effect::new_lazy(move || {
            writer.set(4);
            panic!("after write");
        });
        let result = panic::catch_unwind(AssertUnwindSafe(|| failing.run()));

        assert!(result.is_err());
        assert_eq!(seen.get(), 4);
        assert_eq!(Runtime::pending(), 0);
    }

    #[test]
    fn dropping_the_last_handle_disposes() {
        let before = Runtime::stats().subscribers;
        let effect = Effect::new(|| {});
        let clone = effect.clone();
        drop(effect);
        assert_eq!(Runtime::stats().subscribers, before + 1);
        drop(clone);
        assert_eq!(Runtime::stats().subscribers, before);
    }

    #[test]
    fn explicit_flush_outside_batch_is_harmless() {
        let (runs, inc) = counter();
        let _effect = Effect::new(inc);
        flush().unwrap();
        assert_eq!(runs.get(), 1);
    }
}
