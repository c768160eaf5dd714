//! Reactive Primitives
//!
//! This module implements the core reactive system: refs, computeds, effects
//! and effect scopes, on top of the per-thread [`Runtime`].
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a container for one mutable value. When it is read within a
//! tracking context (a computed or effect), the ref registers that context as
//! a dependent. When its value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changed, and only when someone reads it.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever its
//! dependencies change. Re-runs are queued and flushed in creation order at
//! the end of the outermost write, run or [`batch`].
//!
//! ## Scopes
//!
//! An [`EffectScope`] collects the effects and computeds created inside it so
//! they can be stopped together.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local runtime to automatically detect
//! dependencies. When observable state is read, the runtime checks whether a
//! subscriber is running and, if so, links the two.

mod computed;
mod context;
mod effect;
mod reference;
mod runtime;
mod scope;
mod subscriber;

pub use computed::{computed, Computed};
pub use context::{enable_tracking, pause_tracking, reset_tracking, untracked, ReactiveContext};
pub use effect::{effect, Effect, EffectOptions, EffectScheduler};
pub use reference::{trigger_ref, Ref};
pub use runtime::{batch, flush, Runtime, RuntimeStats};
pub use scope::{current_scope, on_scope_dispose, EffectScope};
pub use subscriber::SubscriberId;

pub(crate) use subscriber::Reactive;
