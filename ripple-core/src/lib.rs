//! Ripple Core
//!
//! This crate provides the dependency-tracking and effect-scheduling engine
//! for the Ripple observable-state framework. It implements:
//!
//! - Observable containers over records, lists, maps and sets
//! - Reactive primitives (refs, computeds, effects, effect scopes)
//! - A dependency graph that re-shapes itself on every run
//! - An ordered, deduplicating scheduler with a recursive-update guard
//!
//! Rendering, templates and component lifecycles are left to consumers; they
//! only need to wrap values, run and stop subscribers, and receive a
//! scheduler callback when something is dirty.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observable`: container handles, per-kind access interception and the
//!   rules mapping a write to the deps it affects
//! - `reactive`: the per-thread runtime and the reactive primitives
//! - `graph`: arena-backed dependency graph and update scheduler
//! - `config` / `error`: runtime settings and the crate error type
//!
//! # Example
//!
//! ```rust
//! use ripple_core::observable::{wrap, Raw};
//! use ripple_core::reactive::{Computed, Effect};
//!
//! // Wrap a plain record
//! let state = wrap(&Raw::record([("count", 1)]));
//!
//! // Create a derived value
//! let source = state.clone();
//! let doubled = Computed::new(move || source.get("count").unwrap().as_int().unwrap_or(0) * 2);
//!
//! // Create an effect
//! let reader = doubled.clone();
//! let _effect = Effect::new(move || {
//!     println!("Doubled: {}", reader.get());
//! });
//!
//! // Update the record
//! state.set("count", 5).unwrap();
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod config;
pub mod error;
mod graph;
pub mod observable;
pub mod reactive;

pub use config::{FlushMode, RuntimeConfig};
pub use error::{ReactiveError, Result};
