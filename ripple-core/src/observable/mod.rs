//! Observable Containers
//!
//! This module turns plain composites (records, lists, maps and sets) into
//! observable state.
//!
//! # How It Works
//!
//! 1. A [`Raw`] holds the plain data and an identity.
//!
//! 2. [`wrap`] returns a [`Handle`]: every read through it records a
//!    dependency on the `(container, key)` slot it touched, and every write
//!    notifies the deps the change affects.
//!
//! 3. The runtime's registry maps container identity to per-key deps. It is
//!    keyed by id only, so it never keeps a composite alive; dropping the last
//!    reference to a `Raw` evicts its entry.
//!
//! Reads that depend on the shape of a container (enumeration, length,
//! membership searches) track a container-wide dep instead of single keys.

mod handle;
mod handlers;
mod registry;
mod value;

pub use handle::{
    is_reactive, is_readonly, mark_raw, to_raw, wrap, wrap_readonly, wrap_shallow,
    wrap_shallow_readonly, Handle,
};
pub use value::{Composite, ContainerKind, Raw, TargetId, Value};

pub(crate) use registry::{affected_deps, Change, TrackKey};
