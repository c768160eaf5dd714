//! Observable handles.
//!
//! A [`Handle`] is the observable view of one [`Raw`] composite. Wrapping is
//! lazy and cached per flavor on the raw object, so wrapping the same value
//! twice returns the same handle for as long as one is alive.
//!
//! Flavors:
//!
//! | constructor | nested composites | writes | reads tracked |
//! | --- | --- | --- | --- |
//! | [`wrap`] | wrapped deep | allowed | yes |
//! | [`wrap_shallow`] | returned raw | allowed | yes |
//! | [`wrap_readonly`] | wrapped read-only | rejected | no |
//! | [`wrap_shallow_readonly`] | returned raw | rejected | no |
//!
//! [`Handle::readonly`] on a tracking handle gives a read-only view that
//! still tracks, so a consumer can observe state it may not mutate.

use std::fmt;
use std::rc::Rc;

use super::handlers::{self, Intercept, Target};
use super::value::{ContainerKind, Raw, Value};
use crate::error::{ReactiveError, Result};

/// How a handle treats reads, writes and nested composites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Flavor {
    pub shallow: bool,
    pub readonly: bool,
    pub tracks: bool,
}

impl Flavor {
    pub const REACTIVE: Flavor = Flavor {
        shallow: false,
        readonly: false,
        tracks: true,
    };

    pub const SHALLOW: Flavor = Flavor {
        shallow: true,
        readonly: false,
        tracks: true,
    };

    pub const READONLY: Flavor = Flavor {
        shallow: false,
        readonly: true,
        tracks: false,
    };

    pub const SHALLOW_READONLY: Flavor = Flavor {
        shallow: true,
        readonly: true,
        tracks: false,
    };

    /// Flavor for composites read through a deep handle of this flavor.
    pub fn nested(self) -> Flavor {
        Flavor {
            shallow: false,
            ..self
        }
    }
}

/// An observable view of a raw composite.
///
/// Cloning a handle is cheap and keeps the identity.
#[derive(Clone)]
pub struct Handle {
    inner: Rc<HandleInner>,
}

pub(crate) struct HandleInner {
    raw: Raw,
    flavor: Flavor,
    ops: &'static dyn Intercept,
}

impl Handle {
    pub(crate) fn from_raw(raw: &Raw, flavor: Flavor) -> Handle {
        if let Some(inner) = raw.cached_wrapper(flavor) {
            return Handle { inner };
        }
        let inner = Rc::new(HandleInner {
            raw: raw.clone(),
            flavor,
            ops: handlers::table(raw.kind()),
        });
        raw.cache_wrapper(flavor, &inner);
        Handle { inner }
    }

    fn target(&self) -> Target<'_> {
        Target {
            raw: &self.inner.raw,
            flavor: self.inner.flavor,
        }
    }

    fn writable(&self, key: impl FnOnce() -> String) -> Result<()> {
        if self.inner.flavor.readonly {
            Err(ReactiveError::Readonly { key: key() })
        } else {
            Ok(())
        }
    }

    fn expect_kind(&self, kind: ContainerKind, operation: &'static str) -> Result<()> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(ReactiveError::kind_mismatch(operation, self.kind().name()))
        }
    }

    pub fn kind(&self) -> ContainerKind {
        self.inner.ops.kind()
    }

    /// Read one key. Missing keys read as [`Value::Null`].
    pub fn get(&self, key: impl Into<Value>) -> Result<Value> {
        self.inner.ops.get(&self.target(), &key.into())
    }

    /// Write one key. Sets ignore `value` and add `key`.
    ///
    /// Writing a list index at or past the end pads with nulls; an index the
    /// list cannot grow to is an [`ReactiveError::InvalidKey`].
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        self.writable(|| key.to_string())?;
        self.inner.ops.set(&self.target(), key, value.into())
    }

    /// Whether `key` is present.
    ///
    /// The read tracks `key` only, not the whole key set: a
    /// membership reader re-runs when that key is added or removed, and not
    /// on unrelated additions.
    pub fn has(&self, key: impl Into<Value>) -> Result<bool> {
        self.inner.ops.has(&self.target(), &key.into())
    }

    /// Remove one key; returns whether it existed.
    pub fn delete(&self, key: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        self.writable(|| key.to_string())?;
        self.inner.ops.delete(&self.target(), &key)
    }

    /// Keys in insertion order (indices for lists, members for sets).
    pub fn keys(&self) -> Vec<Value> {
        self.inner.ops.keys(&self.target())
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.inner.ops.entries(&self.target())
    }

    /// Number of fields, elements, entries or members.
    pub fn len(&self) -> usize {
        self.inner.ops.len(&self.target())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> Result<()> {
        self.writable(|| "*".into())?;
        self.inner.ops.clear(&self.target());
        Ok(())
    }

    /// Add a member to a set.
    pub fn add(&self, member: impl Into<Value>) -> Result<()> {
        self.expect_kind(ContainerKind::Set, "add")?;
        self.set(member, Value::Null)
    }

    /// Append to a list, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        self.expect_kind(ContainerKind::List, "push")?;
        self.writable(|| "push".into())?;
        Ok(handlers::list_push(&self.target(), value.into()))
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        self.expect_kind(ContainerKind::List, "pop")?;
        self.writable(|| "pop".into())?;
        Ok(handlers::list_pop(&self.target()))
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.expect_kind(ContainerKind::List, "insert")?;
        self.writable(|| index.to_string())?;
        handlers::list_insert(&self.target(), index, value.into());
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<Option<Value>> {
        self.expect_kind(ContainerKind::List, "remove")?;
        self.writable(|| index.to_string())?;
        Ok(handlers::list_remove(&self.target(), index))
    }

    /// Truncate or pad a list with nulls.
    ///
    /// Returns [`ReactiveError::InvalidKey`] when the padded list cannot be
    /// allocated.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.expect_kind(ContainerKind::List, "set_len")?;
        self.writable(|| "length".into())?;
        handlers::list_set_len(&self.target(), len)
    }

    /// Identity search; a wrapped needle matches its raw element.
    pub fn index_of(&self, needle: impl Into<Value>) -> Result<Option<usize>> {
        self.expect_kind(ContainerKind::List, "index_of")?;
        Ok(handlers::list_index_of(&self.target(), &needle.into()))
    }

    pub fn contains(&self, needle: impl Into<Value>) -> Result<bool> {
        Ok(self.index_of(needle)?.is_some())
    }

    pub fn is_reactive(&self) -> bool {
        self.inner.flavor.tracks
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.flavor.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.flavor.shallow
    }

    /// A read-only view of the same composite that keeps this handle's
    /// tracking behaviour.
    pub fn readonly(&self) -> Handle {
        Handle::from_raw(
            &self.inner.raw,
            Flavor {
                readonly: true,
                ..self.inner.flavor
            },
        )
    }

    /// The composite behind this handle.
    pub fn to_raw(&self) -> Raw {
        self.inner.raw.clone()
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind())
            .field("flavor", &self.inner.flavor)
            .field("raw", &self.inner.raw)
            .finish()
    }
}

/// Deep observable view of `raw`.
pub fn wrap(raw: &Raw) -> Handle {
    Handle::from_raw(raw, Flavor::REACTIVE)
}

/// Observable view tracking only the top level of `raw`.
pub fn wrap_shallow(raw: &Raw) -> Handle {
    Handle::from_raw(raw, Flavor::SHALLOW)
}

/// Deep read-only view of `raw`.
pub fn wrap_readonly(raw: &Raw) -> Handle {
    Handle::from_raw(raw, Flavor::READONLY)
}

pub fn wrap_shallow_readonly(raw: &Raw) -> Handle {
    Handle::from_raw(raw, Flavor::SHALLOW_READONLY)
}

/// Whether `value` is a handle whose reads are tracked.
pub fn is_reactive(value: &Value) -> bool {
    value.as_handle().is_some_and(Handle::is_reactive)
}

pub fn is_readonly(value: &Value) -> bool {
    value.as_handle().is_some_and(Handle::is_readonly)
}

/// Strip any handle off `value`.
pub fn to_raw(value: &Value) -> Value {
    value.clone().into_raw()
}

/// Flag `raw` so deep handles never wrap it.
pub fn mark_raw(raw: Raw) -> Raw {
    raw.mark_raw()
}
