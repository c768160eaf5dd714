//! Plain values held by observable containers.
//!
//! A [`Raw`] is a shared, identity-carrying composite (record, list, map or
//! set). Scalars compare by value, composites by identity, the same way a
//! strict-identity check treats them: two distinct lists with equal contents
//! are different values.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use super::handle::{Flavor, Handle, HandleInner};
use crate::reactive::Runtime;

/// Counter for generating unique target IDs.
static TARGET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of one raw composite, used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        Self(TARGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A value stored in, or read from, an observable container.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// A plain composite.
    Raw(Raw),
    /// An observable view of a composite.
    Handle(Handle),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Raw> {
        match self {
            Value::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// The raw composite behind this value, wrapped or not.
    pub fn raw(&self) -> Option<Raw> {
        match self {
            Value::Raw(raw) => Some(raw.clone()),
            Value::Handle(handle) => Some(handle.to_raw()),
            _ => None,
        }
    }

    /// Replace a handle by its raw composite; everything else is unchanged.
    pub(crate) fn into_raw(self) -> Value {
        match self {
            Value::Handle(handle) => Value::Raw(handle.to_raw()),
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a.ptr_eq(b),
            (Value::Handle(a), Value::Handle(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(n) if n.is_nan() => u64::MAX.hash(state),
            Value::Float(n) => n.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Raw(raw) => raw.id().hash(state),
            Value::Handle(handle) => handle.identity().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(n) => write!(f, "{n:?}"),
            Value::Float(n) => write!(f, "{n:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Raw(raw) => raw.fmt(f),
            Value::Handle(handle) => handle.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Raw(raw) => write!(f, "<{} {:?}>", raw.kind(), raw.id()),
            Value::Handle(handle) => write!(f, "<handle {} {:?}>", handle.kind(), handle.to_raw().id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Raw> for Value {
    fn from(raw: Raw) -> Self {
        Value::Raw(raw)
    }
}

impl From<Handle> for Value {
    fn from(handle: Handle) -> Self {
        Value::Handle(handle)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// The four composite shapes a container can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Record,
    List,
    Map,
    Set,
}

impl ContainerKind {
    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::Record => "record",
            ContainerKind::List => "list",
            ContainerKind::Map => "map",
            ContainerKind::Set => "set",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The data inside a [`Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum Composite {
    Record(IndexMap<Rc<str>, Value>),
    List(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl Composite {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Composite::Record(_) => ContainerKind::Record,
            Composite::List(_) => ContainerKind::List,
            Composite::Map(_) => ContainerKind::Map,
            Composite::Set(_) => ContainerKind::Set,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Composite::Record(fields) => fields.len(),
            Composite::List(items) => items.len(),
            Composite::Map(entries) => entries.len(),
            Composite::Set(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A shared plain composite with identity.
///
/// Cloning a `Raw` clones the reference, not the data.
#[derive(Clone)]
pub struct Raw(Rc<RawObject>);

pub(crate) struct RawObject {
    id: TargetId,
    kind: ContainerKind,
    pub(crate) data: RefCell<Composite>,
    wrappers: RefCell<Vec<(Flavor, Weak<HandleInner>)>>,
    skip: Cell<bool>,
}

impl Raw {
    pub fn new(data: Composite) -> Self {
        Self(Rc::new(RawObject {
            id: TargetId::next(),
            kind: data.kind(),
            data: RefCell::new(data),
            wrappers: RefCell::new(Vec::new()),
            skip: Cell::new(false),
        }))
    }

    pub fn record<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        Self::new(Composite::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into().into_raw()))
                .collect(),
        ))
    }

    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::new(Composite::List(
            items.into_iter().map(|v| v.into().into_raw()).collect(),
        ))
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::new(Composite::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into().into_raw(), v.into().into_raw()))
                .collect(),
        ))
    }

    pub fn set<V: Into<Value>>(members: impl IntoIterator<Item = V>) -> Self {
        Self::new(Composite::Set(
            members.into_iter().map(|v| v.into().into_raw()).collect(),
        ))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.0.kind
    }

    /// Inspect the data without tracking.
    pub fn with<R>(&self, f: impl FnOnce(&Composite) -> R) -> R {
        f(&self.0.data.borrow())
    }

    /// Clone the current data out.
    pub fn snapshot(&self) -> Composite {
        self.0.data.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flag this composite so deep containers hand it out unwrapped.
    #[must_use]
    pub fn mark_raw(self) -> Self {
        self.0.skip.set(true);
        self
    }

    pub fn is_marked_raw(&self) -> bool {
        self.0.skip.get()
    }

    pub fn ptr_eq(&self, other: &Raw) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn object(&self) -> &RawObject {
        &self.0
    }

    /// Cached handle for `flavor`, if one is still alive.
    pub(crate) fn cached_wrapper(&self, flavor: Flavor) -> Option<Rc<HandleInner>> {
        self.0
            .wrappers
            .borrow()
            .iter()
            .find(|(cached, _)| *cached == flavor)
            .and_then(|(_, handle)| handle.upgrade())
    }

    pub(crate) fn cache_wrapper(&self, flavor: Flavor, handle: &Rc<HandleInner>) {
        let mut wrappers = self.0.wrappers.borrow_mut();
        wrappers.retain(|(cached, weak)| *cached != flavor && weak.strong_count() > 0);
        wrappers.push((flavor, Rc::downgrade(handle)));
    }
}

impl Drop for RawObject {
    fn drop(&mut self) {
        Runtime::evict_target(self.id);
    }
}

impl fmt::Debug for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.data.try_borrow() {
            Ok(data) => f
                .debug_struct("Raw")
                .field("id", &self.0.id)
                .field("data", &*data)
                .finish(),
            Err(_) => f
                .debug_struct("Raw")
                .field("id", &self.0.id)
                .finish_non_exhaustive(),
        }
    }
}
