//! Per-kind access interception.
//!
//! Every read and write through a [`Handle`](super::Handle) is dispatched to
//! the [`Intercept`] table chosen when the handle was created. The tables
//! translate user keys into registry keys, record reads through
//! [`Target::track`] and report writes through [`Target::trigger`].
//!
//! A table never holds the data borrow while tracking, triggering or
//! wrapping: those may run arbitrary code.

use std::rc::Rc;

use super::handle::{Flavor, Handle};
use super::registry::{Change, TrackKey, TriggerOp};
use super::value::{Composite, ContainerKind, Raw, Value};
use crate::error::{ReactiveError, Result};
use crate::reactive::Runtime;

/// The container being accessed, seen through one handle flavor.
pub(crate) struct Target<'a> {
    pub raw: &'a Raw,
    pub flavor: Flavor,
}

impl Target<'_> {
    pub fn track(&self, key: TrackKey) {
        if self.flavor.tracks {
            Runtime::track(self.raw.id(), key);
        }
    }

    pub fn trigger(&self, change: Change) {
        Runtime::trigger(self.raw.id(), self.raw.kind(), &change);
    }

    /// Wrap a nested composite on the way out, matching this handle.
    pub fn wrap_out(&self, value: Value) -> Value {
        match value {
            Value::Raw(raw) if !self.flavor.shallow && !raw.is_marked_raw() => {
                Value::Handle(Handle::from_raw(&raw, self.flavor.nested()))
            }
            other => other,
        }
    }

    fn data(&self) -> std::cell::RefMut<'_, Composite> {
        self.raw.object().data.borrow_mut()
    }
}

/// The adapter every container access goes through.
pub(crate) trait Intercept {
    fn kind(&self) -> ContainerKind;
    fn get(&self, target: &Target<'_>, key: &Value) -> Result<Value>;
    fn set(&self, target: &Target<'_>, key: Value, value: Value) -> Result<()>;
    fn has(&self, target: &Target<'_>, key: &Value) -> Result<bool>;
    fn delete(&self, target: &Target<'_>, key: &Value) -> Result<bool>;
    fn keys(&self, target: &Target<'_>) -> Vec<Value>;
    fn entries(&self, target: &Target<'_>) -> Vec<(Value, Value)>;
    fn len(&self, target: &Target<'_>) -> usize;
    fn clear(&self, target: &Target<'_>);
}

/// Pick the table for a container kind.
pub(crate) fn table(kind: ContainerKind) -> &'static dyn Intercept {
    match kind {
        ContainerKind::Record => &RECORD,
        ContainerKind::List => &LIST,
        ContainerKind::Map => &MAP,
        ContainerKind::Set => &SET,
    }
}

fn invalid_key(kind: ContainerKind, key: &Value) -> ReactiveError {
    ReactiveError::InvalidKey {
        kind: kind.name(),
        key: key.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

struct RecordHandlers;

static RECORD: RecordHandlers = RecordHandlers;

impl RecordHandlers {
    fn field(key: &Value) -> Result<Rc<str>> {
        match key {
            Value::Str(name) => Ok(name.clone()),
            other => Err(invalid_key(ContainerKind::Record, other)),
        }
    }
}

fn record_mut(data: &mut Composite) -> &mut indexmap::IndexMap<Rc<str>, Value> {
    match data {
        Composite::Record(fields) => fields,
        _ => unreachable!("record handlers on a non-record"),
    }
}

impl Intercept for RecordHandlers {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Record
    }

    fn get(&self, target: &Target<'_>, key: &Value) -> Result<Value> {
        let name = Self::field(key)?;
        let value = record_mut(&mut target.data()).get(&name).cloned();
        target.track(TrackKey::Field(name));
        Ok(target.wrap_out(value.unwrap_or_default()))
    }

    fn set(&self, target: &Target<'_>, key: Value, value: Value) -> Result<()> {
        let name = Self::field(&key)?;
        let value = value.into_raw();
        let previous = record_mut(&mut target.data()).insert(name.clone(), value.clone());
        let op = match &previous {
            None => TriggerOp::Add,
            Some(old) if *old != value => TriggerOp::Set,
            Some(_) => return Ok(()),
        };
        drop(previous);
        target.trigger(Change::Key {
            op,
            key: TrackKey::Field(name),
        });
        Ok(())
    }

    fn has(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let name = Self::field(key)?;
        let found = record_mut(&mut target.data()).contains_key(&name);
        target.track(TrackKey::Field(name));
        Ok(found)
    }

    fn delete(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let name = Self::field(key)?;
        let removed = record_mut(&mut target.data()).shift_remove(&name);
        if removed.is_none() {
            return Ok(false);
        }
        drop(removed);
        target.trigger(Change::Key {
            op: TriggerOp::Delete,
            key: TrackKey::Field(name),
        });
        Ok(true)
    }

    fn keys(&self, target: &Target<'_>) -> Vec<Value> {
        let keys = record_mut(&mut target.data())
            .keys()
            .map(|name| Value::Str(name.clone()))
            .collect();
        target.track(TrackKey::KeyIterate);
        keys
    }

    fn entries(&self, target: &Target<'_>) -> Vec<(Value, Value)> {
        let entries: Vec<_> = record_mut(&mut target.data())
            .iter()
            .map(|(name, value)| (Value::Str(name.clone()), value.clone()))
            .collect();
        target.track(TrackKey::Iterate);
        entries
            .into_iter()
            .map(|(k, v)| (k, target.wrap_out(v)))
            .collect()
    }

    fn len(&self, target: &Target<'_>) -> usize {
        let len = target.raw.len();
        target.track(TrackKey::KeyIterate);
        len
    }

    fn clear(&self, target: &Target<'_>) {
        let removed = std::mem::take(record_mut(&mut target.data()));
        if !removed.is_empty() {
            drop(removed);
            target.trigger(Change::Clear);
        }
    }
}

// ----------------------------------------------------------------------------
// Lists
// ----------------------------------------------------------------------------

struct ListHandlers;

static LIST: ListHandlers = ListHandlers;

fn list_mut(data: &mut Composite) -> &mut Vec<Value> {
    match data {
        Composite::List(items) => items,
        _ => unreachable!("list handlers on a non-list"),
    }
}

impl ListHandlers {
    fn index(key: &Value) -> Result<usize> {
        match key {
            Value::Int(i) => usize::try_from(*i).map_err(|_| invalid_key(ContainerKind::List, key)),
            other => Err(invalid_key(ContainerKind::List, other)),
        }
    }
}

/// Make room for `len` elements; `false` when the allocation cannot be served.
fn reserve_len(items: &mut Vec<Value>, len: usize) -> bool {
    items.try_reserve(len.saturating_sub(items.len())).is_ok()
}

impl Intercept for ListHandlers {
    fn kind(&self) -> ContainerKind {
        ContainerKind::List
    }

    fn get(&self, target: &Target<'_>, key: &Value) -> Result<Value> {
        let index = Self::index(key)?;
        let value = list_mut(&mut target.data()).get(index).cloned();
        target.track(TrackKey::Index(index));
        Ok(target.wrap_out(value.unwrap_or_default()))
    }

    /// Writing at or past the end grows the list, padding with nulls.
    fn set(&self, target: &Target<'_>, key: Value, value: Value) -> Result<()> {
        let index = Self::index(&key)?;
        let value = value.into_raw();
        let (change, previous) = {
            let mut data = target.data();
            let items = list_mut(&mut data);
            let old_len = items.len();
            if index < old_len {
                let previous = std::mem::replace(&mut items[index], value);
                if previous == items[index] {
                    return Ok(());
                }
                let change = Change::Key {
                    op: TriggerOp::Set,
                    key: TrackKey::Index(index),
                };
                (change, Some(previous))
            } else {
                let new_len = index
                    .checked_add(1)
                    .filter(|len| reserve_len(items, *len))
                    .ok_or_else(|| invalid_key(ContainerKind::List, &key))?;
                items.resize(index, Value::Null);
                items.push(value);
                let change = Change::Length {
                    old: old_len,
                    new: new_len,
                };
                (change, None)
            }
        };
        drop(previous);
        target.trigger(change);
        Ok(())
    }

    fn has(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let index = Self::index(key)?;
        let found = index < target.raw.len();
        target.track(TrackKey::Index(index));
        Ok(found)
    }

    /// Reset an element to null, leaving the length alone.
    fn delete(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let index = Self::index(key)?;
        let previous = {
            let mut data = target.data();
            let items = list_mut(&mut data);
            match items.get_mut(index) {
                Some(slot) if !slot.is_null() => std::mem::take(slot),
                _ => return Ok(false),
            }
        };
        drop(previous);
        target.trigger(Change::Key {
            op: TriggerOp::Delete,
            key: TrackKey::Index(index),
        });
        Ok(true)
    }

    fn keys(&self, target: &Target<'_>) -> Vec<Value> {
        let len = target.raw.len();
        target.track(TrackKey::Iterate);
        (0..len).map(Value::from).collect()
    }

    fn entries(&self, target: &Target<'_>) -> Vec<(Value, Value)> {
        let items = list_mut(&mut target.data()).clone();
        target.track(TrackKey::Iterate);
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i), target.wrap_out(v)))
            .collect()
    }

    fn len(&self, target: &Target<'_>) -> usize {
        let len = target.raw.len();
        target.track(TrackKey::Length);
        len
    }

    fn clear(&self, target: &Target<'_>) {
        let removed = std::mem::take(list_mut(&mut target.data()));
        let old = removed.len();
        drop(removed);
        if old != 0 {
            target.trigger(Change::Length { old, new: 0 });
        }
    }
}

/// Append, returning the new length.
pub(crate) fn list_push(target: &Target<'_>, value: Value) -> usize {
    let value = value.into_raw();
    let (old, new) = {
        let mut data = target.data();
        let items = list_mut(&mut data);
        items.push(value);
        (items.len() - 1, items.len())
    };
    target.trigger(Change::Length { old, new });
    new
}

pub(crate) fn list_pop(target: &Target<'_>) -> Option<Value> {
    let (popped, old) = {
        let mut data = target.data();
        let items = list_mut(&mut data);
        let old = items.len();
        (items.pop()?, old)
    };
    target.trigger(Change::Length { old, new: old - 1 });
    Some(target.wrap_out(popped))
}

/// Insert at `index` (clamped to the length), shifting later elements.
pub(crate) fn list_insert(target: &Target<'_>, index: usize, value: Value) {
    let value = value.into_raw();
    let (from, old_len) = {
        let mut data = target.data();
        let items = list_mut(&mut data);
        let old_len = items.len();
        let from = index.min(old_len);
        items.insert(from, value);
        (from, old_len)
    };
    target.trigger(Change::Splice {
        from,
        old_len,
        new_len: old_len + 1,
    });
}

pub(crate) fn list_remove(target: &Target<'_>, index: usize) -> Option<Value> {
    let (removed, old_len) = {
        let mut data = target.data();
        let items = list_mut(&mut data);
        let old_len = items.len();
        if index >= old_len {
            return None;
        }
        (items.remove(index), old_len)
    };
    target.trigger(Change::Splice {
        from: index,
        old_len,
        new_len: old_len - 1,
    });
    Some(target.wrap_out(removed))
}

/// Truncate, or pad with nulls.
pub(crate) fn list_set_len(target: &Target<'_>, len: usize) -> Result<()> {
    let (old, removed) = {
        let mut data = target.data();
        let items = list_mut(&mut data);
        let old = items.len();
        let removed = if len < old {
            items.split_off(len)
        } else {
            if !reserve_len(items, len) {
                return Err(ReactiveError::InvalidKey {
                    kind: ContainerKind::List.name(),
                    key: len.to_string(),
                });
            }
            items.resize(len, Value::Null);
            Vec::new()
        };
        (old, removed)
    };
    drop(removed);
    if old != len {
        target.trigger(Change::Length { old, new: len });
    }
    Ok(())
}

/// Position of the first element identical to `needle` (raw or wrapped).
pub(crate) fn list_index_of(target: &Target<'_>, needle: &Value) -> Option<usize> {
    let needle = needle.clone().into_raw();
    let position = list_mut(&mut target.data())
        .iter()
        .position(|item| *item == needle);
    target.track(TrackKey::Iterate);
    position
}

// ----------------------------------------------------------------------------
// Maps
// ----------------------------------------------------------------------------

struct MapHandlers;

static MAP: MapHandlers = MapHandlers;

fn map_mut(data: &mut Composite) -> &mut indexmap::IndexMap<Value, Value> {
    match data {
        Composite::Map(entries) => entries,
        _ => unreachable!("map handlers on a non-map"),
    }
}

impl Intercept for MapHandlers {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Map
    }

    fn get(&self, target: &Target<'_>, key: &Value) -> Result<Value> {
        let key = key.clone().into_raw();
        let value = map_mut(&mut target.data()).get(&key).cloned();
        target.track(TrackKey::Entry(key));
        Ok(target.wrap_out(value.unwrap_or_default()))
    }

    fn set(&self, target: &Target<'_>, key: Value, value: Value) -> Result<()> {
        let key = key.into_raw();
        let value = value.into_raw();
        let previous = map_mut(&mut target.data()).insert(key.clone(), value.clone());
        let op = match &previous {
            None => TriggerOp::Add,
            Some(old) if *old != value => TriggerOp::Set,
            Some(_) => return Ok(()),
        };
        drop(previous);
        target.trigger(Change::Key {
            op,
            key: TrackKey::Entry(key),
        });
        Ok(())
    }

    fn has(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let key = key.clone().into_raw();
        let found = map_mut(&mut target.data()).contains_key(&key);
        target.track(TrackKey::Entry(key));
        Ok(found)
    }

    fn delete(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let key = key.clone().into_raw();
        let removed = map_mut(&mut target.data()).shift_remove_entry(&key);
        let Some(removed) = removed else {
            return Ok(false);
        };
        drop(removed);
        target.trigger(Change::Key {
            op: TriggerOp::Delete,
            key: TrackKey::Entry(key),
        });
        Ok(true)
    }

    fn keys(&self, target: &Target<'_>) -> Vec<Value> {
        let keys: Vec<_> = map_mut(&mut target.data()).keys().cloned().collect();
        target.track(TrackKey::KeyIterate);
        keys.into_iter().map(|k| target.wrap_out(k)).collect()
    }

    fn entries(&self, target: &Target<'_>) -> Vec<(Value, Value)> {
        let entries: Vec<_> = map_mut(&mut target.data())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        target.track(TrackKey::Iterate);
        entries
            .into_iter()
            .map(|(k, v)| (target.wrap_out(k), target.wrap_out(v)))
            .collect()
    }

    fn len(&self, target: &Target<'_>) -> usize {
        let len = target.raw.len();
        target.track(TrackKey::KeyIterate);
        len
    }

    fn clear(&self, target: &Target<'_>) {
        let removed = std::mem::take(map_mut(&mut target.data()));
        if !removed.is_empty() {
            drop(removed);
            target.trigger(Change::Clear);
        }
    }
}

// ----------------------------------------------------------------------------
// Sets
// ----------------------------------------------------------------------------

struct SetHandlers;

static SET: SetHandlers = SetHandlers;

fn set_mut(data: &mut Composite) -> &mut indexmap::IndexSet<Value> {
    match data {
        Composite::Set(members) => members,
        _ => unreachable!("set handlers on a non-set"),
    }
}

impl Intercept for SetHandlers {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Set
    }

    /// The member itself when present, null otherwise.
    fn get(&self, target: &Target<'_>, key: &Value) -> Result<Value> {
        let key = key.clone().into_raw();
        let member = set_mut(&mut target.data()).get(&key).cloned();
        target.track(TrackKey::Entry(key));
        Ok(target.wrap_out(member.unwrap_or_default()))
    }

    /// Adds `key`; the value is ignored.
    fn set(&self, target: &Target<'_>, key: Value, _value: Value) -> Result<()> {
        let key = key.into_raw();
        let added = set_mut(&mut target.data()).insert(key.clone());
        if added {
            target.trigger(Change::Key {
                op: TriggerOp::Add,
                key: TrackKey::Entry(key),
            });
        }
        Ok(())
    }

    fn has(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let key = key.clone().into_raw();
        let found = set_mut(&mut target.data()).contains(&key);
        target.track(TrackKey::Entry(key));
        Ok(found)
    }

    fn delete(&self, target: &Target<'_>, key: &Value) -> Result<bool> {
        let key = key.clone().into_raw();
        let removed = set_mut(&mut target.data()).shift_take(&key);
        let Some(removed) = removed else {
            return Ok(false);
        };
        drop(removed);
        target.trigger(Change::Key {
            op: TriggerOp::Delete,
            key: TrackKey::Entry(key),
        });
        Ok(true)
    }

    fn keys(&self, target: &Target<'_>) -> Vec<Value> {
        let members: Vec<_> = set_mut(&mut target.data()).iter().cloned().collect();
        target.track(TrackKey::Iterate);
        members.into_iter().map(|m| target.wrap_out(m)).collect()
    }

    fn entries(&self, target: &Target<'_>) -> Vec<(Value, Value)> {
        self.keys(target)
            .into_iter()
            .map(|m| (m.clone(), m))
            .collect()
    }

    fn len(&self, target: &Target<'_>) -> usize {
        let len = target.raw.len();
        target.track(TrackKey::Iterate);
        len
    }

    fn clear(&self, target: &Target<'_>) {
        let removed = std::mem::take(set_mut(&mut target.data()));
        if !removed.is_empty() {
            drop(removed);
            target.trigger(Change::Clear);
        }
    }
}
