//! Dependency registry keys and the affected-dep rules.
//!
//! The runtime stores one dep per `(target, key)` pair that has been read
//! while tracking. A write is described by a [`Change`]; [`affected_deps`]
//! turns it into the deps that must be notified, given the container kind.
//!
//! Besides per-key deps every container has an `Iterate` dep for reads that
//! depend on the whole contents, lists a `Length` dep, and records and maps a
//! separate `KeyIterate` dep so key enumeration and size ignore value
//! updates.

use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::value::{ContainerKind, Value};
use crate::graph::DepId;

/// One observable slot of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TrackKey {
    /// A record field.
    Field(Rc<str>),
    /// A list element.
    Index(usize),
    /// The length of a list.
    Length,
    /// A map entry or set member, keyed by the raw key.
    Entry(Value),
    /// The full key set and contents.
    Iterate,
    /// The key set of a record or map.
    KeyIterate,
}

/// What a keyed write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerOp {
    /// An existing key got a different value.
    Set,
    /// A new key was created.
    Add,
    /// An existing key was removed.
    Delete,
}

/// A mutation, as seen by the registry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Change {
    Key { op: TriggerOp, key: TrackKey },
    /// A list's length changed and elements appeared or vanished at the end.
    Length { old: usize, new: usize },
    /// Elements from `from` onwards shifted.
    Splice {
        from: usize,
        old_len: usize,
        new_len: usize,
    },
    /// Every entry was removed.
    Clear,
}

type Affected = SmallVec<[DepId; 8]>;

fn dep_of(keyed: &IndexMap<TrackKey, DepId>, key: &TrackKey) -> Option<DepId> {
    keyed.get(key).copied()
}

/// Deps of one container that must be notified for `change`.
pub(crate) fn affected_deps(
    kind: ContainerKind,
    keyed: &IndexMap<TrackKey, DepId>,
    change: &Change,
) -> Affected {
    let mut out = Affected::new();

    match change {
        Change::Clear => out.extend(keyed.values().copied()),

        Change::Length { old, new } => {
            out.extend(dep_of(keyed, &TrackKey::Length));
            out.extend(dep_of(keyed, &TrackKey::Iterate));
            let (old, new) = (*old, *new);
            out.extend(keyed.iter().filter_map(|(key, dep)| match key {
                TrackKey::Index(i) if new < old && *i >= new => Some(*dep),
                TrackKey::Index(i) if new > old && (old..new).contains(i) => Some(*dep),
                _ => None,
            }));
        }

        Change::Splice {
            from,
            old_len,
            new_len,
        } => {
            out.extend(keyed.iter().filter_map(|(key, dep)| match key {
                TrackKey::Index(i) if i >= from => Some(*dep),
                _ => None,
            }));
            if old_len != new_len {
                out.extend(dep_of(keyed, &TrackKey::Length));
            }
            out.extend(dep_of(keyed, &TrackKey::Iterate));
        }

        Change::Key { op, key } => {
            out.extend(dep_of(keyed, key));
            let structural = matches!(op, TriggerOp::Add | TriggerOp::Delete);
            match kind {
                ContainerKind::List => out.extend(dep_of(keyed, &TrackKey::Iterate)),
                ContainerKind::Set if structural => {
                    out.extend(dep_of(keyed, &TrackKey::Iterate));
                }
                ContainerKind::Record | ContainerKind::Map => {
                    out.extend(dep_of(keyed, &TrackKey::Iterate));
                    if structural {
                        out.extend(dep_of(keyed, &TrackKey::KeyIterate));
                    }
                }
                _ => {}
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::arena::Arena;

    /// A registry row with one dep per key, plus the ids in key order.
    fn keyed(keys: &[TrackKey]) -> (IndexMap<TrackKey, DepId>, Vec<DepId>) {
        let mut arena: Arena<DepId, ()> = Arena::new();
        let ids: Vec<DepId> = keys.iter().map(|_| arena.insert(())).collect();
        let map = keys.iter().cloned().zip(ids.iter().copied()).collect();
        (map, ids)
    }

    fn field(name: &str) -> TrackKey {
        TrackKey::Field(name.into())
    }

    #[test]
    fn record_value_update_hits_values_but_not_keys() {
        let (map, ids) = keyed(&[
            field("a"),
            field("b"),
            TrackKey::Iterate,
            TrackKey::KeyIterate,
        ]);
        let change = Change::Key {
            op: TriggerOp::Set,
            key: field("a"),
        };
        assert_eq!(
            affected_deps(ContainerKind::Record, &map, &change).as_slice(),
            &[ids[0], ids[2]]
        );
    }

    #[test]
    fn record_add_hits_both_iterations() {
        let (map, ids) = keyed(&[field("a"), TrackKey::Iterate, TrackKey::KeyIterate]);
        let change = Change::Key {
            op: TriggerOp::Add,
            key: field("a"),
        };
        assert_eq!(
            affected_deps(ContainerKind::Record, &map, &change).as_slice(),
            &[ids[0], ids[1], ids[2]]
        );
    }

    #[test]
    fn set_member_only_hits_iterate_when_structural() {
        let key = TrackKey::Entry(Value::from(1));
        let (map, ids) = keyed(&[key.clone(), TrackKey::Iterate]);
        let add = Change::Key {
            op: TriggerOp::Add,
            key,
        };
        assert_eq!(
            affected_deps(ContainerKind::Set, &map, &add).as_slice(),
            &[ids[0], ids[1]]
        );
    }

    #[test]
    fn map_value_update_skips_key_iteration() {
        let key = TrackKey::Entry(Value::from("k"));
        let (map, ids) = keyed(&[key.clone(), TrackKey::Iterate, TrackKey::KeyIterate]);

        let set = Change::Key {
            op: TriggerOp::Set,
            key: key.clone(),
        };
        assert_eq!(
            affected_deps(ContainerKind::Map, &map, &set).as_slice(),
            &[ids[0], ids[1]]
        );

        let delete = Change::Key {
            op: TriggerOp::Delete,
            key,
        };
        assert_eq!(
            affected_deps(ContainerKind::Map, &map, &delete).as_slice(),
            &[ids[0], ids[1], ids[2]]
        );
    }

    #[test]
    fn shrinking_a_list_hits_out_of_range_indices() {
        let (map, ids) = keyed(&[
            TrackKey::Index(0),
            TrackKey::Index(3),
            TrackKey::Index(7),
            TrackKey::Length,
        ]);
        let change = Change::Length { old: 5, new: 2 };
        let mut hit = affected_deps(ContainerKind::List, &map, &change).to_vec();
        hit.sort_by_key(|dep| ids.iter().position(|id| id == dep));
        assert_eq!(hit, vec![ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn growing_a_list_hits_new_indices_and_length() {
        let (map, ids) = keyed(&[TrackKey::Index(2), TrackKey::Index(10), TrackKey::Length]);
        let change = Change::Length { old: 2, new: 11 };
        let mut hit = affected_deps(ContainerKind::List, &map, &change).to_vec();
        hit.sort_by_key(|dep| ids.iter().position(|id| id == dep));
        assert_eq!(hit, vec![ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn splice_hits_shifted_indices() {
        let (map, ids) = keyed(&[
            TrackKey::Index(0),
            TrackKey::Index(1),
            TrackKey::Index(2),
            TrackKey::Length,
            TrackKey::Iterate,
        ]);
        let change = Change::Splice {
            from: 1,
            old_len: 3,
            new_len: 4,
        };
        assert_eq!(
            affected_deps(ContainerKind::List, &map, &change).as_slice(),
            &[ids[1], ids[2], ids[3], ids[4]]
        );
    }

    #[test]
    fn clear_hits_everything() {
        let (map, ids) = keyed(&[field("a"), TrackKey::Iterate]);
        assert_eq!(
            affected_deps(ContainerKind::Record, &map, &Change::Clear).as_slice(),
            ids.as_slice()
        );
    }
}
