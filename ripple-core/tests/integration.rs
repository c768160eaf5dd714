//! Integration Tests for Reactive System
//!
//! These tests verify that observable containers, refs, computeds, effects
//! and scopes work together correctly.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use ripple_core::observable::{is_reactive, wrap, wrap_readonly, Raw, Value};
use ripple_core::reactive::{
    batch, flush, untracked, Computed, Effect, EffectOptions, EffectScope, Ref, Runtime,
};
use ripple_core::{FlushMode, ReactiveError, RuntimeConfig};

/// Shared run counter for effect bodies.
fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone) {
    let count = Rc::new(Cell::new(0));
    let inc = {
        let count = count.clone();
        move || count.set(count.get() + 1)
    };
    (count, inc)
}

/// Route unhandled errors into a vector instead of the log.
fn capture_errors() -> Rc<RefCell<Vec<ReactiveError>>> {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    Runtime::configure(
        RuntimeConfig::new().with_error_handler(move |err| sink.borrow_mut().push(err.clone())),
    );
    errors
}

fn int(value: Value) -> i64 {
    value.as_int().unwrap_or(-1)
}

/// An effect reading `c[k]` re-runs once per flush, however many writes
/// preceded it.
#[test]
fn effect_reruns_once_per_flush() {
    Runtime::reset();
    let state = wrap(&Raw::record([("count", 0)]));
    let (runs, inc) = counter();

    let reader = state.clone();
    let _effect = Effect::new(move || {
        reader.get("count").unwrap();
        inc();
    });
    assert_eq!(runs.get(), 1);

    state.set("count", 1).unwrap();
    assert_eq!(runs.get(), 2);

    batch(|| {
        for n in 2..10 {
            state.set("count", n).unwrap();
        }
    })
    .unwrap();
    assert_eq!(runs.get(), 3);

    // unrelated key
    state.set("other", 1).unwrap();
    assert_eq!(runs.get(), 3);
}

/// Deferred mode collapses writes until an explicit flush.
#[test]
fn deferred_flush_collapses_writes() {
    Runtime::reset();
    Runtime::configure(RuntimeConfig::new().with_flush_mode(FlushMode::Deferred));
    let state = wrap(&Raw::record([("count", 0)]));
    let (runs, inc) = counter();

    let reader = state.clone();
    let _effect = Effect::new(move || {
        reader.get("count").unwrap();
        inc();
    });

    state.set("count", 1).unwrap();
    state.set("count", 2).unwrap();
    state.set("count", 3).unwrap();
    assert_eq!(runs.get(), 1);

    flush().unwrap();
    assert_eq!(runs.get(), 2);
}

/// Reading the same slot twice in one run registers exactly one link.
#[test]
fn repeated_reads_share_one_link() {
    Runtime::reset();
    let state = wrap(&Raw::record([("a", 1)]));

    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("a").unwrap();
        reader.get("a").unwrap();
        reader.get("a").unwrap();
    });

    assert_eq!(effect.dependency_count(), 1);
    assert_eq!(Runtime::stats().links, 1);
}

/// `flag ? a : b` depends only on the active branch.
#[test]
fn dynamic_dependencies_follow_the_branch() {
    Runtime::reset();
    let flag = Ref::new(true);
    let a = Ref::new(1);
    let b = Ref::new(2);
    let (runs, inc) = counter();

    let (f, ra, rb) = (flag.clone(), a.clone(), b.clone());
    let effect = Effect::new(move || {
        if f.get() {
            ra.get();
        } else {
            rb.get();
        }
        inc();
    });
    assert_eq!(effect.dependency_count(), 2);
    assert_eq!(b.subscriber_count(), 0);

    b.set(20);
    assert_eq!(runs.get(), 1);

    flag.set(false);
    assert_eq!(runs.get(), 2);
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 1);

    a.set(10);
    assert_eq!(runs.get(), 2);
    b.set(21);
    assert_eq!(runs.get(), 3);
}

/// Computeds evaluate on first read only, and again only after a change.
#[test]
fn computed_is_lazy_and_cached() {
    Runtime::reset();
    let state = wrap(&Raw::record([("n", 2)]));
    let reader = state.clone();
    let squared = Computed::new(move || {
        let n = int(reader.get("n").unwrap());
        n * n
    });
    assert_eq!(squared.evaluations(), 0);

    state.set("n", 3).unwrap();
    assert_eq!(squared.evaluations(), 0);

    assert_eq!(squared.get(), 9);
    assert_eq!(squared.get(), 9);
    assert_eq!(squared.evaluations(), 1);

    state.set("n", 4).unwrap();
    assert_eq!(squared.evaluations(), 1);
    assert_eq!(squared.get(), 16);
    assert_eq!(squared.evaluations(), 2);
}

/// A diamond through two computeds re-runs the effect once per change.
#[test]
fn diamond_runs_effect_once() {
    Runtime::reset();
    let source = Ref::new(1);
    let (s1, s2) = (source.clone(), source.clone());
    let left = Computed::new(move || s1.get() + 1);
    let right = Computed::new(move || s2.get() * 2);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (l, r, sink) = (left.clone(), right.clone(), seen.clone());
    let _effect = Effect::new(move || sink.borrow_mut().push(l.get() + r.get()));

    source.set(2);
    source.set(3);
    assert_eq!(*seen.borrow(), vec![4, 7, 10]);
}

/// An effect reading the list length re-runs once after `push`.
#[test]
fn list_length_reacts_to_push() {
    Runtime::reset();
    let list = wrap(&Raw::list([1, 2, 3]));
    let lengths = Rc::new(RefCell::new(Vec::new()));

    let (reader, sink) = (list.clone(), lengths.clone());
    let _effect = Effect::new(move || sink.borrow_mut().push(reader.len()));

    list.push(4).unwrap();
    assert_eq!(*lengths.borrow(), vec![3, 4]);

    // element updates leave the length alone
    list.set(0, 10).unwrap();
    assert_eq!(*lengths.borrow(), vec![3, 4]);
}

/// Writing far past the end pads with nulls and notifies the length and
/// every index that came into existence.
#[test]
fn list_write_past_end_notifies_length_and_new_indices() {
    Runtime::reset();
    let list = wrap(&Raw::list([1, 2]));
    let (length_runs, inc_length) = counter();
    let (slot_runs, inc_slot) = counter();

    let reader = list.clone();
    let _length = Effect::new(move || {
        reader.len();
        inc_length();
    });
    let reader = list.clone();
    let slot = Rc::new(RefCell::new(Value::Null));
    let sink = slot.clone();
    let _slot = Effect::new(move || {
        *sink.borrow_mut() = reader.get(5).unwrap();
        inc_slot();
    });
    assert!(slot.borrow().is_null());

    list.set(10, 5).unwrap();
    assert_eq!(length_runs.get(), 2);
    assert_eq!(slot_runs.get(), 2);
    assert_eq!(list.len(), 11);
    assert!(list.get(5).unwrap().is_null());
    assert_eq!(list.get(10).unwrap(), Value::from(5));
}

/// An index the list could never hold is rejected without touching it.
#[test]
fn list_rejects_unallocatable_index() {
    Runtime::reset();
    let list = wrap(&Raw::list([1, 2]));
    let (runs, inc) = counter();

    let reader = list.clone();
    let _length = Effect::new(move || {
        reader.len();
        inc();
    });

    assert!(matches!(
        list.set(i64::MAX, 0),
        Err(ReactiveError::InvalidKey { .. })
    ));
    assert!(matches!(
        list.set_len(usize::MAX),
        Err(ReactiveError::InvalidKey { .. })
    ));
    assert_eq!(list.len(), 2);
    assert_eq!(runs.get(), 1);
}

/// Shrinking a list notifies readers of indices that fell off the end.
#[test]
fn list_shrink_notifies_out_of_range_readers() {
    Runtime::reset();
    let list = wrap(&Raw::list([1, 2, 3, 4]));
    let (tail_runs, inc_tail) = counter();
    let (head_runs, inc_head) = counter();

    let reader = list.clone();
    let _tail = Effect::new(move || {
        reader.get(3).unwrap();
        inc_tail();
    });
    let reader = list.clone();
    let _head = Effect::new(move || {
        reader.get(0).unwrap();
        inc_head();
    });

    list.set_len(2).unwrap();
    assert_eq!(tail_runs.get(), 2);
    assert_eq!(head_runs.get(), 1);
}

/// Inserting shifts elements; readers of shifted indices re-run.
#[test]
fn list_insert_notifies_shifted_indices() {
    Runtime::reset();
    let list = wrap(&Raw::list(["a", "c"]));
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (reader, sink) = (list.clone(), seen.clone());
    let _effect = Effect::new(move || {
        let value = reader.get(1).unwrap();
        sink.borrow_mut().push(value.as_str().unwrap_or_default().to_string());
    });

    list.insert(1, "b").unwrap();
    list.remove(0).unwrap();
    assert_eq!(*seen.borrow(), vec!["c", "b", "c"]);
}

/// Map key enumeration ignores value updates; entry enumeration does not.
#[test]
fn map_key_iteration_ignores_value_updates() {
    Runtime::reset();
    let map = wrap(&Raw::map([("a", 1)]));
    let (key_runs, inc_keys) = counter();
    let (entry_runs, inc_entries) = counter();

    let reader = map.clone();
    let _keys = Effect::new(move || {
        reader.keys();
        inc_keys();
    });
    let reader = map.clone();
    let _entries = Effect::new(move || {
        reader.entries();
        inc_entries();
    });

    map.set("a", 2).unwrap();
    assert_eq!(key_runs.get(), 1);
    assert_eq!(entry_runs.get(), 2);

    map.set("b", 1).unwrap();
    assert_eq!(key_runs.get(), 2);
    assert_eq!(entry_runs.get(), 3);

    map.delete("a").unwrap();
    assert_eq!(key_runs.get(), 3);
    assert_eq!(entry_runs.get(), 4);
}

/// Value enumeration follows value-only updates on records and maps, while
/// key enumeration stays put.
#[test]
fn value_iteration_sees_value_updates() {
    Runtime::reset();
    let state = wrap(&Raw::record([("a", 1), ("b", 2)]));
    let map = wrap(&Raw::map([("x", 5), ("y", 6)]));
    let (key_runs, inc_keys) = counter();
    let record_sum = Rc::new(Cell::new(0));
    let map_sum = Rc::new(Cell::new(0));

    let (reader, sink) = (state.clone(), record_sum.clone());
    let _record_values = Effect::new(move || {
        sink.set(reader.values().into_iter().map(int).sum::<i64>());
    });
    let (reader, sink) = (map.clone(), map_sum.clone());
    let _map_values = Effect::new(move || {
        sink.set(reader.values().into_iter().map(int).sum::<i64>());
    });
    let reader = state.clone();
    let _record_keys = Effect::new(move || {
        reader.keys();
        inc_keys();
    });
    assert_eq!(record_sum.get(), 3);
    assert_eq!(map_sum.get(), 11);

    state.set("a", 10).unwrap();
    assert_eq!(record_sum.get(), 12);
    assert_eq!(key_runs.get(), 1);

    map.set("y", 60).unwrap();
    assert_eq!(map_sum.get(), 65);

    state.set("c", 100).unwrap();
    assert_eq!(record_sum.get(), 112);
    assert_eq!(key_runs.get(), 2);
}

/// A wrapped key addresses the same map entry as its raw value.
#[test]
fn map_tracks_raw_keys() {
    Runtime::reset();
    let key = Raw::record([("id", 7)]);
    let map = wrap(&Raw::map(Vec::<(Value, Value)>::new()));
    let (runs, inc) = counter();

    let (reader, raw_key) = (map.clone(), key.clone());
    let _effect = Effect::new(move || {
        reader.has(raw_key.clone()).unwrap();
        inc();
    });

    map.set(wrap(&key), "seven").unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(map.get(key).unwrap(), Value::from("seven"));
}

/// Sets notify membership readers and iterators on add/delete only.
#[test]
fn set_membership() {
    Runtime::reset();
    let set = wrap(&Raw::set([1, 2]));
    let (has_runs, inc_has) = counter();
    let (size_runs, inc_size) = counter();

    let reader = set.clone();
    let _has = Effect::new(move || {
        reader.has(3).unwrap();
        inc_has();
    });
    let reader = set.clone();
    let _size = Effect::new(move || {
        reader.len();
        inc_size();
    });

    set.add(3).unwrap();
    set.add(3).unwrap();
    assert_eq!(has_runs.get(), 2);
    assert_eq!(size_runs.get(), 2);

    set.delete(1).unwrap();
    assert_eq!(has_runs.get(), 2);
    assert_eq!(size_runs.get(), 3);

    set.clear().unwrap();
    assert_eq!(has_runs.get(), 3);
    assert_eq!(size_runs.get(), 4);
}

/// Nested composites are wrapped on read and changes inside them are seen.
#[test]
fn deep_containers_track_nested_writes() {
    Runtime::reset();
    let state = wrap(&Raw::record([("user", Raw::record([("name", "ada")]))]));
    let names = Rc::new(RefCell::new(Vec::new()));

    let (reader, sink) = (state.clone(), names.clone());
    let _effect = Effect::new(move || {
        let user = reader.get("user").unwrap();
        let name = user.as_handle().map(|user| user.get("name").unwrap());
        sink.borrow_mut().push(name.and_then(|n| n.as_str().map(str::to_string)));
    });

    let user = state.get("user").unwrap();
    assert!(is_reactive(&user));
    user.as_handle().unwrap().set("name", "grace").unwrap();

    assert_eq!(
        *names.borrow(),
        vec![Some("ada".to_string()), Some("grace".to_string())]
    );
}

/// Read-only views reject writes and do not track.
#[test]
fn readonly_views() {
    Runtime::reset();
    let raw = Raw::record([("a", 1)]);
    let frozen = wrap_readonly(&raw);
    let (runs, inc) = counter();

    let reader = frozen.clone();
    let effect = Effect::new(move || {
        reader.get("a").unwrap();
        inc();
    });
    assert_eq!(effect.dependency_count(), 0);
    assert!(matches!(frozen.set("a", 2), Err(ReactiveError::Readonly { .. })));

    // a readonly view of a reactive handle does track
    let state = wrap(&raw);
    let view = state.readonly();
    let reader = view.clone();
    let tracked = Effect::new(move || {
        reader.get("a").unwrap();
    });
    assert_eq!(tracked.dependency_count(), 1);
    state.set("a", 5).unwrap();
    assert_eq!(tracked.run_count(), 2);
    assert_eq!(runs.get(), 1);
}

/// After `stop`, writes cause zero re-runs.
#[test]
fn stopped_effect_never_reruns() {
    Runtime::reset();
    let state = wrap(&Raw::record([("a", 1)]));
    let (runs, inc) = counter();

    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("a").unwrap();
        inc();
    });
    effect.stop();

    state.set("a", 2).unwrap();
    state.set("a", 3).unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(Runtime::stats().links, 0);
}

/// Stopping an effect that is already queued skips it at flush time.
#[test]
fn stop_before_flush_skips_the_job() {
    Runtime::reset();
    let source = Ref::new(0);
    let (runs, inc) = counter();

    let reader = source.clone();
    let effect = Effect::new(move || {
        reader.get();
        inc();
    });

    batch(|| {
        source.set(1);
        effect.stop();
    })
    .unwrap();
    assert_eq!(runs.get(), 1);
}

/// Of two effects on one dep, the first panicking does not stop the second.
#[test]
fn panicking_effect_is_isolated() {
    Runtime::reset();
    let errors = capture_errors();
    let source = Ref::new(0);
    let seen = Rc::new(Cell::new(0));

    let reader = source.clone();
    let _failing = Effect::with_options(
        move || {
            if reader.get() > 0 {
                panic!("cannot handle {}", reader.get_untracked());
            }
        },
        EffectOptions::new().label("failing"),
    );
    let (reader, sink) = (source.clone(), seen.clone());
    let _healthy = Effect::new(move || sink.set(reader.get()));

    source.set(3);
    assert_eq!(seen.get(), 3);

    let errors = errors.borrow();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ReactiveError::Flush { failures } => {
            assert_eq!(
                failures.as_slice(),
                &[ReactiveError::Panicked {
                    subscriber: "failing".into(),
                    message: "cannot handle 3".into(),
                }]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// A batch that panics still flushes the writes it made before unwinding.
#[test]
fn panicking_batch_flushes_before_unwinding() {
    Runtime::reset();
    let source = Ref::new(0);
    let (runs, inc) = counter();
    let seen = Rc::new(Cell::new(0));

    let (reader, sink) = (source.clone(), seen.clone());
    let _effect = Effect::new(move || {
        sink.set(reader.get());
        inc();
    });

    let result = catch_unwind(AssertUnwindSafe(|| {
        batch(|| {
            source.set(1);
            panic!("inside batch");
        })
    }));
    assert!(result.is_err());
    assert_eq!(runs.get(), 2);
    assert_eq!(seen.get(), 1);
    assert_eq!(Runtime::pending(), 0);

    source.set(2);
    assert_eq!(runs.get(), 3);
    assert_eq!(seen.get(), 2);
}

/// A direct `run` that panics after writing leaves no job behind, and the
/// runtime keeps scheduling afterwards.
#[test]
fn panicking_direct_run_recovers() {
    Runtime::reset();
    let source = Ref::new(0);
    let seen = Rc::new(Cell::new(0));

    let (reader, sink) = (source.clone(), seen.clone());
    let _observer = Effect::new(move || sink.set(reader.get()));

    let writer = source.clone();
    let failing = Effect::new_lazy(move || {
        writer.set(7);
        panic!("after write");
    });
    let result = catch_unwind(AssertUnwindSafe(|| failing.run()));
    assert!(result.is_err());
    assert_eq!(seen.get(), 7);
    assert_eq!(Runtime::pending(), 0);

    source.set(8);
    assert_eq!(seen.get(), 8);
}

/// An effect writing its own dependency trips the recursion guard.
#[test]
fn self_triggering_effect_hits_recursion_limit() {
    Runtime::reset();
    let errors = capture_errors();
    let source = Ref::new(0);

    let reader = source.clone();
    let effect = Effect::with_options(
        move || {
            let n = reader.get();
            reader.set(n + 1);
        },
        EffectOptions::new().label("runaway"),
    );

    assert_eq!(effect.run_count(), 101);
    assert_eq!(
        *errors.borrow(),
        vec![ReactiveError::RecursionLimit {
            subscriber: "runaway".into(),
            limit: 100,
        }]
    );
    assert!(errors.borrow()[0].is_fatal());
    assert_eq!(Runtime::pending(), 0);
}

/// The guard is configurable.
#[test]
fn recursion_limit_is_configurable() {
    Runtime::reset();
    Runtime::configure(RuntimeConfig::new().with_recursion_limit(5));
    let source = Ref::new(0);

    let reader = source.clone();
    let effect = Effect::new_lazy(move || {
        let n = reader.get();
        reader.set(n + 1);
    });

    let result = effect.run();
    assert!(matches!(result, Err(ReactiveError::RecursionLimit { limit: 5, .. })));
    assert_eq!(effect.run_count(), 6);
}

/// Effects run in creation order regardless of trigger order.
#[test]
fn flush_runs_in_creation_order() {
    Runtime::reset();
    let a = Ref::new(0);
    let b = Ref::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let (reader, sink) = (b.clone(), order.clone());
    let _first = Effect::new(move || {
        reader.get();
        sink.borrow_mut().push("first");
    });
    let (reader, sink) = (a.clone(), order.clone());
    let _second = Effect::new(move || {
        reader.get();
        sink.borrow_mut().push("second");
    });
    order.borrow_mut().clear();

    batch(|| {
        a.set(1);
        b.set(1);
    })
    .unwrap();
    assert_eq!(*order.borrow(), vec!["first", "second"]);
}

/// A custom scheduler fires once per batch instead of re-running.
#[test]
fn scheduler_fires_once_per_batch() {
    Runtime::reset();
    let state = wrap(&Raw::record([("a", 0), ("b", 0)]));
    let (calls, inc) = counter();

    let reader = state.clone();
    let effect = Effect::with_options(
        move || {
            reader.get("a").unwrap();
            reader.get("b").unwrap();
        },
        EffectOptions::new().scheduler(move |_| inc()),
    );

    batch(|| {
        state.set("a", 1).unwrap();
        state.set("b", 1).unwrap();
    })
    .unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(effect.run_count(), 1);

    // the scheduler decides when to run
    effect.run().unwrap();
    assert_eq!(effect.run_count(), 2);
    assert!(!effect.is_dirty());
}

/// Scopes stop everything created inside them, transitively.
#[test]
fn scope_stops_members() {
    Runtime::reset();
    let source = Ref::new(0);
    let (runs, inc) = counter();
    let scope = EffectScope::new();

    scope
        .run(|| {
            let reader = source.clone();
            let outer = inc.clone();
            let _ = Effect::new(move || {
                reader.get();
                outer();
            });
            EffectScope::new()
                .run(|| {
                    let reader = source.clone();
                    let _ = Effect::new(move || {
                        reader.get();
                        inc();
                    });
                })
                .unwrap();
        })
        .unwrap();
    assert_eq!(runs.get(), 2);

    source.set(1);
    assert_eq!(runs.get(), 4);

    scope.stop();
    source.set(2);
    assert_eq!(runs.get(), 4);
    assert_eq!(source.subscriber_count(), 0);
    assert_eq!(scope.run(|| ()), Err(ReactiveError::ScopeInactive));
}

/// `untracked` reads never subscribe.
#[test]
fn untracked_reads() {
    Runtime::reset();
    let state = wrap(&Raw::record([("a", 1)]));
    let reader = state.clone();
    let effect = Effect::new(move || {
        untracked(|| reader.get("a").unwrap());
    });
    assert_eq!(effect.dependency_count(), 0);
}

/// Dropping a container evicts its registry entry.
#[test]
fn dropping_a_container_evicts_its_deps() {
    Runtime::reset();
    let raw = Raw::record([("a", 1)]);
    let state = wrap(&raw);
    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("a").unwrap();
    });
    assert_eq!(Runtime::stats().targets, 1);

    drop((effect, state, raw));
    assert_eq!(Runtime::stats(), Default::default());
}
