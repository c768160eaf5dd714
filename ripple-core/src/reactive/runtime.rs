//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observable slots,
//! computeds and effects. It owns the dependency graph, the dependency
//! registry, the active-subscriber stack and the update scheduler.
//!
//! # How It Works
//!
//! 1. When an effect or computed is created, it registers a subscriber node.
//!
//! 2. When a subscriber reads observable state, the runtime records a link
//!    between the slot's dep and the running subscriber.
//!
//! 3. When observable state changes, the runtime:
//!    a. Finds the affected deps through the registry
//!    b. Marks their readers dirty, and readers of invalidated computeds
//!       "maybe dirty"
//!    c. Queues effects for execution
//!    d. Computeds are lazy - they recompute on next access
//!
//! 4. At the end of the outermost write, run or batch the queue is flushed
//!    (or, in deferred mode, left for an explicit [`flush`]).
//!
//! # Thread Model
//!
//! Each thread has its own runtime, created on first use. Reactive values are
//! `!Send`, so nothing crosses threads and no locking is required. The state
//! lives in a `RefCell`; it is never borrowed while user code runs, and any
//! value dropped while it is borrowed is parked in a graveyard and released
//! afterwards, because dropping a container can re-enter the runtime.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use super::scope;
use super::subscriber::{Reactive, SubscriberId};
use crate::config::{FlushMode, RuntimeConfig};
use crate::error::{ReactiveError, Result};
use crate::graph::{DepId, DepNode, DirtyLevel, Graph, SubscriberKind, SubscriberNode, UpdateScheduler};
use crate::observable::{affected_deps, Change, ContainerKind, TargetId, TrackKey};

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::new());
}

/// Run `f` with exclusive access to this thread's runtime state.
fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    let (out, graveyard) = RUNTIME.with(|cell| {
        let mut state = cell.borrow_mut();
        let out = f(&mut state);
        (out, mem::take(&mut state.graveyard))
    });
    drop(graveyard);
    out
}

/// Like [`with_state`], but a no-op once the thread is tearing down.
fn try_with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
    let (out, graveyard) = RUNTIME
        .try_with(|cell| {
            let mut state = cell.borrow_mut();
            let out = f(&mut state);
            (out, mem::take(&mut state.graveyard))
        })
        .ok()?;
    drop(graveyard);
    Some(out)
}

/// Counts of live graph objects on this thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStats {
    pub deps: usize,
    pub subscribers: usize,
    pub links: usize,
    pub targets: usize,
    pub pending: usize,
}

/// The per-thread reactive runtime.
///
/// All state is created lazily on first use. [`Runtime::reset`] discards it,
/// which is mainly useful to isolate tests sharing a thread.
pub struct Runtime;

pub(crate) struct RuntimeState {
    graph: Graph,

    /// Container deps: target -> key -> dep. Keyed by target id only, so the
    /// registry never keeps a container alive.
    registry: HashMap<TargetId, IndexMap<TrackKey, DepId>>,

    /// Running subscribers, innermost last.
    stack: SmallVec<[SubscriberId; 8]>,
    should_track: bool,
    track_stack: SmallVec<[bool; 8]>,

    scheduler: UpdateScheduler,
    batch_depth: u32,
    next_order: u64,
    config: RuntimeConfig,

    /// Keys released while the state was borrowed.
    graveyard: Vec<TrackKey>,
}

pub(crate) enum Job {
    Done,
    Skip,
    Run {
        handle: Rc<dyn Reactive>,
        label: String,
    },
    Overflow(ReactiveError),
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: Graph::new(),
            registry: HashMap::new(),
            stack: SmallVec::new(),
            should_track: true,
            track_stack: SmallVec::new(),
            scheduler: UpdateScheduler::new(),
            batch_depth: 0,
            next_order: 0,
            config: RuntimeConfig::default(),
            graveyard: Vec::new(),
        }
    }

    fn describe(&self, id: SubscriberId) -> String {
        match self.graph.subscribers.get(id) {
            Some(SubscriberNode {
                label: Some(label), ..
            }) => label.to_string(),
            Some(SubscriberNode {
                kind: SubscriberKind::Computed { .. },
                ..
            }) => format!("computed {id}"),
            _ => format!("effect {id}"),
        }
    }

    fn disposed(&self, id: SubscriberId) -> ReactiveError {
        ReactiveError::Disposed {
            subscriber: id.to_string(),
        }
    }

    /// The subscriber reads should be recorded against, if any.
    fn active_tracker(&self) -> Option<SubscriberId> {
        if !self.should_track {
            return None;
        }
        let id = *self.stack.last()?;
        self.graph
            .subscribers
            .get(id)
            .filter(|node| node.active)
            .map(|_| id)
    }

    fn register(
        &mut self,
        computed: bool,
        handle: Weak<dyn Reactive>,
        label: Option<Cow<'static, str>>,
    ) -> (SubscriberId, Option<DepId>) {
        let order = self.next_order;
        self.next_order += 1;

        if !computed {
            let node = SubscriberNode::new(SubscriberKind::Effect, order, label, handle);
            return (self.graph.add_subscriber(node), None);
        }

        let dep = self.graph.add_dep(DepNode::new(None, None));
        let node = SubscriberNode::new(SubscriberKind::Computed { dep }, order, label, handle);
        let id = self.graph.add_subscriber(node);
        if let Some(dep_node) = self.graph.deps.get_mut(dep) {
            dep_node.owner = Some(id);
        }
        (id, Some(dep))
    }

    /// Free registry deps left without readers.
    fn release_deps(&mut self, deps: impl IntoIterator<Item = DepId>) {
        for dep in deps {
            let unused = self
                .graph
                .deps
                .get(dep)
                .is_some_and(|node| node.is_empty() && node.origin.is_some());
            if !unused {
                continue;
            }
            let Some(node) = self.graph.deps.remove(dep) else {
                continue;
            };
            let Some((target, key)) = node.origin else {
                continue;
            };
            if let Some(keyed) = self.registry.get_mut(&target) {
                if let Some((stored, _)) = keyed.shift_remove_entry(&key) {
                    self.graveyard.push(stored);
                }
                if keyed.is_empty() {
                    self.registry.remove(&target);
                }
            }
            self.graveyard.push(key);
        }
    }

    fn track_key(&mut self, target: TargetId, key: TrackKey) {
        let Some(sub) = self.active_tracker() else {
            self.graveyard.push(key);
            return;
        };

        let keyed = self.registry.entry(target).or_default();
        let dep = match keyed.get(&key) {
            Some(&dep) => {
                self.graveyard.push(key);
                dep
            }
            None => {
                let dep = self
                    .graph
                    .add_dep(DepNode::new(None, Some((target, key.clone()))));
                keyed.insert(key, dep);
                dep
            }
        };
        if self.graph.track(sub, dep) {
            trace!(subscriber = %sub, ?dep, "tracked");
        }
    }

    fn track_dep(&mut self, dep: DepId) {
        if let Some(sub) = self.active_tracker() {
            self.graph.track(sub, dep);
        }
    }

    /// Push dirtiness from `roots` through the graph.
    ///
    /// Direct readers become dirty, readers reached through a computed become
    /// maybe-dirty, and effects are queued once. Returns `true` when the
    /// deferred-flush hook should fire.
    fn propagate(&mut self, roots: &[DepId]) -> bool {
        let mut pending: SmallVec<[(DepId, DirtyLevel); 8]> =
            roots.iter().map(|dep| (*dep, DirtyLevel::Dirty)).collect();
        let mut visited: SmallVec<[DepId; 8]> = SmallVec::new();
        let mut request = false;

        while let Some((dep, level)) = pending.pop() {
            if visited.contains(&dep) {
                continue;
            }
            visited.push(dep);

            for (sub, link) in self.graph.readers(dep) {
                let link_generation = self.graph.link(link).generation;
                let Some(node) = self.graph.subscribers.get_mut(sub) else {
                    continue;
                };
                if !node.active {
                    continue;
                }
                // a running subscriber only reacts to deps it already read this run
                if node.is_running() && link_generation != node.generation {
                    continue;
                }
                if node.level < level {
                    node.level = level;
                }

                match node.kind {
                    SubscriberKind::Computed { dep: own } => {
                        pending.push((own, DirtyLevel::MaybeDirty));
                    }
                    SubscriberKind::Effect => {
                        if node.queued {
                            continue;
                        }
                        node.queued = true;
                        let order = node.order;
                        self.scheduler.enqueue(sub, order);
                        trace!(subscriber = %sub, "queued");
                        if self.config.flush_mode == FlushMode::Deferred && self.scheduler.request() {
                            request = true;
                        }
                    }
                }
            }
        }
        request
    }

    /// A computed produced a new value: maybe-dirty readers must re-run.
    fn mark_readers_dirty(&mut self, dep: DepId) {
        for (sub, _) in self.graph.readers(dep) {
            let Some(node) = self.graph.subscribers.get_mut(sub) else {
                continue;
            };
            if node.active && !node.is_running() && node.level == DirtyLevel::MaybeDirty {
                node.level = DirtyLevel::Dirty;
            }
        }
    }

    /// Computeds `id` read during its last run, in read order.
    fn computed_sources(&self, id: SubscriberId) -> SmallVec<[Rc<dyn Reactive>; 4]> {
        self.graph
            .sources(id)
            .into_iter()
            .filter_map(|dep| self.graph.deps.get(dep)?.owner)
            .filter_map(|owner| self.graph.subscribers.get(owner)?.handle.upgrade())
            .collect()
    }

    fn enter(&mut self, id: SubscriberId) -> Result<()> {
        let Some(node) = self.graph.subscribers.get_mut(id) else {
            return Err(self.disposed(id));
        };
        node.running += 1;
        node.level = DirtyLevel::Clean;
        self.graph.begin_run(id);
        self.stack.push(id);
        self.track_stack.push(self.should_track);
        self.should_track = true;
        Ok(())
    }

    fn exit(&mut self, id: SubscriberId, failed: bool) {
        if let Some(top) = self.stack.pop() {
            debug_assert_eq!(
                top, id,
                "ReactiveContext mismatch: expected {id:?}, got {top:?}"
            );
        }
        self.should_track = self.track_stack.pop().unwrap_or(true);

        let emptied = self.graph.finish_run(id);
        self.release_deps(emptied);

        let Some(node) = self.graph.subscribers.get_mut(id) else {
            return;
        };
        node.running = node.running.saturating_sub(1);
        match node.kind {
            SubscriberKind::Computed { .. } if failed => node.level = DirtyLevel::Dirty,
            SubscriberKind::Effect
                if node.active && !node.queued && node.level == DirtyLevel::Dirty =>
            {
                // skipped by a flush while running
                node.queued = true;
                let order = node.order;
                self.scheduler.enqueue(id, order);
            }
            _ => {}
        }
    }

    fn stop(&mut self, id: SubscriberId) -> bool {
        let Some(node) = self.graph.subscribers.get_mut(id) else {
            return false;
        };
        if !node.active {
            return false;
        }
        node.active = false;
        node.level = DirtyLevel::Clean;
        let emptied = self.graph.clear_subscriber(id);
        self.release_deps(emptied);
        true
    }

    fn dispose_subscriber(&mut self, id: SubscriberId) {
        let emptied = self.graph.clear_subscriber(id);
        self.release_deps(emptied);
        if let Some(node) = self.graph.subscribers.remove(id) {
            if let SubscriberKind::Computed { dep } = node.kind {
                self.dispose_dep(dep);
            }
        }
    }

    fn dispose_dep(&mut self, dep: DepId) {
        if let Some(node) = self.graph.remove_dep(dep) {
            if let Some((_, key)) = node.origin {
                self.graveyard.push(key);
            }
        }
    }

    fn evict_target(&mut self, target: TargetId) {
        let Some(keyed) = self.registry.remove(&target) else {
            return;
        };
        for (key, dep) in keyed {
            self.dispose_dep(dep);
            self.graveyard.push(key);
        }
    }

    fn next_job(&mut self) -> Job {
        let Some(id) = self.scheduler.next() else {
            return Job::Done;
        };
        let Some(node) = self.graph.subscribers.get_mut(id) else {
            return Job::Skip;
        };
        node.queued = false;
        if !node.active || node.is_running() {
            return Job::Skip;
        }

        let limit = self.config.recursion_limit;
        if self.scheduler.record_run(id) > limit {
            return Job::Overflow(ReactiveError::RecursionLimit {
                subscriber: self.describe(id),
                limit,
            });
        }

        match self.graph.subscribers.get(id).and_then(|node| node.handle.upgrade()) {
            Some(handle) => Job::Run {
                handle,
                label: self.describe(id),
            },
            None => Job::Skip,
        }
    }

    fn abort_flush(&mut self) {
        for id in self.scheduler.abort() {
            if let Some(node) = self.graph.subscribers.get_mut(id) {
                node.queued = false;
            }
        }
    }

    fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            deps: self.graph.deps.len(),
            subscribers: self.graph.subscribers.len(),
            links: self.graph.links.len(),
            targets: self.registry.len(),
            pending: self.scheduler.pending(),
        }
    }
}

impl Runtime {
    /// Install a new configuration for this thread's runtime.
    pub fn configure(config: RuntimeConfig) {
        let previous = with_state(|state| mem::replace(&mut state.config, config));
        drop(previous);
    }

    /// The configuration currently in effect.
    pub fn config() -> RuntimeConfig {
        with_state(|state| state.config.clone())
    }

    /// Discard every dep, subscriber, link and queued job, and restore the
    /// default configuration.
    ///
    /// Handles created before the reset stay valid Rust values but become
    /// inert: their ids no longer resolve. Must not be called while a
    /// subscriber is running.
    pub fn reset() {
        let discarded = with_state(|state| {
            let registry = mem::take(&mut state.registry);
            let deps = state.graph.deps.drain();
            state.graph.subscribers.drain();
            state.graph.links.drain();
            state.stack.clear();
            state.track_stack.clear();
            state.should_track = true;
            state.scheduler = UpdateScheduler::new();
            state.batch_depth = 0;
            let config = mem::take(&mut state.config);
            (registry, deps, config)
        });
        drop(discarded);
        scope::reset_scope_stack();
        debug!("runtime reset");
    }

    pub fn stats() -> RuntimeStats {
        with_state(|state| state.stats())
    }

    /// Get the subscriber currently running, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        with_state(|state| state.stack.last().copied())
    }

    /// Check whether reads are currently being recorded.
    pub fn is_tracking() -> bool {
        with_state(|state| state.active_tracker().is_some())
    }

    /// Number of queued subscribers waiting for a flush.
    pub fn pending() -> usize {
        with_state(|state| state.scheduler.pending())
    }

    pub(crate) fn register_effect(
        handle: Weak<dyn Reactive>,
        label: Option<Cow<'static, str>>,
    ) -> SubscriberId {
        with_state(|state| state.register(false, handle, label).0)
    }

    pub(crate) fn register_computed(
        handle: Weak<dyn Reactive>,
        label: Option<Cow<'static, str>>,
    ) -> (SubscriberId, DepId) {
        with_state(|state| {
            let (id, dep) = state.register(true, handle, label);
            (id, dep.expect("computed registration always creates a dep"))
        })
    }

    pub(crate) fn create_dep() -> DepId {
        with_state(|state| state.graph.add_dep(DepNode::new(None, None)))
    }

    pub(crate) fn dispose_dep(dep: DepId) {
        try_with_state(|state| state.dispose_dep(dep));
    }

    pub(crate) fn dispose_subscriber(id: SubscriberId) {
        try_with_state(|state| state.dispose_subscriber(id));
    }

    /// Deactivate a subscriber and drop all of its links.
    ///
    /// Returns `false` if it was already stopped.
    pub(crate) fn stop_subscriber(id: SubscriberId) -> bool {
        let stopped = with_state(|state| state.stop(id));
        if stopped {
            debug!(subscriber = %id, "stopped");
        }
        stopped
    }

    pub(crate) fn evict_target(target: TargetId) {
        try_with_state(|state| state.evict_target(target));
    }

    pub(crate) fn enter(id: SubscriberId) -> Result<()> {
        with_state(|state| state.enter(id))
    }

    pub(crate) fn exit(id: SubscriberId, failed: bool) {
        try_with_state(|state| state.exit(id, failed));
    }

    pub(crate) fn track(target: TargetId, key: TrackKey) {
        with_state(|state| state.track_key(target, key));
    }

    pub(crate) fn track_dep(dep: DepId) {
        with_state(|state| state.track_dep(dep));
    }

    /// Notify every dep affected by `change` on `target`.
    pub(crate) fn trigger(target: TargetId, kind: ContainerKind, change: &Change) {
        let deps = with_state(|state| {
            state
                .registry
                .get(&target)
                .map(|keyed| affected_deps(kind, keyed, change))
                .unwrap_or_default()
        });
        trace!(?target, ?change, deps = deps.len(), "trigger");
        notify(&deps);
    }

    pub(crate) fn trigger_dep(dep: DepId) {
        notify(&[dep]);
    }

    pub(crate) fn mark_readers_dirty(dep: DepId) {
        with_state(|state| state.mark_readers_dirty(dep));
    }

    /// Whether `id` has to re-run, resolving a maybe-dirty state by refreshing
    /// the computeds it read.
    pub(crate) fn is_dirty(id: SubscriberId) -> Result<bool> {
        let (level, sources) = with_state(|state| {
            let level = state
                .graph
                .subscribers
                .get(id)
                .map(|node| node.level)
                .ok_or_else(|| state.disposed(id))?;
            let sources = if level == DirtyLevel::MaybeDirty {
                state.computed_sources(id)
            } else {
                SmallVec::new()
            };
            Ok::<_, ReactiveError>((level, sources))
        })?;

        match level {
            DirtyLevel::Clean => Ok(false),
            DirtyLevel::Dirty => Ok(true),
            DirtyLevel::MaybeDirty => {
                for source in sources {
                    source.refresh()?;
                    if Self::level(id) == Some(DirtyLevel::Dirty) {
                        return Ok(true);
                    }
                }
                with_state(|state| {
                    if let Some(node) = state.graph.subscribers.get_mut(id) {
                        if node.level == DirtyLevel::MaybeDirty {
                            node.level = DirtyLevel::Clean;
                        }
                    }
                });
                Ok(false)
            }
        }
    }

    pub(crate) fn level(id: SubscriberId) -> Option<DirtyLevel> {
        with_state(|state| state.graph.subscribers.get(id).map(|node| node.level))
    }

    pub(crate) fn contains(id: SubscriberId) -> bool {
        with_state(|state| state.graph.subscribers.contains(id))
    }

    pub(crate) fn is_active(id: SubscriberId) -> bool {
        with_state(|state| state.graph.subscribers.get(id).is_some_and(|node| node.active))
    }

    pub(crate) fn is_running(id: SubscriberId) -> bool {
        with_state(|state| {
            state
                .graph
                .subscribers
                .get(id)
                .is_some_and(|node| node.is_running())
        })
    }

    pub(crate) fn dependency_count(id: SubscriberId) -> usize {
        with_state(|state| {
            state
                .graph
                .subscribers
                .get(id)
                .map_or(0, |node| node.dependency_count())
        })
    }

    pub(crate) fn subscriber_count(dep: DepId) -> usize {
        with_state(|state| state.graph.deps.get(dep).map_or(0, |node| node.len))
    }

    pub(crate) fn describe(id: SubscriberId) -> String {
        with_state(|state| state.describe(id))
    }

    pub(crate) fn pause_tracking() {
        with_state(|state| {
            state.track_stack.push(state.should_track);
            state.should_track = false;
        });
    }

    pub(crate) fn enable_tracking() {
        with_state(|state| {
            state.track_stack.push(state.should_track);
            state.should_track = true;
        });
    }

    pub(crate) fn reset_tracking() {
        try_with_state(|state| {
            state.should_track = state.track_stack.pop().unwrap_or(true);
        });
    }
}

/// Hand an error nobody can receive to the configured handler, or log it.
pub(crate) fn report(err: ReactiveError) {
    let handler = with_state(|state| state.config.error_handler.clone());
    match handler {
        Some(handler) => handler(&err),
        None => error!(%err, "unhandled reactive error"),
    }
}

fn notify(deps: &[DepId]) {
    if deps.is_empty() {
        return;
    }
    let batch = BatchGuard::begin();
    let request = with_state(|state| state.propagate(deps));
    if request {
        let hook = with_state(|state| state.config.flush_requested.clone());
        if let Some(hook) = hook {
            hook();
        }
    }
    if let Err(err) = batch.finish() {
        report(err);
    }
}

/// Holds a batch open; the outermost batch flushes when finished.
///
/// Dropping the guard without [`finish`](Self::finish) closes the batch
/// without flushing. Code that may panic inside a batch goes through
/// [`batched`], which still flushes before the panic continues.
pub(crate) struct BatchGuard {
    finished: bool,
}

impl BatchGuard {
    pub fn begin() -> Self {
        with_state(|state| state.batch_depth += 1);
        Self { finished: false }
    }

    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        let flush = with_state(|state| {
            state.batch_depth = state.batch_depth.saturating_sub(1);
            state.batch_depth == 0
                && state.config.flush_mode == FlushMode::Sync
                && !state.scheduler.is_flushing()
                && state.scheduler.pending() > 0
        });
        if flush {
            flush_queue()
        } else {
            Ok(())
        }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if !self.finished {
            try_with_state(|state| state.batch_depth = state.batch_depth.saturating_sub(1));
        }
    }
}

/// Run every queued subscriber in creation order.
///
/// A panicking subscriber is isolated: the rest of the queue still runs and
/// the failures are returned together. Tripping the recursion limit drops the
/// remaining queue and returns immediately.
pub(crate) fn flush_queue() -> Result<()> {
    let pending = with_state(|state| {
        state
            .scheduler
            .begin_flush()
            .then(|| state.scheduler.pending())
    });
    let Some(pending) = pending else {
        return Ok(());
    };
    debug!(pending, "flush started");

    let mut failures = Vec::new();
    loop {
        match with_state(RuntimeState::next_job) {
            Job::Done => break,
            Job::Skip => continue,
            Job::Overflow(err) => {
                with_state(RuntimeState::abort_flush);
                error!(%err, "flush aborted");
                return Err(err);
            }
            Job::Run { handle, label } => {
                match panic::catch_unwind(AssertUnwindSafe(|| handle.run_job())) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(subscriber = %label, %err, "subscriber failed");
                        failures.push(err);
                    }
                    Err(payload) => {
                        let err = ReactiveError::panicked(label, payload.as_ref());
                        warn!(%err, "subscriber panicked");
                        failures.push(err);
                    }
                }
            }
        }
    }

    with_state(|state| state.scheduler.end_flush());
    debug!(failed = failures.len(), "flush finished");
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReactiveError::Flush { failures })
    }
}

/// Run all queued subscribers now.
///
/// A no-op when a flush is already in progress.
pub fn flush() -> Result<()> {
    flush_queue()
}

/// Run `f` as one batch.
///
/// If `f` panics, the work it queued before panicking is flushed anyway
/// (flush errors go to [`report`]) and the panic then resumes.
pub(crate) fn batched<R>(f: impl FnOnce() -> R) -> Result<R> {
    let guard = BatchGuard::begin();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(out) => {
            guard.finish()?;
            Ok(out)
        }
        Err(payload) => {
            if let Err(err) = guard.finish() {
                report(err);
            }
            panic::resume_unwind(payload)
        }
    }
}

/// Group writes so dependent effects run once, when the outermost batch ends.
///
/// Returns the closure's result, or the flush error if the closing flush
/// failed. A panic in `f` still flushes what was queued before it, then
/// propagates.
pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    batched(f)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::reactive::{Effect, Ref};

    #[test]
    fn runtime_registers_and_disposes_effects() {
        let before = Runtime::stats();
        let effect = Effect::new(|| {});
        assert_eq!(Runtime::stats().subscribers, before.subscribers + 1);

        drop(effect);
        assert_eq!(Runtime::stats().subscribers, before.subscribers);
    }

    #[test]
    fn runtime_tracks_only_inside_subscribers() {
        assert!(!Runtime::is_tracking());
        assert!(Runtime::current_subscriber().is_none());

        let seen = Rc::new(Cell::new(false));
        let seen_in = seen.clone();
        let _effect = Effect::new(move || seen_in.set(Runtime::is_tracking()));
        assert!(seen.get());
    }

    #[test]
    fn batch_coalesces_writes() {
        let source = Ref::new(0);
        let runs = Rc::new(Cell::new(0));

        let src = source.clone();
        let counter = runs.clone();
        let _effect = Effect::new(move || {
            src.get();
            counter.set(counter.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        batch(|| {
            source.set(1);
            source.set(2);
            source.set(3);
        })
        .unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn panicking_batch_flushes_before_unwinding() {
        let source = Ref::new(0);
        let runs = Rc::new(Cell::new(0));

        let src = source.clone();
        let counter = runs.clone();
        let _effect = Effect::new(move || {
            src.get();
            counter.set(counter.get() + 1);
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            batch(|| {
                source.set(1);
                panic!("boom");
            })
        }));
        assert!(result.is_err());
        assert_eq!(runs.get(), 2);
        assert_eq!(Runtime::pending(), 0);
        assert_eq!(with_state(|state| state.batch_depth), 0);
    }

    #[test]
    fn deferred_mode_waits_for_flush_and_requests_once() {
        let requests = Rc::new(Cell::new(0));
        let hook_count = requests.clone();
        Runtime::configure(
            RuntimeConfig::new()
                .with_flush_mode(FlushMode::Deferred)
                .on_flush_requested(move || hook_count.set(hook_count.get() + 1)),
        );

        let source = Ref::new(0);
        let runs = Rc::new(Cell::new(0));
        let src = source.clone();
        let counter = runs.clone();
        let _effect = Effect::new(move || {
            src.get();
            counter.set(counter.get() + 1);
        });

        source.set(1);
        source.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(requests.get(), 1);
        assert_eq!(Runtime::pending(), 1);

        flush().unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(Runtime::pending(), 0);

        source.set(3);
        assert_eq!(requests.get(), 2);
        Runtime::reset();
    }

    #[test]
    fn reset_discards_graph_state() {
        let source = Ref::new(1);
        let src = source.clone();
        let effect = Effect::new(move || {
            src.get();
        });
        assert!(Runtime::stats().links > 0);

        Runtime::reset();
        assert_eq!(Runtime::stats(), RuntimeStats::default());

        // handles from before the reset are inert
        source.set(2);
        assert_eq!(effect.dependency_count(), 0);
    }
}
