//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph:
//! deps (observable slots), subscribers (effects and computeds) and the links
//! connecting them.

use std::borrow::Cow;
use std::collections::HashMap;
use std::rc::Weak;

use super::arena::arena_id;
use crate::observable::{TargetId, TrackKey};
use crate::reactive::{Reactive, SubscriberId};

arena_id! {
    /// Identifier of a dep node.
    pub(crate) struct DepId;
}

arena_id! {
    /// Identifier of a link between a dep and a subscriber.
    pub(crate) struct LinkId;
}

/// Dirty state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum DirtyLevel {
    /// Nothing the subscriber read has changed since its last run.
    Clean,

    /// A computed the subscriber read was invalidated, but may still produce
    /// the same value. Resolved by refreshing those computeds.
    MaybeDirty,

    /// A direct dependency changed; the subscriber must re-run.
    Dirty,
}

/// What kind of subscriber a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriberKind {
    /// Side-effecting, eagerly re-run by the scheduler.
    Effect,

    /// Cached and lazily refreshed. Readers subscribe to `dep`.
    Computed { dep: DepId },
}

/// A subscriber set for one observable slot.
#[derive(Debug)]
pub(crate) struct DepNode {
    pub head: Option<LinkId>,
    pub tail: Option<LinkId>,
    pub len: usize,

    /// The computed whose readers this dep tracks, if any.
    pub owner: Option<SubscriberId>,

    /// Registry position for container deps, so the entry can be dropped
    /// once the last link goes away.
    pub origin: Option<(TargetId, TrackKey)>,
}

impl DepNode {
    pub fn new(owner: Option<SubscriberId>, origin: Option<(TargetId, TrackKey)>) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            owner,
            origin,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// An edge between one dep and one subscriber.
///
/// Each link sits in two doubly linked lists: the dep's subscribers and the
/// subscriber's dependencies.
#[derive(Debug)]
pub(crate) struct LinkNode {
    pub dep: DepId,
    pub sub: SubscriberId,

    /// Tracking generation of the subscriber run that last read `dep`.
    pub generation: u64,

    // neighbours in the dep's list of subscribers
    pub prev_sub: Option<LinkId>,
    pub next_sub: Option<LinkId>,
    // neighbours in the subscriber's list of deps
    pub prev_dep: Option<LinkId>,
    pub next_dep: Option<LinkId>,
}

/// A re-runnable computation.
pub(crate) struct SubscriberNode {
    pub kind: SubscriberKind,

    /// Creation order; the scheduler flushes in ascending order.
    pub order: u64,

    pub label: Option<Cow<'static, str>>,
    pub level: DirtyLevel,
    pub active: bool,

    /// Nesting depth of in-progress runs.
    pub running: u32,

    /// Waiting in the scheduler queue.
    pub queued: bool,

    /// Current tracking generation; bumped at the start of every run.
    pub generation: u64,

    pub head: Option<LinkId>,
    pub tail: Option<LinkId>,

    /// Dep to link lookup for idempotent tracking.
    pub index: HashMap<DepId, LinkId>,

    /// Handle used to run or refresh the subscriber outside the graph borrow.
    pub handle: Weak<dyn Reactive>,
}

impl SubscriberNode {
    pub fn new(
        kind: SubscriberKind,
        order: u64,
        label: Option<Cow<'static, str>>,
        handle: Weak<dyn Reactive>,
    ) -> Self {
        Self {
            kind,
            order,
            label,
            level: match kind {
                SubscriberKind::Effect => DirtyLevel::Clean,
                SubscriberKind::Computed { .. } => DirtyLevel::Dirty,
            },
            active: true,
            running: 0,
            queued: false,
            generation: 0,
            head: None,
            tail: None,
            index: HashMap::new(),
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    pub fn dependency_count(&self) -> usize {
        self.index.len()
    }
}

impl std::fmt::Debug for SubscriberNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberNode")
            .field("kind", &self.kind)
            .field("order", &self.order)
            .field("label", &self.label)
            .field("level", &self.level)
            .field("active", &self.active)
            .field("running", &self.running)
            .field("queued", &self.queued)
            .field("dependencies", &self.index.len())
            .finish()
    }
}
