//! Dependency Graph
//!
//! This module implements the graph that connects observable slots (deps)
//! with the computations reading them (subscribers).
//!
//! # Overview
//!
//! Every dep and subscriber lives in an arena. The edges are [`LinkNode`]s,
//! which also live in an arena and are threaded through two intrusive doubly
//! linked lists: one per dep (who reads me) and one per subscriber (what do I
//! read). Removing an edge is O(1) from either side.
//!
//! # Tracking generations
//!
//! Each subscriber run bumps the subscriber's generation. Reading a dep
//! stamps the link with the current generation, reusing a link left over
//! from the previous run when one exists. When the run finishes, every link
//! still carrying an older generation was not read this time and is removed.
//! This is how dependency sets grow and shrink across conditional branches.
//!
//! Nothing here is reference counted: removal is always explicit, performed
//! by per-run cleanup, by stopping a subscriber, or by disposing a dep.

pub(crate) mod arena;
mod node;
mod scheduler;

use smallvec::SmallVec;

use arena::Arena;
pub(crate) use node::{DepId, DepNode, LinkId, LinkNode, SubscriberNode};
pub(crate) use node::{DirtyLevel, SubscriberKind};
pub(crate) use scheduler::UpdateScheduler;

use crate::reactive::SubscriberId;

/// Subscribers of one dep, paired with the link that connects them.
pub(crate) type Readers = SmallVec<[(SubscriberId, LinkId); 8]>;

/// Arena storage for deps, subscribers and links.
#[derive(Default)]
pub(crate) struct Graph {
    pub deps: Arena<DepId, DepNode>,
    pub subscribers: Arena<SubscriberId, SubscriberNode>,
    pub links: Arena<LinkId, LinkNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dep(&mut self, node: DepNode) -> DepId {
        self.deps.insert(node)
    }

    pub fn add_subscriber(&mut self, node: SubscriberNode) -> SubscriberId {
        self.subscribers.insert(node)
    }

    pub fn link(&self, id: LinkId) -> &LinkNode {
        self.links.get(id).expect("dangling link id")
    }

    fn link_mut(&mut self, id: LinkId) -> &mut LinkNode {
        self.links.get_mut(id).expect("dangling link id")
    }

    /// Record that `sub` read `dep` during its current run.
    ///
    /// Returns `true` if a new link was created. Reading the same dep again
    /// within one run is a no-op.
    pub fn track(&mut self, sub: SubscriberId, dep: DepId) -> bool {
        if !self.deps.contains(dep) {
            return false;
        }
        let Some(node) = self.subscribers.get(sub) else {
            return false;
        };
        let generation = node.generation;

        if let Some(&existing) = node.index.get(&dep) {
            if self.link(existing).generation == generation {
                return false;
            }
            self.link_mut(existing).generation = generation;
            self.move_to_sub_tail(sub, existing);
            return false;
        }

        let id = self.links.insert(LinkNode {
            dep,
            sub,
            generation,
            prev_sub: None,
            next_sub: None,
            prev_dep: None,
            next_dep: None,
        });
        self.append_to_dep(dep, id);
        self.append_to_sub(sub, id);
        if let Some(node) = self.subscribers.get_mut(sub) {
            node.index.insert(dep, id);
        }
        true
    }

    /// Subscribers currently linked to `dep`, in link order.
    pub fn readers(&self, dep: DepId) -> Readers {
        let mut out = Readers::new();
        let mut cursor = self.deps.get(dep).and_then(|node| node.head);
        while let Some(id) = cursor {
            let link = self.link(id);
            out.push((link.sub, id));
            cursor = link.next_sub;
        }
        out
    }

    /// Deps `sub` currently reads, in the order they were last read.
    pub fn sources(&self, sub: SubscriberId) -> SmallVec<[DepId; 8]> {
        let mut out = SmallVec::new();
        let mut cursor = self.subscribers.get(sub).and_then(|node| node.head);
        while let Some(id) = cursor {
            let link = self.link(id);
            out.push(link.dep);
            cursor = link.next_dep;
        }
        out
    }

    /// Start a new run of `sub`: every existing link becomes stale.
    pub fn begin_run(&mut self, sub: SubscriberId) -> Option<u64> {
        let node = self.subscribers.get_mut(sub)?;
        node.generation += 1;
        Some(node.generation)
    }

    /// Finish a run of `sub`, removing links that were not read again.
    ///
    /// An inactive subscriber loses all of its links. Returns the deps that
    /// were left without any reader.
    pub fn finish_run(&mut self, sub: SubscriberId) -> SmallVec<[DepId; 4]> {
        let mut emptied = SmallVec::new();
        let Some(node) = self.subscribers.get(sub) else {
            return emptied;
        };
        let generation = node.generation;
        let keep_fresh = node.active;

        let mut cursor = node.head;
        while let Some(id) = cursor {
            let link = self.link(id);
            cursor = link.next_dep;
            if keep_fresh && link.generation == generation {
                continue;
            }
            if let Some(dep) = self.unlink(id) {
                emptied.push(dep);
            }
        }
        emptied
    }

    /// Remove every link of `sub`. Returns deps left without readers.
    pub fn clear_subscriber(&mut self, sub: SubscriberId) -> SmallVec<[DepId; 4]> {
        let mut emptied = SmallVec::new();
        let mut cursor = self.subscribers.get(sub).and_then(|node| node.head);
        while let Some(id) = cursor {
            cursor = self.link(id).next_dep;
            if let Some(dep) = self.unlink(id) {
                emptied.push(dep);
            }
        }
        emptied
    }

    /// Remove every link of `dep` and free the dep itself.
    pub fn remove_dep(&mut self, dep: DepId) -> Option<DepNode> {
        let mut cursor = self.deps.get(dep)?.head;
        while let Some(id) = cursor {
            cursor = self.link(id).next_sub;
            self.unlink(id);
        }
        self.deps.remove(dep)
    }

    /// Detach a link from both lists and free it.
    ///
    /// Returns the dep if it has no readers left.
    pub fn unlink(&mut self, id: LinkId) -> Option<DepId> {
        let link = self.links.remove(id)?;

        match link.prev_sub {
            Some(prev) => self.link_mut(prev).next_sub = link.next_sub,
            None => {
                if let Some(dep) = self.deps.get_mut(link.dep) {
                    dep.head = link.next_sub;
                }
            }
        }
        match link.next_sub {
            Some(next) => self.link_mut(next).prev_sub = link.prev_sub,
            None => {
                if let Some(dep) = self.deps.get_mut(link.dep) {
                    dep.tail = link.prev_sub;
                }
            }
        }

        match link.prev_dep {
            Some(prev) => self.link_mut(prev).next_dep = link.next_dep,
            None => {
                if let Some(sub) = self.subscribers.get_mut(link.sub) {
                    sub.head = link.next_dep;
                }
            }
        }
        match link.next_dep {
            Some(next) => self.link_mut(next).prev_dep = link.prev_dep,
            None => {
                if let Some(sub) = self.subscribers.get_mut(link.sub) {
                    sub.tail = link.prev_dep;
                }
            }
        }

        if let Some(sub) = self.subscribers.get_mut(link.sub) {
            sub.index.remove(&link.dep);
        }
        let dep = self.deps.get_mut(link.dep)?;
        dep.len -= 1;
        dep.is_empty().then_some(link.dep)
    }

    fn append_to_dep(&mut self, dep: DepId, id: LinkId) {
        let Some(node) = self.deps.get_mut(dep) else {
            return;
        };
        let prev = node.tail;
        node.tail = Some(id);
        if node.head.is_none() {
            node.head = Some(id);
        }
        node.len += 1;
        if let Some(prev) = prev {
            self.link_mut(prev).next_sub = Some(id);
        }
        self.link_mut(id).prev_sub = prev;
    }

    fn append_to_sub(&mut self, sub: SubscriberId, id: LinkId) {
        let Some(node) = self.subscribers.get_mut(sub) else {
            return;
        };
        let prev = node.tail;
        node.tail = Some(id);
        if node.head.is_none() {
            node.head = Some(id);
        }
        if let Some(prev) = prev {
            self.link_mut(prev).next_dep = Some(id);
        }
        self.link_mut(id).prev_dep = prev;
    }

    fn move_to_sub_tail(&mut self, sub: SubscriberId, id: LinkId) {
        let (prev, next) = {
            let link = self.link(id);
            (link.prev_dep, link.next_dep)
        };
        let Some(next) = next else {
            // already the tail
            return;
        };

        self.link_mut(next).prev_dep = prev;
        match prev {
            Some(prev) => self.link_mut(prev).next_dep = Some(next),
            None => {
                if let Some(node) = self.subscribers.get_mut(sub) {
                    node.head = Some(next);
                }
            }
        }

        let link = self.link_mut(id);
        link.prev_dep = None;
        link.next_dep = None;
        self.append_to_sub(sub, id);
    }
}
