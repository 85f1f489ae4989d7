/*!
Deferred work: initialization queues and per-element mutation stacks.

Nothing here touches the engine. Creation and mutation calls only record *that* work is due;
the pulse drains everything in a fixed order under the world lock:

1. static collision init
2. rigid body init
3. constraint init
4. activation
5. AABB update
6. apply changes
7. update

Stacks hold [`ElementRef`]s, not owning handles. A destroyed element is simply not found in its
registry when its entry is popped. Pushing an element that is already pending is a no-op, so any
number of script writes between two pulses collapse into one pass.
*/

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::element::ElementRef;

#[derive(Default)]
struct StackInner {
    order: VecDeque<ElementRef>,
    pending: HashSet<ElementRef>,
}

/// A deduplicating FIFO of element references.
pub struct WorkStack {
    name: &'static str,
    inner: Mutex<StackInner>,
}

impl WorkStack {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(StackInner::default()),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `false` if `item` was already pending.
    pub fn push(&self, item: ElementRef) -> bool {
        let mut inner = self.inner.lock();
        if !inner.pending.insert(item) {
            return false;
        }
        inner.order.push_back(item);
        true
    }

    /// Pop one item. The lock is released before the caller processes it, so processing may
    /// push again (including the same item).
    pub fn pop(&self) -> Option<ElementRef> {
        let mut inner = self.inner.lock();
        let item = inner.order.pop_front()?;
        inner.pending.remove(&item);
        Some(item)
    }

    pub fn contains(&self, item: &ElementRef) -> bool {
        self.inner.lock().pending.contains(item)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.pending.clear();
    }
}

/// The four mutation stacks of one world. Shared (via `Arc`) with every element the world
/// creates so setters can enqueue without reaching back into the world.
pub struct WorkQueues {
    /// Bodies to wake up.
    pub activation: WorkStack,
    /// Bodies whose collider geometry must be rebuilt from their shape.
    pub aabb_update: WorkStack,
    /// Bodies and statics with pending pose/velocity/force/filter/material writes.
    pub changes: WorkStack,
    /// Bodies needing a mass-property recompute; statics needing a geometry rebuild.
    pub updates: WorkStack,
}

impl Default for WorkQueues {
    fn default() -> Self {
        Self {
            activation: WorkStack::new("activation"),
            aabb_update: WorkStack::new("aabb-update"),
            changes: WorkStack::new("changes"),
            updates: WorkStack::new("updates"),
        }
    }
}

impl WorkQueues {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stacks in drain order.
    pub fn in_drain_order(&self) -> [&WorkStack; 4] {
        [
            &self.activation,
            &self.aabb_update,
            &self.changes,
            &self.updates,
        ]
    }

    pub fn clear(&self) {
        for stack in self.in_drain_order() {
            stack.clear();
        }
    }
}

/// Which recorded script writes an element still has to push into the engine.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct ChangeFlags(u16);

impl ChangeFlags {
    pub const POSE: ChangeFlags = ChangeFlags(1 << 0);
    pub const LINEAR_VELOCITY: ChangeFlags = ChangeFlags(1 << 1);
    pub const ANGULAR_VELOCITY: ChangeFlags = ChangeFlags(1 << 2);
    pub const DAMPING: ChangeFlags = ChangeFlags(1 << 3);
    pub const MATERIAL: ChangeFlags = ChangeFlags(1 << 4);
    pub const FILTER: ChangeFlags = ChangeFlags(1 << 5);
    pub const FORCES: ChangeFlags = ChangeFlags(1 << 6);
    pub const MASS: ChangeFlags = ChangeFlags(1 << 7);

    #[inline]
    pub fn insert(&mut self, other: ChangeFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: ChangeFlags) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn contains(self, other: ChangeFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Return the current flags and reset to empty.
    #[inline]
    pub fn take(&mut self) -> ChangeFlags {
        std::mem::take(self)
    }
}

/// Ordered queue of freshly created elements awaiting registration into the engine.
pub struct InitQueue<T> {
    items: Mutex<VecDeque<Arc<T>>>,
}

impl<T> Default for InitQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> InitQueue<T> {
    pub fn push(&self, item: Arc<T>) {
        self.items.lock().push_back(item);
    }

    pub fn pop(&self) -> Option<Arc<T>> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}
