//! The local pending queue: a FIFO of not-yet-acknowledged local edits.
//!
//! Implemented as a vector with a head index rather than a linked
//! structure; depth stays small by construction because only one
//! operation is ever in flight at a time. Consumed slots are compacted
//! away once the head has moved far enough.

use alloc::vec::Vec;

use crate::op::Operation;

/// FIFO buffer of local operations queued behind the in-flight one.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    ops: Vec<Operation>,
    head: usize,
}

/// Compact once this many consumed slots have accumulated at the front.
const COMPACT_THRESHOLD: usize = 32;

impl PendingQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len() - self.head
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.head == self.ops.len()
    }

    /// Append an operation at the back.
    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    /// Remove and return the oldest queued operation.
    pub fn pop_front(&mut self) -> Option<Operation> {
        if self.is_empty() {
            return None;
        }
        let op = self.ops[self.head].clone();
        self.head += 1;
        if self.head >= COMPACT_THRESHOLD {
            self.ops.drain(..self.head);
            self.head = 0;
        }
        Some(op)
    }

    /// The oldest queued operation, if any.
    pub fn front(&self) -> Option<&Operation> {
        self.ops.get(self.head)
    }

    /// Iterate the queued operations in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops[self.head..].iter()
    }

    /// Iterate the queued operations mutably in emission order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Operation> {
        self.ops[self.head..].iter_mut()
    }

    /// Drop all queued operations.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.head = 0;
    }
}
