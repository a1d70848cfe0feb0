//! # ot-kit
//!
//! An operational-transformation (OT) engine for real-time collaborative
//! plain-text editing.
//!
//! OT lets multiple participants edit the same document concurrently,
//! without a central lock, and still converge on one identical result
//! regardless of delivery order. Each edit is an immutable [`Operation`];
//! concurrent operations are reconciled pairwise by [`transform`], applied
//! to immutable [`Document`] snapshots, and sequenced per document by a
//! [`Coordinator`] that keeps exactly one local operation in flight.
//!
//! ## `no_std` Support
//!
//! This crate supports `no_std` environments with the `alloc` crate.
//! Disable the default `std` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ot-kit = { version = "0.1", default-features = false }
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use ot_kit::prelude::*;
//!
//! // Two participants edit "hello" concurrently against revision 0.
//! let doc = Document::from_text("hello");
//! let a = Operation::insert("alice", 0, 5, " world");
//! let b = Operation::insert("bob", 0, 0, "say ");
//!
//! // Reconcile the pair, then apply in either order.
//! let (a2, b2) = transform(&a, &b);
//!
//! let via_a = doc.apply(&a).unwrap().apply(&b2).unwrap();
//! let via_b = doc.apply(&b).unwrap().apply(&a2).unwrap();
//!
//! assert_eq!(via_a.text(), "say hello world");
//! assert_eq!(via_a.text(), via_b.text());
//! ```
//!
//! ## Components
//!
//! - [`Edit`] / [`Operation`] - the closed operation model
//!   (Insert/Delete/Replace plus causal metadata)
//! - [`transform`] - the pure pairwise conflict resolver
//! - [`Document`] - snapshots and the pure apply engine
//! - [`Coordinator`] - the per-document synchronization state machine
//!
//! ## Guarantees
//!
//! For any two operations issued against the same revision and
//! addressing positions within the document, `transform` satisfies:
//! - **Convergence:** applying `a` then `b'` equals applying `b` then `a'`
//! - **Symmetry:** `transform(a, b)` mirrors `transform(b, a)`
//! - **Identity:** transforming against a no-op changes nothing
//!
//! A replace disturbed by a concurrent operation degrades to a no-op;
//! see [`transform`] for the exact contract around degraded replaces.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod document;
mod op;
mod queue;
mod sync;
mod transform;

pub mod prelude;

pub use document::{Conflict, Document};
pub use op::{Edit, InvalidOperation, Operation};
pub use queue::PendingQueue;
pub use sync::{Coordinator, SubmitError, SyncError, SyncEvents, SyncState};
pub use transform::transform;
