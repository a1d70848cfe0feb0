//! The synchronization coordinator: one per shared document.
//!
//! The coordinator reconciles the local edit stream with remote
//! operations against a monotonic revision counter. It keeps exactly one
//! local operation in flight at a time with further edits buffered behind
//! it, which bounds the transform work per remote operation to one pass
//! over the queue (linear, not quadratic, in queue depth).
//!
//! Two snapshots are maintained: the *authoritative* document (everything
//! acknowledged or received from collaborators) and the *optimistic*
//! buffer (the authoritative document with the in-flight and pending
//! local operations replayed on top). Local edits always apply to the
//! optimistic buffer immediately; the coordinator never blocks on the
//! network.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::document::{Conflict, Document};
use crate::op::{Edit, InvalidOperation, Operation};
use crate::queue::PendingQueue;
use crate::transform::transform;

/// Where the coordinator stands with respect to its local edit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No unacknowledged local operation.
    Idle,
    /// Exactly one local operation is in flight.
    AwaitingAck,
    /// An operation is in flight and further local edits are queued.
    Buffering,
}

/// Callback seam through which the coordinator notifies its collaborators
/// (display layer, transport glue).
///
/// All methods default to no-ops; `()` implements the trait for callers
/// that do not care.
pub trait SyncEvents {
    /// The visible (optimistic) buffer changed.
    fn buffer_changed(&mut self, doc: &Document) {
        let _ = doc;
    }

    /// A local operation was dropped because a concurrent operation
    /// invalidated its assumption; the edit should be re-derived from the
    /// current text if still wanted.
    fn operation_dropped(&mut self, op: &Operation) {
        let _ = op;
    }
}

impl SyncEvents for () {}

/// Fatal sequencing failures; the session must be resynchronized via
/// [`Coordinator::resync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// An operation or acknowledgment referenced a revision that cannot
    /// be reconciled with the coordinator's own. Only possible when the
    /// transport violates its per-sender ordering guarantee.
    SequencingViolation {
        /// The revision the coordinator expected.
        expected: u64,
        /// The revision actually referenced.
        received: u64,
    },
    /// An acknowledgment arrived with no operation in flight.
    StrayAck {
        /// The acknowledged revision.
        received: u64,
    },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SequencingViolation { expected, received } => write!(
                f,
                "sequencing violation: expected revision {expected}, received {received}"
            ),
            Self::StrayAck { received } => {
                write!(f, "acknowledgment for revision {received} with nothing in flight")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SyncError {}

/// Why [`Coordinator::submit_local_edit`] did not accept an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The edit was malformed (see [`InvalidOperation`]).
    Invalid(InvalidOperation),
    /// A replace's assumption did not hold against the current buffer;
    /// re-derive the edit from the current text.
    Conflict(Conflict),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "invalid edit: {e}"),
            Self::Conflict(c) => write!(f, "rejected edit: {c}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SubmitError {}

/// Per-document synchronization state machine.
///
/// One coordinator owns one shared document. Its transitions must be
/// serialized by a single logical actor (an owning thread, a mailbox, or
/// a mutex); different documents are fully independent.
///
/// # Example
///
/// ```
/// use ot_kit::{Coordinator, Edit, SyncState};
///
/// let mut local = Coordinator::new("alice", ());
///
/// // A local edit applies optimistically and goes out immediately.
/// let sent = local
///     .submit_local_edit(Edit::Insert { position: 0, content: "hi".into() })
///     .unwrap()
///     .expect("idle coordinator sends immediately");
/// assert_eq!(sent.base_revision(), 0);
/// assert_eq!(local.text(), "hi");
/// assert_eq!(local.state(), SyncState::AwaitingAck);
///
/// // The acknowledgment advances the revision.
/// assert_eq!(local.on_ack(1).unwrap(), None);
/// assert_eq!(local.state(), SyncState::Idle);
/// assert_eq!(local.revision(), 1);
/// ```
#[derive(Debug)]
pub struct Coordinator<S: SyncEvents> {
    site: String,
    /// Authoritative snapshot: acknowledged and remote operations only.
    base: Document,
    /// Optimistic snapshot: `base` plus in-flight and pending operations.
    buffer: Document,
    in_flight: Option<Operation>,
    pending: PendingQueue,
    events: S,
}

impl<S: SyncEvents> Coordinator<S> {
    /// A coordinator for an empty document at revision zero.
    pub fn new(site: impl Into<String>, events: S) -> Self {
        Self::with_document(site, Document::new(), events)
    }

    /// A coordinator joining at an existing authoritative snapshot.
    pub fn with_document(site: impl Into<String>, doc: Document, events: S) -> Self {
        Self {
            site: site.into(),
            buffer: doc.clone(),
            base: doc,
            in_flight: None,
            pending: PendingQueue::new(),
            events,
        }
    }

    /// This participant's stable site identifier.
    pub fn site(&self) -> &str {
        &self.site
    }

    /// The revision of the last authoritatively absorbed operation.
    pub fn revision(&self) -> u64 {
        self.base.revision()
    }

    /// The optimistic buffer: what this participant currently sees.
    pub fn buffer(&self) -> &Document {
        &self.buffer
    }

    /// The visible text.
    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    /// Current position in the local edit lifecycle.
    pub fn state(&self) -> SyncState {
        match (&self.in_flight, self.pending.is_empty()) {
            (None, _) => SyncState::Idle,
            (Some(_), true) => SyncState::AwaitingAck,
            (Some(_), false) => SyncState::Buffering,
        }
    }

    /// The event sink.
    pub fn events(&self) -> &S {
        &self.events
    }

    /// Accept a local edit.
    ///
    /// The edit is tagged with the coordinator's known revision and
    /// applied to the optimistic buffer immediately. If nothing is in
    /// flight the resulting operation is returned for sending; otherwise
    /// it is queued behind the in-flight one and `None` is returned (it
    /// will come back out of [`on_ack`](Self::on_ack) later).
    pub fn submit_local_edit(&mut self, edit: Edit) -> Result<Option<Operation>, SubmitError> {
        let op = Operation::from_edit(edit, self.site.clone(), self.base.revision())
            .map_err(SubmitError::Invalid)?;
        self.buffer = self.buffer.apply(&op).map_err(SubmitError::Conflict)?;
        self.events.buffer_changed(&self.buffer);

        if self.in_flight.is_none() {
            debug_assert!(self.pending.is_empty(), "queued edits with nothing in flight");
            self.in_flight = Some(op.clone());
            Ok(Some(op))
        } else {
            self.pending.push(op);
            Ok(None)
        }
    }

    /// Absorb an operation from a collaborator.
    ///
    /// The operation must reference exactly the coordinator's current
    /// revision; no history is kept, so anything else cannot be
    /// reconciled and is a fatal [`SyncError::SequencingViolation`].
    ///
    /// The operation is transformed, in emission order, against the
    /// in-flight and every pending local operation to obtain a version
    /// valid against the optimistic buffer, and the local operations are
    /// updated with their counterparts. A local replace invalidated by
    /// the remote operation degrades to a no-op and is reported through
    /// [`SyncEvents::operation_dropped`]. The in-flight/buffering state
    /// does not change.
    ///
    /// A remote replace whose assumption no longer holds against the
    /// authoritative snapshot is dropped: the revision advances, but the
    /// text and the outstanding local operations are left as they are.
    pub fn on_remote_operation(&mut self, op: Operation) -> Result<(), SyncError> {
        if op.base_revision() != self.base.revision() {
            return Err(SyncError::SequencingViolation {
                expected: self.base.revision(),
                received: op.base_revision(),
            });
        }

        // Absorb into the authoritative snapshot. A remote replace whose
        // assumption no longer holds is dropped; the revision still
        // advances because the operation has been absorbed, but the text
        // is unchanged and the outstanding local operations keep their
        // positions.
        match self.base.apply(&op) {
            Ok(doc) => self.base = doc,
            Err(conflict) => {
                log::warn!("dropping remote operation from {}: {conflict}", op.origin_site());
                self.base = self.base.tick();
                return Ok(());
            }
        }

        // Push the remote operation through the local queue, updating
        // both sides as we go.
        let mut remote = op;
        let mut dropped: Vec<Operation> = Vec::new();
        if let Some(local) = self.in_flight.take() {
            let (local, r) = Self::transform_local(local, &remote, &mut dropped);
            self.in_flight = Some(local);
            remote = r;
        }
        for slot in self.pending.iter_mut() {
            let (local, r) = Self::transform_local(slot.clone(), &remote, &mut dropped);
            *slot = local;
            remote = r;
        }

        let before = self.buffer.text().to_string();
        self.buffer = self.replay();
        for op in &dropped {
            self.events.operation_dropped(op);
        }
        if self.buffer.text() != before {
            self.events.buffer_changed(&self.buffer);
        }
        Ok(())
    }

    /// Process the acknowledgment of the in-flight operation.
    ///
    /// `revision` must be exactly one past the coordinator's own. The
    /// acknowledged operation is folded into the authoritative snapshot;
    /// if further edits are buffered the next one is released, retagged
    /// with the new revision, and returned for sending.
    pub fn on_ack(&mut self, revision: u64) -> Result<Option<Operation>, SyncError> {
        let Some(acked) = self.in_flight.take() else {
            return Err(SyncError::StrayAck { received: revision });
        };
        if revision != self.base.revision() + 1 {
            self.in_flight = Some(acked);
            return Err(SyncError::SequencingViolation {
                expected: self.base.revision() + 1,
                received: revision,
            });
        }

        self.base = match self.base.apply(&acked) {
            Ok(doc) => doc,
            Err(conflict) => {
                log::warn!("acknowledged operation no longer applies: {conflict}");
                self.base.tick()
            }
        };

        // Pending operations are already expressed against the state the
        // acknowledgment confirms (they were issued on top of the
        // in-flight operation and have been transformed against every
        // absorbed remote operation), so releasing one is a retag.
        match self.pending.pop_front() {
            Some(next) => {
                let next = next.with_base_revision(self.base.revision());
                self.in_flight = Some(next.clone());
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// The in-flight operation, for resending after an acknowledgment
    /// timeout.
    ///
    /// Operations are idempotent once tagged with a fixed revision and
    /// origin, so the same operation is resent unchanged; the coordinator
    /// never synthesizes a new operation to retry.
    pub fn resend(&self) -> Option<&Operation> {
        self.in_flight.as_ref()
    }

    /// Full resynchronization: replace the local state with a fresh
    /// authoritative copy, discarding the in-flight and pending
    /// operations. Required after a [`SyncError`].
    pub fn resync(&mut self, text: impl Into<String>, revision: u64) {
        self.base = Document::restore(text, revision);
        self.buffer = self.base.clone();
        self.in_flight = None;
        self.pending.clear();
        self.events.buffer_changed(&self.buffer);
    }

    /// Transform one local operation against an incoming remote one,
    /// recording a degraded local replace for notification.
    fn transform_local(
        local: Operation,
        remote: &Operation,
        dropped: &mut Vec<Operation>,
    ) -> (Operation, Operation) {
        let was_replace = matches!(local.edit(), Edit::Replace { .. });
        let (local2, remote2) = transform(&local, remote);
        if was_replace && local2.is_noop() {
            dropped.push(local);
        }
        (local2, remote2)
    }

    /// Rebuild the optimistic buffer from the authoritative snapshot plus
    /// the local operations still outstanding. An outstanding operation
    /// that no longer applies contributes nothing.
    fn replay(&self) -> Document {
        let mut doc = self.base.clone();
        for op in self.in_flight.iter().chain(self.pending.iter()) {
            doc = match doc.apply(op) {
                Ok(next) => next,
                Err(conflict) => {
                    log::warn!("skipping outstanding local operation in replay: {conflict}");
                    doc.tick()
                }
            };
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(position: usize, content: &str) -> Edit {
        Edit::Insert {
            position,
            content: content.into(),
        }
    }

    fn delete(position: usize, length: usize) -> Edit {
        Edit::Delete { position, length }
    }

    #[derive(Default)]
    struct Recorder {
        buffers: Vec<String>,
        dropped: Vec<Operation>,
    }

    impl SyncEvents for Recorder {
        fn buffer_changed(&mut self, doc: &Document) {
            self.buffers.push(doc.text().to_string());
        }

        fn operation_dropped(&mut self, op: &Operation) {
            self.dropped.push(op.clone());
        }
    }

    #[test]
    fn idle_edit_is_sent_immediately() {
        let mut c = Coordinator::new("alice", ());
        let sent = c.submit_local_edit(insert(0, "hi")).unwrap();
        let sent = sent.expect("should send while idle");
        assert_eq!(sent.origin_site(), "alice");
        assert_eq!(sent.base_revision(), 0);
        assert_eq!(c.text(), "hi");
        assert_eq!(c.state(), SyncState::AwaitingAck);
    }

    #[test]
    fn further_edits_buffer_behind_the_in_flight_one() {
        let mut c = Coordinator::new("alice", ());
        c.submit_local_edit(insert(0, "a")).unwrap();
        assert_eq!(c.submit_local_edit(insert(1, "b")).unwrap(), None);
        assert_eq!(c.submit_local_edit(insert(2, "c")).unwrap(), None);
        assert_eq!(c.state(), SyncState::Buffering);
        assert_eq!(c.text(), "abc");
        // Optimistic application is immediate; the network saw one op.
        assert_eq!(c.revision(), 0);
    }

    #[test]
    fn ack_releases_the_next_queued_operation_retagged() {
        let mut c = Coordinator::new("alice", ());
        c.submit_local_edit(insert(0, "a")).unwrap();
        c.submit_local_edit(insert(1, "b")).unwrap();

        let released = c.on_ack(1).unwrap().expect("queued op should be released");
        assert_eq!(released.edit(), &insert(1, "b"));
        assert_eq!(released.base_revision(), 1);
        assert_eq!(c.state(), SyncState::AwaitingAck);
        assert_eq!(c.revision(), 1);

        assert_eq!(c.on_ack(2).unwrap(), None);
        assert_eq!(c.state(), SyncState::Idle);
        assert_eq!(c.text(), "ab");
        assert_eq!(c.revision(), 2);
    }

    #[test]
    fn remote_operation_transforms_against_outstanding_locals() {
        let mut c = Coordinator::new("alice", ());
        c.submit_local_edit(insert(0, "abc")).unwrap();

        // Bob concurrently inserted at the same revision; "alice" < "bob"
        // so the local insert keeps the earlier slot.
        c.on_remote_operation(Operation::insert("bob", 0, 0, "zz"))
            .unwrap();
        assert_eq!(c.text(), "abczz");
        assert_eq!(c.revision(), 1);
        assert_eq!(c.state(), SyncState::AwaitingAck);

        // The server sequences bob first, then acknowledges our insert.
        assert_eq!(c.on_ack(2).unwrap(), None);
        assert_eq!(c.text(), "abczz");
        assert_eq!(c.revision(), 2);
    }

    #[test]
    fn remote_operation_with_wrong_revision_is_fatal() {
        let mut c = Coordinator::new("alice", ());
        let err = c
            .on_remote_operation(Operation::insert("bob", 3, 0, "x"))
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::SequencingViolation {
                expected: 0,
                received: 3
            }
        );
    }

    #[test]
    fn stray_ack_is_an_error() {
        let mut c = Coordinator::new("alice", ());
        assert_eq!(c.on_ack(1).unwrap_err(), SyncError::StrayAck { received: 1 });
    }

    #[test]
    fn ack_with_wrong_revision_is_a_sequencing_violation() {
        let mut c = Coordinator::new("alice", ());
        c.submit_local_edit(insert(0, "a")).unwrap();
        let err = c.on_ack(5).unwrap_err();
        assert_eq!(
            err,
            SyncError::SequencingViolation {
                expected: 1,
                received: 5
            }
        );
    }

    #[test]
    fn resend_returns_the_in_flight_operation_unchanged() {
        let mut c = Coordinator::new("alice", ());
        let sent = c.submit_local_edit(insert(0, "a")).unwrap().unwrap();
        assert_eq!(c.resend(), Some(&sent));
        c.on_ack(1).unwrap();
        assert_eq!(c.resend(), None);
    }

    #[test]
    fn resync_discards_outstanding_state() {
        let mut c = Coordinator::new("alice", ());
        c.submit_local_edit(insert(0, "local")).unwrap();
        c.submit_local_edit(insert(5, "!")).unwrap();

        c.resync("authoritative", 9);
        assert_eq!(c.text(), "authoritative");
        assert_eq!(c.revision(), 9);
        assert_eq!(c.state(), SyncState::Idle);
        assert_eq!(c.resend(), None);
    }

    #[test]
    fn buffer_change_notifications_fire() {
        let mut c = Coordinator::new("alice", Recorder::default());
        c.submit_local_edit(insert(0, "a")).unwrap();
        c.on_remote_operation(Operation::insert("bob", 0, 0, "b"))
            .unwrap();
        assert_eq!(c.events().buffers, ["a", "ab"]);
    }

    #[test]
    fn remote_delete_invalidates_pending_replace() {
        let mut c = Coordinator::with_document("alice", Document::from_text("abc"), Recorder::default());
        c.submit_local_edit(Edit::Replace {
            position: 0,
            old_content: "abc".into(),
            new_content: "xyz".into(),
        })
        .unwrap();
        assert_eq!(c.text(), "xyz");

        // Bob deleted the very text the replace assumed.
        c.on_remote_operation(Operation::delete("bob", 0, 0, 3))
            .unwrap();
        assert_eq!(c.text(), "");
        assert_eq!(c.events().dropped.len(), 1);
        assert!(matches!(
            c.events().dropped[0].edit(),
            Edit::Replace { .. }
        ));
        // The degraded operation is still in flight as a no-op and its
        // acknowledgment still sequences normally.
        assert_eq!(c.state(), SyncState::AwaitingAck);
        assert_eq!(c.on_ack(2).unwrap(), None);
        assert_eq!(c.text(), "");
    }

    #[test]
    fn conflicting_remote_replace_advances_revision_without_moving_locals() {
        let mut c =
            Coordinator::with_document("alice", Document::from_text("abc"), Recorder::default());
        c.submit_local_edit(insert(3, "!")).unwrap();
        assert_eq!(c.text(), "abc!");

        // The remote replace assumes text this document never had; it is
        // dropped, so the local insert must not shift.
        let bad = Operation::replace("bob", 0, 0, "xyz", "q").unwrap();
        c.on_remote_operation(bad).unwrap();

        assert_eq!(c.revision(), 1);
        assert_eq!(c.text(), "abc!");
        assert!(c.events().dropped.is_empty());
        assert_eq!(c.events().buffers, ["abc!"]);
        assert_eq!(c.resend().map(|op| op.edit().position()), Some(3));

        assert_eq!(c.on_ack(2).unwrap(), None);
        assert_eq!(c.text(), "abc!");
    }

    #[test]
    fn local_replace_conflict_is_rejected_up_front() {
        let mut c = Coordinator::with_document("alice", Document::from_text("abc"), ());
        let err = c
            .submit_local_edit(Edit::Replace {
                position: 0,
                old_content: "zzz".into(),
                new_content: "x".into(),
            })
            .unwrap_err();
        assert!(matches!(err, SubmitError::Conflict(_)));
        assert_eq!(c.text(), "abc");
        assert_eq!(c.state(), SyncState::Idle);
    }

    #[test]
    fn invalid_edit_is_rejected_before_entering_the_system() {
        let mut c = Coordinator::new("alice", ());
        let err = c
            .submit_local_edit(Edit::Replace {
                position: 0,
                old_content: String::new(),
                new_content: "x".into(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            SubmitError::Invalid(InvalidOperation::EmptyReplaceTarget)
        );
    }

    #[test]
    fn remote_operations_interleave_with_buffered_edits() {
        let mut c = Coordinator::new("alice", ());
        c.submit_local_edit(insert(0, "a")).unwrap();
        c.submit_local_edit(insert(1, "b")).unwrap();

        // Bob appends concurrently. "alice" < "bob" keeps local text first.
        c.on_remote_operation(Operation::insert("bob", 0, 0, "Z"))
            .unwrap();
        assert_eq!(c.text(), "abZ");

        let released = c.on_ack(2).unwrap().unwrap();
        assert_eq!(released.base_revision(), 2);
        c.on_ack(3).unwrap();
        assert_eq!(c.text(), "abZ");
        assert_eq!(c.state(), SyncState::Idle);
    }
}
