//! The operation model: immutable edit intents plus causal metadata.
//!
//! An [`Edit`] describes what a participant did to the text. An
//! [`Operation`] wraps an edit with the metadata needed for conflict
//! resolution: the originating site (used only for deterministic
//! tie-breaking) and the document revision the edit was issued against.
//! `Operation` is also the envelope exchanged with collaborators; with the
//! `serde` feature its wire shape is a flat record tagged by `type`.

use alloc::string::String;
use core::fmt;

/// A single edit intent on a text document.
///
/// This is a closed set: `transform` and `apply` match exhaustively on it,
/// so adding a new edit kind is a compile-time-checked change.
///
/// Positions and lengths are measured in characters, not bytes. An
/// `Insert` with empty content and a `Delete` with zero length are valid
/// no-ops; they arise naturally as transform outputs and act as transform
/// identities.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all_fields = "camelCase"))]
pub enum Edit {
    /// Insert `content` at `position`.
    Insert {
        /// Character index the content is inserted at.
        position: usize,
        /// The text to insert.
        content: String,
    },
    /// Delete `length` characters starting at `position`.
    Delete {
        /// Character index the deletion starts at.
        position: usize,
        /// Number of characters to delete.
        length: usize,
    },
    /// Replace `old_content` at `position` with `new_content`.
    ///
    /// A replace encodes an assumption about the current document state:
    /// at apply time the addressed slice must equal `old_content` exactly,
    /// or the apply is rejected as a [`Conflict`](crate::Conflict).
    Replace {
        /// Character index the replaced slice starts at.
        position: usize,
        /// The text assumed to be at `position`. Must be non-empty.
        old_content: String,
        /// The text that takes its place.
        new_content: String,
    },
}

impl Edit {
    /// The character index this edit acts at.
    pub fn position(&self) -> usize {
        match self {
            Edit::Insert { position, .. }
            | Edit::Delete { position, .. }
            | Edit::Replace { position, .. } => *position,
        }
    }

    /// Whether this edit leaves any document unchanged.
    ///
    /// A `Replace` is never a no-op: even when `old_content` equals
    /// `new_content` it still asserts what the document contains.
    pub fn is_noop(&self) -> bool {
        match self {
            Edit::Insert { content, .. } => content.is_empty(),
            Edit::Delete { length, .. } => *length == 0,
            Edit::Replace { .. } => false,
        }
    }
}

/// An [`Edit`] tagged with its origin site and base revision.
///
/// Operations are immutable and identified by origin: two operations are
/// "the same" when they share a site and emission order, never by content
/// equality. The site participates only in deterministic tie-breaking
/// during [`transform`](crate::transform); the base revision is the
/// document revision the edit was issued against and is what the
/// synchronization coordinator sequences on.
///
/// # Example
///
/// ```
/// use ot_kit::Operation;
///
/// let op = Operation::insert("alice", 3, 0, "hi");
/// assert_eq!(op.origin_site(), "alice");
/// assert_eq!(op.base_revision(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Operation {
    #[cfg_attr(feature = "serde", serde(flatten))]
    edit: Edit,
    origin_site: String,
    base_revision: u64,
}

impl Operation {
    /// Create an insert operation.
    pub fn insert(
        site: impl Into<String>,
        base_revision: u64,
        position: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            edit: Edit::Insert {
                position,
                content: content.into(),
            },
            origin_site: site.into(),
            base_revision,
        }
    }

    /// Create a delete operation.
    pub fn delete(
        site: impl Into<String>,
        base_revision: u64,
        position: usize,
        length: usize,
    ) -> Self {
        Self {
            edit: Edit::Delete { position, length },
            origin_site: site.into(),
            base_revision,
        }
    }

    /// Create a replace operation.
    ///
    /// Fails with [`InvalidOperation`] if `old_content` is empty: a
    /// replace must assert something about the current document.
    ///
    /// # Example
    ///
    /// ```
    /// use ot_kit::Operation;
    ///
    /// assert!(Operation::replace("alice", 0, 0, "abc", "xyz").is_ok());
    /// assert!(Operation::replace("alice", 0, 0, "", "xyz").is_err());
    /// ```
    pub fn replace(
        site: impl Into<String>,
        base_revision: u64,
        position: usize,
        old_content: impl Into<String>,
        new_content: impl Into<String>,
    ) -> Result<Self, InvalidOperation> {
        Self::from_edit(
            Edit::Replace {
                position,
                old_content: old_content.into(),
                new_content: new_content.into(),
            },
            site,
            base_revision,
        )
    }

    /// Wrap an [`Edit`] (for example one decoded from the wire) into an
    /// operation, validating it.
    pub fn from_edit(
        edit: Edit,
        site: impl Into<String>,
        base_revision: u64,
    ) -> Result<Self, InvalidOperation> {
        if let Edit::Replace { old_content, .. } = &edit {
            if old_content.is_empty() {
                return Err(InvalidOperation::EmptyReplaceTarget);
            }
        }
        Ok(Self {
            edit,
            origin_site: site.into(),
            base_revision,
        })
    }

    /// The edit this operation performs.
    pub fn edit(&self) -> &Edit {
        &self.edit
    }

    /// The stable identifier of the participant that issued the operation.
    pub fn origin_site(&self) -> &str {
        &self.origin_site
    }

    /// The document revision the operation was issued against.
    pub fn base_revision(&self) -> u64 {
        self.base_revision
    }

    /// Whether the operation's edit leaves any document unchanged.
    pub fn is_noop(&self) -> bool {
        self.edit.is_noop()
    }

    /// A copy of this operation retagged with a different base revision.
    ///
    /// Used by the coordinator when releasing a queued operation: the edit
    /// and origin are untouched, only the revision it is sequenced against
    /// changes.
    pub fn with_base_revision(&self, base_revision: u64) -> Self {
        Self {
            edit: self.edit.clone(),
            origin_site: self.origin_site.clone(),
            base_revision,
        }
    }

    /// A copy of this operation carrying a different edit but the same
    /// identity metadata. Transform outputs are built this way.
    pub(crate) fn with_edit(&self, edit: Edit) -> Self {
        Self {
            edit,
            origin_site: self.origin_site.clone(),
            base_revision: self.base_revision,
        }
    }
}

/// Error returned by validating constructors for malformed operations.
///
/// Malformed operations are rejected before entering the system; the
/// engine never produces one internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOperation {
    /// `Replace.old_content` was empty.
    EmptyReplaceTarget,
}

impl fmt::Display for InvalidOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyReplaceTarget => {
                write!(f, "replace requires a non-empty old content")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidOperation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_constructor() {
        let op = Operation::insert("a", 0, 2, "hi");
        assert_eq!(
            op.edit(),
            &Edit::Insert {
                position: 2,
                content: "hi".into()
            }
        );
        assert_eq!(op.origin_site(), "a");
        assert_eq!(op.base_revision(), 0);
    }

    #[test]
    fn empty_insert_and_zero_delete_are_noops() {
        assert!(Operation::insert("a", 0, 0, "").is_noop());
        assert!(Operation::delete("a", 0, 3, 0).is_noop());
        assert!(!Operation::insert("a", 0, 0, "x").is_noop());
        assert!(!Operation::delete("a", 0, 0, 1).is_noop());
    }

    #[test]
    fn replace_rejects_empty_old_content() {
        let err = Operation::replace("a", 0, 0, "", "x").unwrap_err();
        assert_eq!(err, InvalidOperation::EmptyReplaceTarget);
    }

    #[test]
    fn replace_is_never_a_noop() {
        let op = Operation::replace("a", 0, 0, "x", "x").unwrap();
        assert!(!op.is_noop());
    }

    #[test]
    fn retag_preserves_edit_and_origin() {
        let op = Operation::delete("a", 1, 4, 2);
        let retagged = op.with_base_revision(7);
        assert_eq!(retagged.base_revision(), 7);
        assert_eq!(retagged.edit(), op.edit());
        assert_eq!(retagged.origin_site(), "a");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn wire_shape_is_flat_and_tagged() {
        let op = Operation::insert("alice", 5, 3, "hi");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "Insert");
        assert_eq!(json["position"], 3);
        assert_eq!(json["content"], "hi");
        assert_eq!(json["originSite"], "alice");
        assert_eq!(json["baseRevision"], 5);

        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn replace_wire_fields_are_camel_case() {
        let op = Operation::replace("bob", 0, 1, "ab", "cd").unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "Replace");
        assert_eq!(json["oldContent"], "ab");
        assert_eq!(json["newContent"], "cd");
    }
}
