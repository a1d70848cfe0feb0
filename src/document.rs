//! Document snapshots and the pure apply engine.
//!
//! A [`Document`] is an immutable text snapshot plus the revision counter
//! identifying how many operations it has absorbed. [`Document::apply`]
//! produces a new snapshot; it is pure and holds no shared state, so
//! independent snapshots can be applied concurrently from any thread.

use alloc::string::String;
use core::fmt;

use crate::op::{Edit, Operation};

/// A text snapshot with its revision counter.
///
/// Positions are character indices. Out-of-range positions are clamped
/// into `[0, len]` at apply time rather than rejected; a clamp is logged
/// at `debug` and is recoverable.
///
/// # Example
///
/// ```
/// use ot_kit::{Document, Operation};
///
/// let doc = Document::from_text("hello");
/// let doc = doc.apply(&Operation::insert("a", 0, 5, "!")).unwrap();
/// assert_eq!(doc.text(), "hello!");
/// assert_eq!(doc.revision(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Document {
    text: String,
    revision: u64,
}

impl Document {
    /// An empty document at revision zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A document with the given initial text, at revision zero.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            revision: 0,
        }
    }

    /// Reconstruct a snapshot from an authoritative copy, e.g. during a
    /// full resynchronization.
    pub fn restore(text: impl Into<String>, revision: u64) -> Self {
        Self {
            text: text.into(),
            revision,
        }
    }

    /// The document text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of characters in the document.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether the document is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// How many operations this snapshot has absorbed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply one operation, returning the next snapshot.
    ///
    /// - `Insert` splices its content in at the (clamped) position.
    /// - `Delete` removes up to `length` characters actually available.
    /// - `Replace` verifies the addressed slice equals its `old_content`;
    ///   on mismatch it returns a [`Conflict`] and `self` is unchanged.
    ///
    /// A successful apply advances the revision by one.
    pub fn apply(&self, op: &Operation) -> Result<Document, Conflict> {
        let len = self.len();
        let text = match op.edit() {
            Edit::Insert { position, content } => {
                let at = self.clamp(*position, len);
                let mut text = String::with_capacity(self.text.len() + content.len());
                let byte = byte_index(&self.text, at);
                text.push_str(&self.text[..byte]);
                text.push_str(content);
                text.push_str(&self.text[byte..]);
                text
            }
            Edit::Delete { position, length } => {
                let start = self.clamp(*position, len);
                let end = (start + length).min(len);
                let (b0, b1) = (byte_index(&self.text, start), byte_index(&self.text, end));
                let mut text = String::with_capacity(self.text.len());
                text.push_str(&self.text[..b0]);
                text.push_str(&self.text[b1..]);
                text
            }
            Edit::Replace {
                position,
                old_content,
                new_content,
            } => {
                let start = self.clamp(*position, len);
                let end = (start + old_content.chars().count()).min(len);
                let (b0, b1) = (byte_index(&self.text, start), byte_index(&self.text, end));
                let found = &self.text[b0..b1];
                if found != old_content.as_str() {
                    log::warn!(
                        "replace conflict at {start}: expected {old_content:?}, found {found:?}"
                    );
                    return Err(Conflict {
                        position: start,
                        expected: old_content.clone(),
                        found: found.into(),
                    });
                }
                let mut text = String::with_capacity(
                    self.text.len() - found.len() + new_content.len(),
                );
                text.push_str(&self.text[..b0]);
                text.push_str(new_content);
                text.push_str(&self.text[b1..]);
                text
            }
        };
        Ok(Document {
            text,
            revision: self.revision + 1,
        })
    }

    /// A copy of this snapshot with the revision advanced but the text
    /// untouched, for absorbing an operation that took no effect.
    pub(crate) fn tick(&self) -> Document {
        Document {
            text: self.text.clone(),
            revision: self.revision + 1,
        }
    }

    fn clamp(&self, position: usize, len: usize) -> usize {
        if position > len {
            log::debug!("position {position} beyond document length {len}, clamping");
            len
        } else {
            position
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Byte offset of the character at `char_index`, or the end of the text.
fn byte_index(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

/// A detected mismatch between a replace operation's stated assumption
/// and the document's actual content at apply time.
///
/// Non-fatal: the operation is dropped and its issuer should re-derive
/// the edit from the current text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Character index where the mismatch was detected.
    pub position: usize,
    /// The content the operation assumed.
    pub expected: String,
    /// The content actually present.
    pub found: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "replace conflict at {}: expected {:?}, found {:?}",
            self.position, self.expected, self.found
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Conflict {}
