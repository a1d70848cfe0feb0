//! The transform engine: the pure pairwise conflict resolver.
//!
//! [`transform`] takes two operations issued concurrently against the same
//! document state and produces counterparts valid against each other's
//! resulting state, so that applying `a` then `b'` and applying `b` then
//! `a'` converge on the same text.
//!
//! Inserts and deletes transform directly through a position-shifting
//! table. A replace is decomposed into a delete-half and an insert-half,
//! each half is transformed through the counterpart, and the halves are
//! recomposed; if the delete-half does not survive intact the replaced
//! text was altered concurrently, and the replace degrades to a no-op
//! (the conflict then surfaces at apply or coordinator level).

use alloc::string::String;
use alloc::vec::Vec;

use crate::op::{Edit, Operation};

/// Transform two concurrent operations against each other.
///
/// Both operations must have been issued against the same document state
/// and address positions within it. The returned pair `(a', b')` then
/// satisfies the OT convergence contract: applying `a` then `b'` yields
/// the same document as applying `b` then `a'`. The call is pure and
/// never fails. Positions past the document's end are tolerated at apply
/// time ([`Document::apply`](crate::Document::apply) clamps them) but are
/// outside this contract.
///
/// Equal-position insert ties are broken by comparing origin sites: the
/// lexicographically smaller site is treated as having inserted first, so
/// every participant agrees on one canonical order.
///
/// A replace whose assumed range was disturbed by the concurrent
/// operation degrades to a no-op, and its counterpart is returned
/// untransformed. When the disturbance only partially overlaps the range,
/// the bare pair does not converge on its own; the synchronization
/// coordinator restores convergence by dropping the degraded replace and
/// rebuilding its optimistic buffer.
///
/// # Example
///
/// ```
/// use ot_kit::{transform, Document, Operation};
///
/// let doc = Document::from_text("hello");
/// let a = Operation::insert("alice", 0, 5, " world");
/// let b = Operation::insert("bob", 0, 0, "say ");
///
/// let (a2, b2) = transform(&a, &b);
/// let left = doc.apply(&a).unwrap().apply(&b2).unwrap();
/// let right = doc.apply(&b).unwrap().apply(&a2).unwrap();
/// assert_eq!(left.text(), "say hello world");
/// assert_eq!(right.text(), "say hello world");
/// ```
pub fn transform(a: &Operation, b: &Operation) -> (Operation, Operation) {
    let sa = decompose(a.edit());
    let sb = decompose(b.edit());
    let (sa, sb) = transform_seqs(sa, sb, a.origin_site(), b.origin_site());

    let a_edit = recompose(a.edit(), sa);
    let b_edit = recompose(b.edit(), sb);

    match (a_edit, b_edit) {
        (Some(ae), Some(be)) => (a.with_edit(ae), b.with_edit(be)),
        // A degraded replace takes no effect, so its counterpart is
        // concurrent with a no-op and passes through unchanged.
        (None, Some(_)) => (a.with_edit(noop_at(a.edit())), b.clone()),
        (Some(_), None) => (a.clone(), b.with_edit(noop_at(b.edit()))),
        (None, None) => (
            a.with_edit(noop_at(a.edit())),
            b.with_edit(noop_at(b.edit())),
        ),
    }
}

/// A primitive transform unit: a replace contributes two of these.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prim {
    Ins {
        position: usize,
        content: String,
        rank: InsRank,
    },
    Del {
        position: usize,
        length: usize,
    },
}

/// Tie-break metadata for equal-position insert pairs.
///
/// The recorded positions are in the shared base frame both operations
/// were issued against, so they stay fixed while current positions shift.
/// A plain insert issued at the start of a replace's range lands before
/// the replacement text; issued at or beyond the range's end it lands
/// after (the delete-half pulls it onto the boundary, and the surviving
/// replace must stay contiguous). Two replace insert-halves order by the
/// start of the ranges they replace. Only plain/plain ties fall through
/// to site comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsRank {
    Plain { origin: usize },
    ReplaceHalf { start: usize, end: usize },
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn decompose(edit: &Edit) -> Vec<Prim> {
    match edit {
        Edit::Insert { position, content } => alloc::vec![Prim::Ins {
            position: *position,
            content: content.clone(),
            rank: InsRank::Plain { origin: *position },
        }],
        Edit::Delete { position, length } => alloc::vec![Prim::Del {
            position: *position,
            length: *length,
        }],
        Edit::Replace {
            position,
            old_content,
            new_content,
        } => alloc::vec![
            Prim::Del {
                position: *position,
                length: char_len(old_content),
            },
            Prim::Ins {
                position: *position,
                content: new_content.clone(),
                rank: InsRank::ReplaceHalf {
                    start: *position,
                    end: *position + char_len(old_content),
                },
            },
        ],
    }
}

/// Transform the primitive sequence of `a` against the sequence of `b`,
/// returning both transformed sequences. Each primitive of `a` is pushed
/// through every (progressively updated) primitive of `b`, the standard
/// sequence-against-sequence scheme.
fn transform_seqs(
    sa: Vec<Prim>,
    mut sb: Vec<Prim>,
    a_site: &str,
    b_site: &str,
) -> (Vec<Prim>, Vec<Prim>) {
    let mut out = Vec::with_capacity(sa.len());
    for mut a in sa {
        for b in sb.iter_mut() {
            let (a2, b2) = transform_prim(&a, b, a_site, b_site);
            a = a2;
            *b = b2;
        }
        out.push(a);
    }
    (out, sb)
}

/// True when the `a` insert is treated as having happened first.
fn a_first(a: &InsRank, b: &InsRank, a_site: &str, b_site: &str) -> bool {
    match (a, b) {
        (InsRank::Plain { origin }, InsRank::ReplaceHalf { end, .. }) => origin < end,
        (InsRank::ReplaceHalf { end, .. }, InsRank::Plain { origin }) => origin >= end,
        (InsRank::ReplaceHalf { start: s1, .. }, InsRank::ReplaceHalf { start: s2, .. })
            if s1 != s2 =>
        {
            s1 < s2
        }
        _ => a_site <= b_site,
    }
}

fn transform_prim(a: &Prim, b: &Prim, a_site: &str, b_site: &str) -> (Prim, Prim) {
    match (a, b) {
        (
            Prim::Ins {
                position: pa,
                content: ca,
                rank: ra,
            },
            Prim::Ins {
                position: pb,
                content: cb,
                rank: rb,
            },
        ) => {
            let (mut pa2, mut pb2) = (*pa, *pb);
            if pa < pb || (pa == pb && a_first(ra, rb, a_site, b_site)) {
                pb2 += char_len(ca);
            } else {
                pa2 += char_len(cb);
            }
            (
                Prim::Ins {
                    position: pa2,
                    content: ca.clone(),
                    rank: *ra,
                },
                Prim::Ins {
                    position: pb2,
                    content: cb.clone(),
                    rank: *rb,
                },
            )
        }
        (Prim::Ins { .. }, Prim::Del { .. }) => transform_ins_del(a, b),
        (Prim::Del { .. }, Prim::Ins { .. }) => {
            let (i, d) = transform_ins_del(b, a);
            (d, i)
        }
        (
            Prim::Del {
                position: p1,
                length: l1,
            },
            Prim::Del {
                position: p2,
                length: l2,
            },
        ) => {
            // Overlap of the two half-open ranges; each delete shrinks by
            // the overlap and shifts left by however much of the other
            // range lay fully before it. Saturating arithmetic keeps a
            // fully coincident pair at two no-ops, never negative.
            let overlap = (p1 + l1).min(p2 + l2).saturating_sub(*p1.max(p2));
            let before_a = p1.saturating_sub(*p2).min(*l2);
            let before_b = p2.saturating_sub(*p1).min(*l1);
            (
                Prim::Del {
                    position: p1 - before_a,
                    length: l1 - overlap,
                },
                Prim::Del {
                    position: p2 - before_b,
                    length: l2 - overlap,
                },
            )
        }
    }
}

/// Insert-against-delete table. Returns `(insert', delete')`.
fn transform_ins_del(ins: &Prim, del: &Prim) -> (Prim, Prim) {
    let (Prim::Ins {
        position: pi,
        content,
        rank,
    }, Prim::Del {
        position: pd,
        length,
    }) = (ins, del)
    else {
        unreachable!("transform_ins_del called with wrong primitive kinds");
    };

    if pi <= pd {
        // Insert at or before the deleted range: the delete shifts right.
        (
            ins.clone(),
            Prim::Del {
                position: pd + char_len(content),
                length: *length,
            },
        )
    } else if *pi >= pd + length {
        // Insert at or after the end of the range: the insert shifts left.
        (
            Prim::Ins {
                position: pi - length,
                content: content.clone(),
                rank: *rank,
            },
            del.clone(),
        )
    } else {
        // Insert strictly inside the deleted range: the delete absorbs it,
        // since the inserted text is itself being removed.
        (
            Prim::Ins {
                position: *pd,
                content: String::new(),
                rank: *rank,
            },
            Prim::Del {
                position: *pd,
                length: length + char_len(content),
            },
        )
    }
}

/// Reassemble a transformed edit from its primitive sequence.
///
/// Returns `None` when a replace degraded: its delete-half no longer
/// covers exactly the text it set out to replace, or its halves were
/// pushed apart and can no longer act as one replacement.
fn recompose(original: &Edit, mut primed: Vec<Prim>) -> Option<Edit> {
    match original {
        Edit::Insert { .. } => match primed.pop() {
            Some(Prim::Ins {
                position, content, ..
            }) => Some(Edit::Insert { position, content }),
            _ => unreachable!("insert decomposes to one primitive"),
        },
        Edit::Delete { .. } => match primed.pop() {
            Some(Prim::Del { position, length }) => Some(Edit::Delete { position, length }),
            _ => unreachable!("delete decomposes to one primitive"),
        },
        Edit::Replace {
            old_content,
            new_content,
            ..
        } => {
            let (Some(Prim::Ins { position: pi, .. }), Some(Prim::Del { position, length })) =
                (primed.pop(), primed.pop())
            else {
                unreachable!("replace decomposes to a delete and an insert");
            };
            if length != char_len(old_content) || position != pi {
                return None;
            }
            Some(Edit::Replace {
                position,
                old_content: old_content.clone(),
                new_content: new_content.clone(),
            })
        }
    }
}

/// The canonical no-op an operation degrades to, anchored at its position.
fn noop_at(edit: &Edit) -> Edit {
    Edit::Insert {
        position: edit.position(),
        content: String::new(),
    }
}
