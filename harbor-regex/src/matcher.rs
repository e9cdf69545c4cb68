//! Backtracking matcher.
//!
//! The matcher walks the syntax tree directly. Choice points (alternation
//! branches, quantifier repetition counts) snapshot the cursor before each
//! attempt and restore it on failure; because captures are borrowed slices
//! into the input, a snapshot is just a position plus a short vector of
//! pointer-sized entries.

use crate::ast::{Alternation, Node, Quantifier};
use crate::Regex;

/// Match state: position in the input plus the capture table, indexed by
/// group number minus one.
struct Cursor<'i> {
    input: &'i [u8],
    pos: usize,
    captures: Vec<Option<&'i [u8]>>,
}

#[derive(Clone)]
struct Snapshot<'i> {
    pos: usize,
    captures: Vec<Option<&'i [u8]>>,
}

impl<'i> Cursor<'i> {
    fn save(&self) -> Snapshot<'i> {
        Snapshot {
            pos: self.pos,
            captures: self.captures.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot<'i>) {
        self.pos = snapshot.pos;
        self.captures = snapshot.captures;
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }
}

/// Unanchored search: attempt the root alternation at every start position.
/// Returns the capture table of the first successful attempt.
pub(crate) fn search<'i>(regex: &Regex, input: &'i [u8]) -> Option<Vec<Option<&'i [u8]>>> {
    for start in 0..=input.len() {
        let mut cursor = Cursor {
            input,
            pos: start,
            captures: vec![None; regex.group_count as usize],
        };
        if match_alternation(&regex.root, &mut cursor) {
            return Some(cursor.captures);
        }
    }
    None
}

/// Try each branch in source order, restoring the cursor between attempts.
/// The first branch that succeeds wins.
fn match_alternation(alternation: &Alternation, cursor: &mut Cursor<'_>) -> bool {
    for branch in &alternation.branches {
        let snapshot = cursor.save();
        if match_branch(branch, cursor) {
            return true;
        }
        cursor.restore(snapshot);
    }
    false
}

/// Match a sequence of nodes. Quantified nodes get the rest of the branch as
/// their continuation so they can give repetitions back when the tail fails.
fn match_branch(nodes: &[Node], cursor: &mut Cursor<'_>) -> bool {
    let Some((first, rest)) = nodes.split_first() else {
        return true;
    };
    match first {
        Node::Quantified { quantifier, node } => match_quantified(quantifier, node, rest, cursor),
        _ => match_atom(first, cursor) && match_branch(rest, cursor),
    }
}

/// Collect every repetition count reachable up to the maximum, then try the
/// continuation from the preferred end of that range. Repetition stops early
/// when the inner node matches without consuming input.
fn match_quantified(
    quantifier: &Quantifier,
    inner: &Node,
    rest: &[Node],
    cursor: &mut Cursor<'_>,
) -> bool {
    let min = quantifier.min as usize;
    let max = quantifier.max.map_or(usize::MAX, |m| m as usize);

    let mut checkpoints = vec![cursor.save()];
    while checkpoints.len() <= max {
        let before = cursor.pos;
        if !match_atom(inner, cursor) {
            break;
        }
        checkpoints.push(cursor.save());
        if cursor.pos == before {
            break;
        }
    }

    if checkpoints.len() <= min {
        return false;
    }

    if quantifier.greedy {
        for checkpoint in checkpoints[min..].iter().rev() {
            cursor.restore(checkpoint.clone());
            if match_branch(rest, cursor) {
                return true;
            }
        }
    } else {
        for checkpoint in &checkpoints[min..] {
            cursor.restore(checkpoint.clone());
            if match_branch(rest, cursor) {
                return true;
            }
        }
    }
    false
}

fn match_atom(node: &Node, cursor: &mut Cursor<'_>) -> bool {
    match node {
        Node::Literal(expected) => match cursor.peek_byte() {
            Some(byte) if byte == *expected => {
                cursor.pos += 1;
                true
            }
            _ => false,
        },
        Node::Dot => {
            if cursor.pos < cursor.input.len() {
                cursor.pos += 1;
                true
            } else {
                false
            }
        }
        Node::Class(class) => match cursor.peek_byte() {
            Some(byte) if class.matches(byte) => {
                cursor.pos += 1;
                true
            }
            _ => false,
        },
        Node::LineStart => cursor.pos == 0 || cursor.input[cursor.pos - 1] == b'\n',
        Node::LineEnd => {
            cursor.pos == cursor.input.len() || cursor.input[cursor.pos] == b'\n'
        }
        Node::Group { index, body } => {
            let start = cursor.pos;
            if !match_alternation(body, cursor) {
                return false;
            }
            cursor.captures[(*index - 1) as usize] = Some(&cursor.input[start..cursor.pos]);
            true
        }
        Node::Alternation(alternation) => match_alternation(alternation, cursor),
        Node::Backreference(index) => {
            // A group that has not captured yet is a no-match, not an error.
            let Some(captured) = cursor.captures[(*index - 1) as usize] else {
                return false;
            };
            let end = cursor.pos + captured.len();
            if cursor.input.get(cursor.pos..end) == Some(captured) {
                cursor.pos = end;
                true
            } else {
                false
            }
        }
        Node::Quantified { quantifier, node } => match_quantified(quantifier, node, &[], cursor),
    }
}
