//! harbor-regex: a byte-oriented backtracking regular expression engine.
//!
//! Patterns support literals, `.`, character classes (with ranges, negation,
//! and inline `\w`/`\d`), the `^`/`$` line anchors, greedy `*`/`+`/`?`
//! quantifiers, `|` alternation, capture groups, and numeric back-references
//! `\1`..`\9`. Matching is unanchored search over raw bytes; there is no
//! Unicode awareness.
//!
//! ```
//! use harbor_regex::Regex;
//!
//! let regex = Regex::new(r"(\w+) and \1").unwrap();
//! assert!(regex.is_match(b"cat and cat"));
//! assert!(!regex.is_match(b"cat and dog"));
//! ```

pub mod ast;
mod error;
mod matcher;
mod parser;
pub mod token;

pub use error::{Error, Result};

use ast::Alternation;

/// A compiled pattern. Cheap to share across threads; every match attempt
/// carries its own cursor.
#[derive(Debug, Clone)]
pub struct Regex {
    root: Alternation,
    group_count: u32,
}

impl Regex {
    /// Compile a pattern from text.
    pub fn new(pattern: &str) -> Result<Self> {
        Self::from_bytes(pattern.as_bytes())
    }

    /// Compile a pattern from raw bytes.
    pub fn from_bytes(pattern: &[u8]) -> Result<Self> {
        let tokens = token::tokenize(pattern)?;
        let (root, group_count) = parser::Parser::new(tokens).parse()?;
        Ok(Regex { root, group_count })
    }

    /// Whether the pattern matches anywhere in `input`.
    pub fn is_match(&self, input: &[u8]) -> bool {
        matcher::search(self, input).is_some()
    }

    /// Capture table of the first successful match attempt, ordered by group
    /// index. `Some` exactly when [`Regex::is_match`] is true; a slot is
    /// `None` when its group took no part in the match.
    pub fn captures<'i>(&self, input: &'i [u8]) -> Option<Vec<Option<&'i [u8]>>> {
        matcher::search(self, input)
    }

    /// Number of capture groups in the pattern.
    pub fn group_count(&self) -> u32 {
        self.group_count
    }
}
