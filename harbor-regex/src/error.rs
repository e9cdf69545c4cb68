//! Pattern compilation errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while turning a pattern into a [`crate::Regex`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The pattern ends with a bare `\`.
    #[error("pattern ends with a dangling '\\'")]
    InvalidEscapeSequence,

    /// A `[` was opened but never matched by `]`.
    #[error("character class is never closed")]
    UnclosedCharacterClass,

    /// A `(` was opened but never matched by `)`.
    #[error("capture group is never closed")]
    UnclosedParenthesis,

    /// A `)` appeared with no open group.
    #[error("')' without a matching '('")]
    UnexpectedCloseParen,

    /// An escape the engine does not understand, including a back-reference
    /// to a group whose `(` has not been seen yet.
    #[error("unsupported escape sequence '\\{}'", .0.escape_ascii())]
    UnsupportedEscape(u8),

    /// A token that is not allowed inside `[...]`.
    #[error("token not allowed inside a character class")]
    UnsupportedCharacterClassToken,

    /// A token in a position where no rule accepts it, e.g. a quantifier
    /// with nothing to repeat or an empty branch.
    #[error("unexpected token in pattern")]
    UnsupportedToken,
}
