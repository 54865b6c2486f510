//! The token definition for the issue query language.

use crate::ast::Operator;

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// The source text of the token. Quoted literals have their quotes stripped.
    pub text: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a str, span: Span) -> Self {
        Self { kind, text, span }
    }

    /// True for tokens that can name a field or stand as a value.
    pub fn is_word(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Field | TokenKind::Literal { .. } | TokenKind::FunctionCall
        )
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A word from the field vocabulary, e.g. `status`
    Field,
    Operator(Operator),
    /// A quoted string or any bare word that is not a field
    Literal { quoted: bool },
    /// `name(args)`
    FunctionCall,

    // Punctuation
    LParen, // (
    RParen, // )
    Comma,  // ,

    Logical(Logical),
    Keyword(Keyword),
}

/// Logical keywords joining or negating conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And, // "AND"
    Or,  // "OR"
    Not, // "NOT"
}

/// Keywords of the ordering clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    OrderBy, // "ORDER BY"
    Asc,     // "ASC"
    Desc,    // "DESC"
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
