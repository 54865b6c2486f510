//! Lightweight structural validation of raw query text.
//!
//! The validator re-tokenizes its input and never relies on a prior parse. It
//! checks parenthesis balance and that every token in operator position is an
//! operator, a logical keyword or `ORDER BY`. It always returns a structured
//! result; a panic inside the checks is reported as a single `"Syntax error"`.

use crate::lexer::tokenize;
use crate::token::{Keyword, Logical, Token, TokenKind};
use serde::Serialize;
use std::panic;

pub const UNBALANCED_PARENTHESES: &str = "Unbalanced parentheses";
pub const SYNTAX_ERROR: &str = "Syntax error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validates raw query text.
pub fn validate(raw: &str) -> ValidationResult {
    let errors =
        panic::catch_unwind(|| check(raw)).unwrap_or_else(|_| vec![SYNTAX_ERROR.to_string()]);
    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn check(raw: &str) -> Vec<String> {
    let tokens = tokenize(raw);
    let mut errors = Vec::new();
    if !parentheses_balanced(&tokens) {
        errors.push(UNBALANCED_PARENTHESES.to_string());
    }
    check_positions(&tokens, &mut errors);
    errors
}

/// False if the running depth goes negative or does not end at zero.
///
/// Parentheses are counted in every token except closed string literals, so
/// an unclosed call such as `currentUser(` or an unterminated string that
/// swallowed a `(` still counts.
fn parentheses_balanced(tokens: &[Token<'_>]) -> bool {
    let mut depth = 0i64;
    for token in tokens {
        if token.kind == (TokenKind::Literal { quoted: true }) {
            continue;
        }
        let mut chars = token.text.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                // a quoted section with a closing quote is opaque
                '"' if token.text[i + 1..].contains('"') => {
                    chars.find(|&(_, c)| c == '"');
                }
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }
    }
    depth == 0
}

/// What the next token is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// a field, `(` or `NOT`
    Term,
    Operator,
    Value,
    /// `(` opening an `IN` list, or a single value
    ValueList,
    /// inside an `IN (...)` list
    ListItem,
    /// `AND`, `OR`, `)` or `ORDER BY` after a complete condition
    Connector,
    Order,
}

fn check_positions(tokens: &[Token<'_>], errors: &mut Vec<String>) {
    let mut expect = Expect::Term;
    let mut last: Option<&Token<'_>> = None;

    for token in tokens {
        expect = match (expect, token.kind) {
            (Expect::Order, _) => break,

            // a logical keyword or ORDER BY where the condition still needs
            // its operator or value
            (
                Expect::Operator | Expect::Value | Expect::ValueList,
                TokenKind::Logical(_) | TokenKind::Keyword(Keyword::OrderBy),
            ) => {
                if let Some(last) = last {
                    errors.push(incomplete_condition(last));
                }
                match token.kind {
                    TokenKind::Keyword(Keyword::OrderBy) => Expect::Order,
                    _ => Expect::Term,
                }
            }

            (_, TokenKind::Keyword(Keyword::OrderBy)) if expect != Expect::ListItem => {
                Expect::Order
            }
            (_, TokenKind::Logical(Logical::And | Logical::Or)) if expect != Expect::ListItem => {
                Expect::Term
            }

            (Expect::Term, TokenKind::LParen | TokenKind::Logical(Logical::Not)) => Expect::Term,
            (Expect::Term, TokenKind::RParen) => Expect::Connector,
            (Expect::Term, _) if token.is_word() => Expect::Operator,

            (Expect::Operator, TokenKind::Operator(operator)) => {
                if !operator.takes_value() {
                    Expect::Connector
                } else if operator.takes_list() {
                    Expect::ValueList
                } else {
                    Expect::Value
                }
            }
            (Expect::Operator, _) => {
                errors.push(format!("Unknown operator \"{}\"", token.text));
                Expect::Value
            }

            (Expect::ValueList, TokenKind::LParen) => Expect::ListItem,
            (Expect::Value | Expect::ValueList, _) if token.is_word() => Expect::Connector,

            (Expect::ListItem, TokenKind::RParen) => Expect::Connector,
            (Expect::ListItem, TokenKind::Comma) => Expect::ListItem,
            (Expect::ListItem, _) if token.is_word() => Expect::ListItem,

            (Expect::Connector, TokenKind::RParen) => Expect::Connector,
            // adjacent conditions are joined with an implicit AND
            (Expect::Connector, TokenKind::LParen | TokenKind::Logical(Logical::Not)) => {
                Expect::Term
            }
            (Expect::Connector, _) if token.is_word() => Expect::Operator,

            (_, TokenKind::RParen) => {
                errors.push(format!("Unexpected token \"{}\"", token.text));
                Expect::Connector
            }
            _ => {
                errors.push(format!("Unexpected token \"{}\"", token.text));
                expect
            }
        };
        last = Some(token);
    }

    if matches!(
        expect,
        Expect::Operator | Expect::Value | Expect::ValueList | Expect::ListItem
    ) {
        if let Some(token) = last {
            errors.push(incomplete_condition(token));
        }
    }
}

fn incomplete_condition(last: &Token<'_>) -> String {
    format!("Incomplete condition after \"{}\"", last.text)
}
