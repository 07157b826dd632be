//! Recursive-descent parsers for the four mini-grammars.
//!
//! Each grammar has the shape `HEAD ':' body for-clause?`. The parsers
//! share the token layer and a few helper productions (`FOR` clauses,
//! matching rules, patterns).

mod filter;
mod formula;
mod key;
mod matcher;

pub use filter::parse_filter;
pub use formula::parse_formula;
pub use key::parse_key;
pub use matcher::parse_match;

use crate::ast::{ForClause, MatchingRule};
use crate::lexer::{TokenKind, TokenStream};
use crate::pattern::Pattern;
use hvml_core::{CoreError, CoreResult};

/// Words reserved by the grammars; never identifiers.
pub(crate) const KEYWORDS: &[&str] = &[
    "FILTER", "KEY", "FORMULA", "MATCH", "ALL", "LIKE", "AS", "MAX", "FOR", "KV", "VALUE", "BY",
    "AND", "OR", "LT", "GT", "LE", "GE", "NE", "EQ",
];

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// `(',')? 'FOR' ('KV'|'KEY'|'VALUE')`, if present. A comma is consumed
/// only when a `FOR` follows it; a bare comma belongs to the caller's
/// list production.
pub(crate) fn parse_for_clause(ts: &mut TokenStream) -> CoreResult<Option<ForClause>> {
    if ts.peek().kind == TokenKind::Comma && ts.peek2().is_word("FOR") {
        ts.eat(TokenKind::Comma);
    }
    if ts.eat_word("FOR") {
        let word = ts.expect(TokenKind::Word)?;
        let clause = match word.text.as_str() {
            "KV" => ForClause::Kv,
            "KEY" => ForClause::Key,
            "VALUE" => ForClause::Value,
            other => {
                return Err(CoreError::bad_arg(format!(
                    "expected KV, KEY, or VALUE after FOR, found '{other}'"
                )));
            }
        };
        Ok(Some(clause))
    } else {
        Ok(None)
    }
}

/// A pattern literal with its optional `MAX n` suffix.
pub(crate) fn parse_pattern(ts: &mut TokenStream) -> CoreResult<Pattern> {
    let literal = ts.expect(TokenKind::Str)?;
    let max_len = if ts.eat_word("MAX") {
        let n = ts.expect(TokenKind::Number)?;
        Some(n.number as usize)
    } else {
        None
    };
    Pattern::parse(&literal.text, max_len)
}

/// `LIKE pattern | AS literal`, if the next word starts one.
pub(crate) fn parse_matching_rule(ts: &mut TokenStream) -> CoreResult<Option<MatchingRule>> {
    if ts.eat_word("LIKE") {
        Ok(Some(MatchingRule::Like(parse_pattern(ts)?)))
    } else if ts.eat_word("AS") {
        let lit = ts.expect(TokenKind::Str)?;
        Ok(Some(MatchingRule::As(lit.text)))
    } else {
        Ok(None)
    }
}
