//! `MATCH : value-comparison for-clause?`

use super::{parse_for_clause, parse_pattern};
use crate::ast::{MatchBody, MatchRule, NumCmp};
use crate::lexer::{TokenKind, TokenStream};
use hvml_core::{CoreError, CoreResult};

/// Parse a `MATCH:` rule.
pub fn parse_match(input: &str) -> CoreResult<MatchRule> {
    let mut ts = TokenStream::new(input)?;
    ts.expect_word("MATCH")?;
    ts.expect(TokenKind::Colon)?;

    let body = if ts.eat_word("ALL") {
        MatchBody::All
    } else if ts.eat_word("AS") {
        let lit = ts.expect(TokenKind::Str)?;
        MatchBody::As(lit.text)
    } else if ts.eat_word("LIKE") {
        MatchBody::Like(parse_pattern(&mut ts)?)
    } else {
        let word = ts.expect(TokenKind::Word)?;
        let cmp = NumCmp::from_word(&word.text).ok_or_else(|| {
            CoreError::bad_arg(format!(
                "expected ALL, AS, LIKE, or a comparator, found '{}'",
                word.text
            ))
        })?;
        let negative = ts.eat(TokenKind::Minus);
        let num = ts.expect(TokenKind::Number)?;
        let value = if negative { -num.number } else { num.number };
        MatchBody::Cmp(cmp, value)
    };

    let for_clause = parse_for_clause(&mut ts)?;
    ts.expect_eof()?;
    Ok(MatchRule { body, for_clause })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_core::Variant;

    #[test]
    fn test_match_as() {
        let rule = parse_match("MATCH: AS 'fired'").unwrap();
        assert!(rule.matches(&Variant::string("fired")));
        assert!(!rule.matches(&Variant::string("missed")));
    }

    #[test]
    fn test_match_numeric() {
        let rule = parse_match("MATCH: GE 10").unwrap();
        assert!(rule.matches(&Variant::longint(10)));
        assert!(!rule.matches(&Variant::longint(9)));
        assert!(!rule.matches(&Variant::string("not a number")));
    }

    #[test]
    fn test_match_all() {
        let rule = parse_match("MATCH: ALL").unwrap();
        assert!(rule.matches(&Variant::undefined()));
    }

    #[test]
    fn test_print_parse_roundtrip() {
        for src in [
            "MATCH: ALL",
            "MATCH: AS 'x', FOR KV",
            "MATCH: LIKE '/^ok$/i'",
            "MATCH: LT 100",
        ] {
            let ast = parse_match(src).unwrap();
            assert_eq!(ast, parse_match(&ast.to_string()).unwrap());
        }
    }
}
