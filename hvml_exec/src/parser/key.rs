//! `KEY : (ALL | LIKE pattern | AS literal) for-clause?`

use super::{parse_for_clause, parse_matching_rule};
use crate::ast::{KeyBody, KeyRule};
use crate::lexer::{TokenKind, TokenStream};
use hvml_core::{CoreError, CoreResult};

/// Parse a `KEY:` rule.
pub fn parse_key(input: &str) -> CoreResult<KeyRule> {
    let mut ts = TokenStream::new(input)?;
    ts.expect_word("KEY")?;
    ts.expect(TokenKind::Colon)?;

    let body = if ts.eat_word("ALL") {
        KeyBody::All
    } else if let Some(rule) = parse_matching_rule(&mut ts)? {
        KeyBody::Matching(rule)
    } else {
        return Err(CoreError::bad_arg(format!(
            "expected ALL, LIKE, or AS, found '{}'",
            ts.peek()
        )));
    };

    let for_clause = parse_for_clause(&mut ts)?;
    ts.expect_eof()?;
    Ok(KeyRule { body, for_clause })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ForClause;

    #[test]
    fn test_parse_all_for_value() {
        let rule = parse_key("KEY: ALL, FOR VALUE").unwrap();
        assert_eq!(rule.body, KeyBody::All);
        assert_eq!(rule.for_clause, Some(ForClause::Value));
        assert!(rule.accepts("anything"));
    }

    #[test]
    fn test_parse_like() {
        let rule = parse_key("KEY: LIKE '/^t/'").unwrap();
        assert!(rule.accepts("timer"));
        assert!(!rule.accepts("other"));
    }

    #[test]
    fn test_print_parse_roundtrip() {
        for src in [
            "KEY: ALL",
            "KEY: AS 'id', FOR KV",
            "KEY: LIKE '/^t.*r$/ci' MAX 8, FOR KEY",
        ] {
            let ast = parse_key(src).unwrap();
            assert_eq!(ast, parse_key(&ast.to_string()).unwrap());
        }
    }
}
