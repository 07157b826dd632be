//! `FILTER : (ALL | number-rules | matching-rule) for-clause?`

use super::{parse_for_clause, parse_matching_rule};
use crate::ast::{FilterBody, FilterRule, NumCmp, NumberRule};
use crate::lexer::{TokenKind, TokenStream};
use hvml_core::{CoreError, CoreResult};

/// Parse a `FILTER:` rule.
pub fn parse_filter(input: &str) -> CoreResult<FilterRule> {
    let mut ts = TokenStream::new(input)?;
    ts.expect_word("FILTER")?;
    ts.expect(TokenKind::Colon)?;

    let body = if ts.eat_word("ALL") {
        FilterBody::All
    } else if let Some(rule) = parse_matching_rule(&mut ts)? {
        FilterBody::Matching(rule)
    } else {
        FilterBody::Numbers(parse_number_rules(&mut ts)?)
    };

    let for_clause = parse_for_clause(&mut ts)?;
    ts.expect_eof()?;
    Ok(FilterRule { body, for_clause })
}

fn parse_number_rule(ts: &mut TokenStream) -> CoreResult<NumberRule> {
    let word = ts.expect(TokenKind::Word)?;
    let cmp = NumCmp::from_word(&word.text).ok_or_else(|| {
        CoreError::bad_arg(format!(
            "expected ALL, LIKE, AS, or a comparator, found '{}'",
            word.text
        ))
    })?;
    let negative = ts.eat(TokenKind::Minus);
    let num = ts.expect(TokenKind::Number)?;
    let value = if negative { -num.number } else { num.number };
    Ok(NumberRule { cmp, value })
}

fn parse_number_rules(ts: &mut TokenStream) -> CoreResult<Vec<NumberRule>> {
    let mut rules = vec![parse_number_rule(ts)?];
    while ts.peek().kind == TokenKind::Comma && !ts.peek2().is_word("FOR") {
        ts.eat(TokenKind::Comma);
        rules.push(parse_number_rule(ts)?);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ForClause, MatchingRule};
    use hvml_core::Variant;

    #[test]
    fn test_parse_all() {
        let rule = parse_filter("FILTER: ALL").unwrap();
        assert_eq!(rule.body, FilterBody::All);
        assert!(rule.for_clause.is_none());
    }

    #[test]
    fn test_parse_like_with_max_and_for() {
        let rule = parse_filter("FILTER: LIKE '/^foo/i' MAX 16, FOR KV").unwrap();
        match &rule.body {
            FilterBody::Matching(MatchingRule::Like(p)) => {
                assert!(p.is_regex());
                assert_eq!(p.max_len(), Some(16));
                assert!(p.matches("FOOD"));
            }
            other => panic!("wrong body: {other:?}"),
        }
        assert_eq!(rule.for_clause, Some(ForClause::Kv));
    }

    #[test]
    fn test_parse_number_conjunction() {
        let rule = parse_filter("FILTER: GE 10, LT 20, FOR VALUE").unwrap();
        match &rule.body {
            FilterBody::Numbers(rules) => {
                assert_eq!(rules.len(), 2);
                assert_eq!(rules[0].cmp, NumCmp::Ge);
                assert_eq!(rules[1].value, 20.0);
            }
            other => panic!("wrong body: {other:?}"),
        }
        assert!(rule.accepts(&Variant::longint(15)));
        assert!(!rule.accepts(&Variant::longint(20)));
    }

    #[test]
    fn test_print_parse_roundtrip() {
        for src in [
            "FILTER: ALL",
            "FILTER: ALL, FOR KEY",
            "FILTER: LIKE '/^foo/i' MAX 16, FOR KV",
            "FILTER: AS 'exact'",
            "FILTER: GE 10, LT 20, FOR VALUE",
            "FILTER: NE -3",
        ] {
            let ast = parse_filter(src).unwrap();
            let printed = ast.to_string();
            let reparsed = parse_filter(&printed).unwrap();
            assert_eq!(ast, reparsed, "roundtrip failed for {src}");
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_filter("FILTER LIKE 'x'").is_err());
        assert!(parse_filter("FILTER: FROB 3").is_err());
        assert!(parse_filter("FILTER: ALL trailing").is_err());
    }
}
