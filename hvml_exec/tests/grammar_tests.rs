//! Cross-grammar round-trip coverage: every parser re-parses its own
//! printed form to an equal AST, and the canonical printings are stable.

use hvml_exec::{
    parse_filter, parse_formula, parse_key, parse_match, FilterBody, ForClause, MatchingRule,
};

#[test]
fn test_filter_regex_rule_ast_shape() {
    // One matching rule (regex, case-insensitive, max-length 16) and a
    // KV for-clause.
    let rule = parse_filter("FILTER: LIKE '/^foo/i' MAX 16, FOR KV").unwrap();
    let FilterBody::Matching(MatchingRule::Like(pattern)) = &rule.body else {
        panic!("expected a matching rule, got {:?}", rule.body);
    };
    assert!(pattern.is_regex());
    assert_eq!(pattern.max_len(), Some(16));
    assert_eq!(rule.for_clause, Some(ForClause::Kv));

    // Case-insensitivity comes from the `i` flag.
    assert!(pattern.matches("FooBar"));
    assert!(!pattern.matches("barfoo"));
}

#[test]
fn test_filter_reprint_is_token_identical() {
    let src = "FILTER: LIKE '/^foo/i' MAX 16, FOR KV";
    let rule = parse_filter(src).unwrap();
    assert_eq!(rule.to_string(), src);
}

#[test]
fn test_all_grammars_roundtrip() {
    for src in [
        "FILTER: ALL",
        "FILTER: GE 1, LE 9",
        "FILTER: AS 'x', FOR VALUE",
    ] {
        let ast = parse_filter(src).unwrap();
        assert_eq!(ast, parse_filter(&ast.to_string()).unwrap(), "{src}");
    }
    for src in ["KEY: ALL, FOR KV", "KEY: LIKE '/^t/'"] {
        let ast = parse_key(src).unwrap();
        assert_eq!(ast, parse_key(&ast.to_string()).unwrap(), "{src}");
    }
    for src in [
        "FORMULA: X LT 100 BY X * 2",
        "FORMULA: X GT 0 AND X LT 50 BY X + 3",
    ] {
        let ast = parse_formula(src).unwrap();
        assert_eq!(ast, parse_formula(&ast.to_string()).unwrap(), "{src}");
    }
    for src in ["MATCH: ALL", "MATCH: AS 'ok'", "MATCH: GE 10, FOR KV"] {
        let ast = parse_match(src).unwrap();
        assert_eq!(ast, parse_match(&ast.to_string()).unwrap(), "{src}");
    }
}
