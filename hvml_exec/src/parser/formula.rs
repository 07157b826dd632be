//! `FORMULA : logical-of-number-comparisons BY iterative-formula-expression`
//!
//! Expressions are standard arithmetic (`+ - * /`, unary minus,
//! parentheses); identifiers denote iteration variables. `AND` and `OR`
//! combine comparisons left-associatively.

use super::is_keyword;
use crate::ast::{BinOp, Comparison, Expr, FormulaRule, LogicalExpr, NumCmp};
use crate::lexer::{TokenKind, TokenStream};
use hvml_core::{CoreError, CoreResult};

/// Parse a `FORMULA:` rule.
pub fn parse_formula(input: &str) -> CoreResult<FormulaRule> {
    let mut ts = TokenStream::new(input)?;
    ts.expect_word("FORMULA")?;
    ts.expect(TokenKind::Colon)?;

    let condition = parse_logical(&mut ts)?;
    ts.expect_word("BY")?;
    let by = parse_expr(&mut ts)?;
    ts.expect_eof()?;

    Ok(FormulaRule { condition, by })
}

fn parse_logical(ts: &mut TokenStream) -> CoreResult<LogicalExpr> {
    let mut lhs = LogicalExpr::Cmp(parse_comparison(ts)?);
    loop {
        if ts.eat_word("AND") {
            let rhs = parse_comparison(ts)?;
            lhs = LogicalExpr::And(Box::new(lhs), Box::new(LogicalExpr::Cmp(rhs)));
        } else if ts.eat_word("OR") {
            let rhs = parse_comparison(ts)?;
            lhs = LogicalExpr::Or(Box::new(lhs), Box::new(LogicalExpr::Cmp(rhs)));
        } else {
            return Ok(lhs);
        }
    }
}

fn parse_comparison(ts: &mut TokenStream) -> CoreResult<Comparison> {
    let left = parse_expr(ts)?;
    let word = ts.expect(TokenKind::Word)?;
    let cmp = NumCmp::from_word(&word.text).ok_or_else(|| {
        CoreError::bad_arg(format!("expected a comparator, found '{}'", word.text))
    })?;
    let right = parse_expr(ts)?;
    Ok(Comparison { left, cmp, right })
}

fn parse_expr(ts: &mut TokenStream) -> CoreResult<Expr> {
    let mut lhs = parse_term(ts)?;
    loop {
        let op = match ts.peek().kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            _ => return Ok(lhs),
        };
        ts.next();
        let rhs = parse_term(ts)?;
        lhs = Expr::Bin(Box::new(lhs), op, Box::new(rhs));
    }
}

fn parse_term(ts: &mut TokenStream) -> CoreResult<Expr> {
    let mut lhs = parse_factor(ts)?;
    loop {
        let op = match ts.peek().kind {
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            _ => return Ok(lhs),
        };
        ts.next();
        let rhs = parse_factor(ts)?;
        lhs = Expr::Bin(Box::new(lhs), op, Box::new(rhs));
    }
}

fn parse_factor(ts: &mut TokenStream) -> CoreResult<Expr> {
    match ts.peek().kind {
        TokenKind::Minus => {
            ts.next();
            Ok(Expr::Neg(Box::new(parse_factor(ts)?)))
        }
        TokenKind::Number => {
            let t = ts.next();
            Ok(Expr::Num(t.number))
        }
        TokenKind::LParen => {
            ts.next();
            let inner = parse_expr(ts)?;
            ts.expect(TokenKind::RParen)?;
            Ok(inner)
        }
        TokenKind::Word if !is_keyword(&ts.peek().text) => {
            let t = ts.next();
            Ok(Expr::Ident(t.text))
        }
        _ => Err(CoreError::bad_arg(format!(
            "expected an operand, found '{}'",
            ts.peek()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let rule = parse_formula("FORMULA: X LT 100 BY X * 2").unwrap();
        assert_eq!(rule.variable(), "X");
        assert!(rule.condition.eval("X", 99.0));
        assert!(!rule.condition.eval("X", 100.0));
        assert_eq!(rule.by.eval("X", 3.0), 6.0);
    }

    #[test]
    fn test_parse_logical_and_precedence() {
        let rule = parse_formula("FORMULA: X GT 0 AND X LT 10 BY X + 1").unwrap();
        assert!(rule.condition.eval("X", 5.0));
        assert!(!rule.condition.eval("X", 0.0));
        assert!(!rule.condition.eval("X", 10.0));
    }

    #[test]
    fn test_parens_and_unary_minus() {
        let rule = parse_formula("FORMULA: X GE -5 BY (X + 1) * 2").unwrap();
        assert_eq!(rule.by.eval("X", 2.0), 6.0);
        assert!(rule.condition.eval("X", -5.0));
        assert!(!rule.condition.eval("X", -6.0));
    }

    #[test]
    fn test_print_parse_roundtrip() {
        for src in [
            "FORMULA: X LT 100 BY X * 2",
            "FORMULA: X GT 0 AND X LT 10 OR X EQ 42 BY X + 1",
            "FORMULA: X GE -5 BY (X + 1) * 2",
            "FORMULA: X NE 0 BY X - X / 2",
        ] {
            let ast = parse_formula(src).unwrap();
            let printed = ast.to_string();
            let reparsed = parse_formula(&printed).unwrap();
            assert_eq!(ast, reparsed, "roundtrip failed: {src} -> {printed}");
        }
    }
}
