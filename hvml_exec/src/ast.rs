//! ASTs for the four mini-grammars, with printers.
//!
//! Every node implements `Display` such that re-parsing the printed text
//! yields an equal AST. The printers emit one canonical spacing; the
//! parsers accept arbitrary whitespace.

use crate::pattern::Pattern;
use hvml_core::Variant;
use std::fmt;

// =============================================================================
// Shared Pieces
// =============================================================================

/// The `FOR` clause selecting what an executor emits per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForClause {
    /// Emit `{key, value}` objects.
    Kv,
    /// Emit keys.
    Key,
    /// Emit values.
    Value,
}

impl fmt::Display for ForClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Kv => "KV",
            Self::Key => "KEY",
            Self::Value => "VALUE",
        })
    }
}

/// Numeric comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumCmp {
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `!=`
    Ne,
    /// `==`
    Eq,
}

impl NumCmp {
    /// Apply the comparator.
    #[must_use]
    pub fn eval(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Gt => left > right,
            Self::Le => left <= right,
            Self::Ge => left >= right,
            Self::Ne => left != right,
            Self::Eq => left == right,
        }
    }

    /// Parse the keyword spelling.
    #[must_use]
    pub fn from_word(w: &str) -> Option<Self> {
        match w {
            "LT" => Some(Self::Lt),
            "GT" => Some(Self::Gt),
            "LE" => Some(Self::Le),
            "GE" => Some(Self::Ge),
            "NE" => Some(Self::Ne),
            "EQ" => Some(Self::Eq),
            _ => None,
        }
    }
}

impl fmt::Display for NumCmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lt => "LT",
            Self::Gt => "GT",
            Self::Le => "LE",
            Self::Ge => "GE",
            Self::Ne => "NE",
            Self::Eq => "EQ",
        })
    }
}

/// A string matching rule: `LIKE pattern` or `AS literal`.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchingRule {
    /// Pattern match.
    Like(Pattern),
    /// Exact literal.
    As(String),
}

impl MatchingRule {
    /// Match `candidate`.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Like(p) => p.matches(candidate),
            Self::As(lit) => candidate == lit,
        }
    }
}

impl fmt::Display for MatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like(p) => write!(f, "LIKE {p}"),
            Self::As(lit) => write!(f, "AS '{lit}'"),
        }
    }
}

/// One numeric rule of a `FILTER`.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberRule {
    /// The comparator.
    pub cmp: NumCmp,
    /// The right-hand constant.
    pub value: f64,
}

impl fmt::Display for NumberRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cmp, self.value)
    }
}

// =============================================================================
// FILTER
// =============================================================================

/// The body of a `FILTER` rule.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterBody {
    /// Accept everything.
    All,
    /// Conjunction of numeric comparisons.
    Numbers(Vec<NumberRule>),
    /// One string matching rule.
    Matching(MatchingRule),
}

/// A parsed `FILTER:` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    /// What to accept.
    pub body: FilterBody,
    /// What to emit per accepted entry.
    pub for_clause: Option<ForClause>,
}

impl FilterRule {
    /// Whether `value` passes the filter.
    #[must_use]
    pub fn accepts(&self, value: &Variant) -> bool {
        match &self.body {
            FilterBody::All => true,
            FilterBody::Numbers(rules) => match value.cast_to_number(true) {
                Ok(n) => rules.iter().all(|r| r.cmp.eval(n, r.value)),
                Err(_) => false,
            },
            FilterBody::Matching(rule) => rule.matches(&value.stringify()),
        }
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FILTER: ")?;
        match &self.body {
            FilterBody::All => f.write_str("ALL")?,
            FilterBody::Numbers(rules) => {
                for (i, r) in rules.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{r}")?;
                }
            }
            FilterBody::Matching(rule) => write!(f, "{rule}")?,
        }
        if let Some(fc) = self.for_clause {
            write!(f, ", FOR {fc}")?;
        }
        Ok(())
    }
}

// =============================================================================
// KEY
// =============================================================================

/// The body of a `KEY` rule.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyBody {
    /// Accept every key.
    All,
    /// Accept keys matching the rule.
    Matching(MatchingRule),
}

/// A parsed `KEY:` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRule {
    /// Which keys to accept.
    pub body: KeyBody,
    /// What to emit per accepted key.
    pub for_clause: Option<ForClause>,
}

impl KeyRule {
    /// Whether `key` is accepted.
    #[must_use]
    pub fn accepts(&self, key: &str) -> bool {
        match &self.body {
            KeyBody::All => true,
            KeyBody::Matching(rule) => rule.matches(key),
        }
    }
}

impl fmt::Display for KeyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KEY: ")?;
        match &self.body {
            KeyBody::All => f.write_str("ALL")?,
            KeyBody::Matching(rule) => write!(f, "{rule}")?,
        }
        if let Some(fc) = self.for_clause {
            write!(f, ", FOR {fc}")?;
        }
        Ok(())
    }
}

// =============================================================================
// FORMULA
// =============================================================================

/// Arithmetic binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        })
    }
}

/// Arithmetic expression over numbers and iteration variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric constant.
    Num(f64),
    /// Iteration variable.
    Ident(String),
    /// Unary minus.
    Neg(Box<Expr>),
    /// Binary operation.
    Bin(Box<Expr>, BinOp, Box<Expr>),
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Self::Num(_) | Self::Ident(_) | Self::Neg(_) => 3,
            Self::Bin(_, op, _) => op.precedence(),
        }
    }

    /// Evaluate with `var` bound to `value`.
    #[must_use]
    pub fn eval(&self, var: &str, value: f64) -> f64 {
        match self {
            Self::Num(n) => *n,
            Self::Ident(name) => {
                if name == var {
                    value
                } else {
                    f64::NAN
                }
            }
            Self::Neg(inner) => -inner.eval(var, value),
            Self::Bin(l, op, r) => {
                let (a, b) = (l.eval(var, value), r.eval(var, value));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                }
            }
        }
    }

    /// The first iteration variable mentioned, if any.
    #[must_use]
    pub fn first_ident(&self) -> Option<&str> {
        match self {
            Self::Num(_) => None,
            Self::Ident(name) => Some(name),
            Self::Neg(inner) => inner.first_ident(),
            Self::Bin(l, _, r) => l.first_ident().or_else(|| r.first_ident()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Ident(name) => f.write_str(name),
            Self::Neg(inner) => {
                if inner.precedence() < 3 {
                    write!(f, "-({inner})")
                } else {
                    write!(f, "-{inner}")
                }
            }
            Self::Bin(l, op, r) => {
                // Parenthesize children that bind looser, and the right
                // child of a same-precedence non-associative position.
                if l.precedence() < op.precedence() {
                    write!(f, "({l})")?;
                } else {
                    write!(f, "{l}")?;
                }
                write!(f, " {op} ")?;
                if r.precedence() <= op.precedence() {
                    write!(f, "({r})")?;
                } else {
                    write!(f, "{r}")?;
                }
                Ok(())
            }
        }
    }
}

/// One comparison of a formula condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Left expression.
    pub left: Expr,
    /// Comparator.
    pub cmp: NumCmp,
    /// Right expression.
    pub right: Expr,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.cmp, self.right)
    }
}

/// Logical combination of comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalExpr {
    /// A single comparison.
    Cmp(Comparison),
    /// Conjunction.
    And(Box<LogicalExpr>, Box<LogicalExpr>),
    /// Disjunction.
    Or(Box<LogicalExpr>, Box<LogicalExpr>),
}

impl LogicalExpr {
    /// Evaluate with `var` bound to `value`.
    #[must_use]
    pub fn eval(&self, var: &str, value: f64) -> bool {
        match self {
            Self::Cmp(c) => c.cmp.eval(c.left.eval(var, value), c.right.eval(var, value)),
            Self::And(a, b) => a.eval(var, value) && b.eval(var, value),
            Self::Or(a, b) => a.eval(var, value) || b.eval(var, value),
        }
    }

    /// The first iteration variable mentioned, if any.
    #[must_use]
    pub fn first_ident(&self) -> Option<&str> {
        match self {
            Self::Cmp(c) => c.left.first_ident().or_else(|| c.right.first_ident()),
            Self::And(a, b) | Self::Or(a, b) => a.first_ident().or_else(|| b.first_ident()),
        }
    }
}

impl fmt::Display for LogicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cmp(c) => write!(f, "{c}"),
            Self::And(a, b) => write!(f, "{a} AND {b}"),
            Self::Or(a, b) => write!(f, "{a} OR {b}"),
        }
    }
}

/// A parsed `FORMULA:` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRule {
    /// Continue-while condition over the iteration variable.
    pub condition: LogicalExpr,
    /// Next-value expression.
    pub by: Expr,
}

impl FormulaRule {
    /// The iteration variable's name.
    #[must_use]
    pub fn variable(&self) -> &str {
        self.condition
            .first_ident()
            .or_else(|| self.by.first_ident())
            .unwrap_or("X")
    }
}

impl fmt::Display for FormulaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FORMULA: {} BY {}", self.condition, self.by)
    }
}

// =============================================================================
// MATCH
// =============================================================================

/// The body of a `MATCH` rule.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchBody {
    /// Accept any value.
    All,
    /// Exact literal against the stringified value.
    As(String),
    /// Pattern against the stringified value.
    Like(Pattern),
    /// Numeric comparison against the value.
    Cmp(NumCmp, f64),
}

/// A parsed `MATCH:` rule, used by the `match` tag.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRule {
    /// The comparison body.
    pub body: MatchBody,
    /// Optional `FOR` clause.
    pub for_clause: Option<ForClause>,
}

impl MatchRule {
    /// Whether `value` satisfies the rule.
    #[must_use]
    pub fn matches(&self, value: &Variant) -> bool {
        match &self.body {
            MatchBody::All => true,
            MatchBody::As(lit) => value.stringify() == *lit,
            MatchBody::Like(p) => p.matches(&value.stringify()),
            MatchBody::Cmp(cmp, rhs) => match value.cast_to_number(true) {
                Ok(n) => cmp.eval(n, *rhs),
                Err(_) => false,
            },
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MATCH: ")?;
        match &self.body {
            MatchBody::All => f.write_str("ALL")?,
            MatchBody::As(lit) => write!(f, "AS '{lit}'")?,
            MatchBody::Like(p) => write!(f, "LIKE {p}")?,
            MatchBody::Cmp(cmp, n) => write!(f, "{cmp} {n}")?,
        }
        if let Some(fc) = self.for_clause {
            write!(f, ", FOR {fc}")?;
        }
        Ok(())
    }
}
