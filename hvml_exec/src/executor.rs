//! The executor surface driven by iterating tags.
//!
//! An executor is created over an input variant, then driven with rule
//! text: `choose` collects every match at once, `it_begin`/`it_next`
//! iterate one value at a time (passing `None` to `it_next` reuses the
//! current rule), and `reduce` folds the matches into a summary object
//! `{count, sum, avg, max, min}`.

use crate::ast::{FilterRule, ForClause, FormulaRule, KeyRule};
use crate::parser::{parse_filter, parse_formula, parse_key};
use hvml_core::{CoreError, CoreResult, Variant, VariantKind};

/// Iteration cap guarding runaway formula rules.
const MAX_FORMULA_STEPS: usize = 1 << 16;

/// A stateless-grammar executor instance bound to one input.
pub trait Executor {
    /// Collect every match under `rule` into an array.
    fn choose(&mut self, rule: &str) -> CoreResult<Variant>;

    /// Start (or restart) iteration under `rule`; the first value, if any.
    fn it_begin(&mut self, rule: &str) -> CoreResult<Option<Variant>>;

    /// Advance the iteration. A `Some(rule)` re-parses the rule mid-flight;
    /// `None` keeps the current one.
    fn it_next(&mut self, rule: Option<&str>) -> CoreResult<Option<Variant>>;

    /// Fold the matches into `{count, sum, avg, max, min}`.
    fn reduce(&mut self, rule: &str) -> CoreResult<Variant>;
}

/// Instantiate the executor named `name` over `input`.
///
/// Recognized names: `KEY`, `FILTER`, `FORMULA`.
pub fn create_executor(name: &str, input: Variant) -> CoreResult<Box<dyn Executor>> {
    match name {
        "KEY" => Ok(Box::new(KeyExecutor::new(input)?)),
        "FILTER" => Ok(Box::new(FilterExecutor::new(input))),
        "FORMULA" => Ok(Box::new(FormulaExecutor::new(input)?)),
        other => Err(CoreError::not_exists(format!("executor '{other}'"))),
    }
}

fn reduce_numbers(values: impl Iterator<Item = Variant>) -> Variant {
    let mut count: u64 = 0;
    let mut sum = 0.0;
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    for v in values {
        if let Ok(n) = v.cast_to_number(true) {
            count += 1;
            sum += n;
            max = max.max(n);
            min = min.min(n);
        }
    }
    let avg = if count > 0 { sum / count as f64 } else { 0.0 };
    let out = Variant::object();
    let _ = out.object_set("count", Variant::ulongint(count));
    let _ = out.object_set("sum", Variant::number(sum));
    let _ = out.object_set("avg", Variant::number(avg));
    let _ = out.object_set(
        "max",
        Variant::number(if count > 0 { max } else { 0.0 }),
    );
    let _ = out.object_set(
        "min",
        Variant::number(if count > 0 { min } else { 0.0 }),
    );
    out
}

fn emit_kv(key: &str, value: &Variant, clause: ForClause) -> Variant {
    match clause {
        ForClause::Key => Variant::string(key),
        ForClause::Value => value.clone(),
        ForClause::Kv => Variant::object_with([
            ("key", Variant::string(key)),
            ("value", value.clone()),
        ]),
    }
}

// =============================================================================
// KEY
// =============================================================================

/// Iterates the keys of an object under a `KEY:` rule.
pub struct KeyExecutor {
    input: Variant,
    rule: Option<KeyRule>,
    matched: Vec<(String, Variant)>,
    cursor: usize,
}

impl KeyExecutor {
    /// Bind the executor to an object input.
    pub fn new(input: Variant) -> CoreResult<Self> {
        if input.kind() != VariantKind::Object {
            return Err(CoreError::invalid_value("KEY executor needs an object"));
        }
        Ok(Self {
            input,
            rule: None,
            matched: Vec::new(),
            cursor: 0,
        })
    }

    fn apply_rule(&mut self, rule: &str) -> CoreResult<()> {
        let rule = parse_key(rule)?;
        self.matched = self
            .input
            .object_entries()
            .into_iter()
            .filter(|(k, _)| rule.accepts(k))
            .collect();
        self.rule = Some(rule);
        Ok(())
    }

    fn emit(&self, idx: usize) -> Option<Variant> {
        let (k, v) = self.matched.get(idx)?;
        let clause = self
            .rule
            .as_ref()
            .and_then(|r| r.for_clause)
            .unwrap_or(ForClause::Key);
        Some(emit_kv(k, v, clause))
    }
}

impl Executor for KeyExecutor {
    fn choose(&mut self, rule: &str) -> CoreResult<Variant> {
        self.apply_rule(rule)?;
        let out = Variant::array();
        for i in 0..self.matched.len() {
            out.array_append(self.emit(i).expect("index in range"))?;
        }
        Ok(out)
    }

    fn it_begin(&mut self, rule: &str) -> CoreResult<Option<Variant>> {
        self.apply_rule(rule)?;
        self.cursor = 0;
        Ok(self.emit(0))
    }

    fn it_next(&mut self, rule: Option<&str>) -> CoreResult<Option<Variant>> {
        if let Some(rule) = rule {
            self.apply_rule(rule)?;
        }
        self.cursor += 1;
        Ok(self.emit(self.cursor))
    }

    fn reduce(&mut self, rule: &str) -> CoreResult<Variant> {
        self.apply_rule(rule)?;
        Ok(reduce_numbers(
            self.matched.iter().map(|(_, v)| v.clone()),
        ))
    }
}

// =============================================================================
// FILTER
// =============================================================================

/// Filters the entries of an array or object under a `FILTER:` rule.
pub struct FilterExecutor {
    input: Variant,
    rule: Option<FilterRule>,
    matched: Vec<(Option<String>, Variant)>,
    cursor: usize,
}

impl FilterExecutor {
    /// Bind the executor to an array or object input.
    #[must_use]
    pub fn new(input: Variant) -> Self {
        Self {
            input,
            rule: None,
            matched: Vec::new(),
            cursor: 0,
        }
    }

    fn apply_rule(&mut self, rule: &str) -> CoreResult<()> {
        let rule = parse_filter(rule)?;
        self.matched = match self.input.kind() {
            VariantKind::Array => {
                let len = self.input.array_len();
                (0..len)
                    .filter_map(|i| self.input.array_get(i))
                    .filter(|v| rule.accepts(v))
                    .map(|v| (None, v))
                    .collect()
            }
            VariantKind::Object => self
                .input
                .object_entries()
                .into_iter()
                .filter(|(_, v)| rule.accepts(v))
                .map(|(k, v)| (Some(k), v))
                .collect(),
            VariantKind::Set => {
                let len = self.input.set_len();
                (0..len)
                    .filter_map(|i| self.input.set_get(i))
                    .filter(|v| rule.accepts(v))
                    .map(|v| (None, v))
                    .collect()
            }
            other => {
                return Err(CoreError::invalid_value(format!(
                    "FILTER executor cannot iterate a {other}"
                )));
            }
        };
        self.rule = Some(rule);
        Ok(())
    }

    fn emit(&self, idx: usize) -> Option<Variant> {
        let (k, v) = self.matched.get(idx)?;
        let clause = self
            .rule
            .as_ref()
            .and_then(|r| r.for_clause)
            .unwrap_or(ForClause::Value);
        Some(match k {
            Some(key) => emit_kv(key, v, clause),
            None => v.clone(),
        })
    }
}

impl Executor for FilterExecutor {
    fn choose(&mut self, rule: &str) -> CoreResult<Variant> {
        self.apply_rule(rule)?;
        let out = Variant::array();
        for i in 0..self.matched.len() {
            out.array_append(self.emit(i).expect("index in range"))?;
        }
        Ok(out)
    }

    fn it_begin(&mut self, rule: &str) -> CoreResult<Option<Variant>> {
        self.apply_rule(rule)?;
        self.cursor = 0;
        Ok(self.emit(0))
    }

    fn it_next(&mut self, rule: Option<&str>) -> CoreResult<Option<Variant>> {
        if let Some(rule) = rule {
            self.apply_rule(rule)?;
        }
        self.cursor += 1;
        Ok(self.emit(self.cursor))
    }

    fn reduce(&mut self, rule: &str) -> CoreResult<Variant> {
        self.apply_rule(rule)?;
        Ok(reduce_numbers(self.matched.iter().map(|(_, v)| v.clone())))
    }
}

// =============================================================================
// FORMULA
// =============================================================================

/// Generates a numeric series from a seed under a `FORMULA:` rule.
pub struct FormulaExecutor {
    seed: f64,
    rule: Option<FormulaRule>,
    current: Option<f64>,
}

impl FormulaExecutor {
    /// Bind the executor to a numeric seed.
    pub fn new(input: Variant) -> CoreResult<Self> {
        let seed = input.cast_to_number(true)?;
        Ok(Self {
            seed,
            rule: None,
            current: None,
        })
    }

    fn step(&mut self) -> Option<f64> {
        let rule = self.rule.as_ref()?;
        let var = rule.variable().to_owned();
        let next = match self.current {
            None => self.seed,
            Some(cur) => rule.by.eval(&var, cur),
        };
        if rule.condition.eval(&var, next) {
            self.current = Some(next);
            Some(next)
        } else {
            None
        }
    }
}

impl Executor for FormulaExecutor {
    fn choose(&mut self, rule: &str) -> CoreResult<Variant> {
        let mut values = Vec::new();
        let mut cur = self.it_begin(rule)?;
        while let Some(v) = cur {
            values.push(v);
            if values.len() >= MAX_FORMULA_STEPS {
                return Err(CoreError::not_allowed("formula series does not terminate"));
            }
            cur = self.it_next(None)?;
        }
        Ok(Variant::array_with(values))
    }

    fn it_begin(&mut self, rule: &str) -> CoreResult<Option<Variant>> {
        self.rule = Some(parse_formula(rule)?);
        self.current = None;
        Ok(self.step().map(Variant::number))
    }

    fn it_next(&mut self, rule: Option<&str>) -> CoreResult<Option<Variant>> {
        if let Some(rule) = rule {
            self.rule = Some(parse_formula(rule)?);
        }
        if self.current.is_none() {
            return Ok(None);
        }
        Ok(self.step().map(Variant::number))
    }

    fn reduce(&mut self, rule: &str) -> CoreResult<Variant> {
        let all = self.choose(rule)?;
        let len = all.array_len();
        Ok(reduce_numbers((0..len).filter_map(|i| all.array_get(i))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_object() -> Variant {
        Variant::object_with([
            ("alpha", Variant::longint(10)),
            ("beta", Variant::longint(20)),
            ("gamma", Variant::longint(30)),
        ])
    }

    #[test]
    fn test_key_choose_and_for_clauses() {
        let mut exec = create_executor("KEY", sample_object()).unwrap();
        let keys = exec.choose("KEY: ALL").unwrap();
        assert_eq!(keys.array_len(), 3);
        assert_eq!(keys.array_get(0).unwrap().stringify(), "alpha");

        let kv = exec.choose("KEY: LIKE '/a$/', FOR KV").unwrap();
        assert_eq!(kv.array_len(), 3);
        let first = kv.array_get(0).unwrap();
        assert_eq!(first.object_get("key").unwrap().stringify(), "alpha");
        assert_eq!(first.object_get("value").unwrap().as_i64(), Some(10));
    }

    #[test]
    fn test_key_iterate() {
        let mut exec = create_executor("KEY", sample_object()).unwrap();
        let mut seen = Vec::new();
        let mut cur = exec.it_begin("KEY: ALL, FOR VALUE").unwrap();
        while let Some(v) = cur {
            seen.push(v.as_i64().unwrap());
            cur = exec.it_next(None).unwrap();
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn test_key_reduce() {
        let mut exec = create_executor("KEY", sample_object()).unwrap();
        let stats = exec.reduce("KEY: ALL").unwrap();
        assert_eq!(stats.object_get("count").unwrap().as_u64(), Some(3));
        assert_eq!(stats.object_get("sum").unwrap().as_number(), Some(60.0));
        assert_eq!(stats.object_get("avg").unwrap().as_number(), Some(20.0));
        assert_eq!(stats.object_get("max").unwrap().as_number(), Some(30.0));
        assert_eq!(stats.object_get("min").unwrap().as_number(), Some(10.0));
    }

    #[test]
    fn test_filter_numbers_over_array() {
        let input = Variant::array_with((0..10).map(Variant::longint));
        let mut exec = create_executor("FILTER", input).unwrap();
        let chosen = exec.choose("FILTER: GE 3, LT 7").unwrap();
        let got: Vec<_> = (0..chosen.array_len())
            .map(|i| chosen.array_get(i).unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(got, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_filter_matching_over_object() {
        let input = Variant::object_with([
            ("a", Variant::string("foot")),
            ("b", Variant::string("hand")),
            ("c", Variant::string("food")),
        ]);
        let mut exec = create_executor("FILTER", input).unwrap();
        let keys = exec.choose("FILTER: LIKE '/^foo/', FOR KEY").unwrap();
        assert_eq!(keys.array_len(), 2);
        assert_eq!(keys.array_get(0).unwrap().stringify(), "a");
        assert_eq!(keys.array_get(1).unwrap().stringify(), "c");
    }

    #[test]
    fn test_formula_series() {
        let mut exec = create_executor("FORMULA", Variant::longint(1)).unwrap();
        let series = exec.choose("FORMULA: X LT 100 BY X * 2").unwrap();
        let got: Vec<_> = (0..series.array_len())
            .map(|i| series.array_get(i).unwrap().as_number().unwrap())
            .collect();
        assert_eq!(got, vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]);
    }

    #[test]
    fn test_unknown_executor() {
        assert!(create_executor("RANGE", Variant::null()).is_err());
    }
}
