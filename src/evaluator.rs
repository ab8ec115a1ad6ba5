//! Tree-walking evaluator for the rewritten [`Expr`] AST (§4.3, §9 design
//! notes).
//!
//! Per-record state is an explicit `{name → Value}` environment — there is
//! no implicit scope. A `FOR EACH` body additionally carries one *item
//! scope*: a single `(alias, item)` pair consulted when a name takes the
//! `alias::attribute` form.

use crate::ast::{BinOp, Expr};
use crate::builtins;
use crate::error::{MarcoutError, Result};
use crate::value::Value;
use indexmap::IndexMap;

/// The name-to-value bindings visible while evaluating one expression.
pub struct Env<'a> {
    vars: &'a IndexMap<String, Value>,
    item: Option<(&'a str, &'a Value)>,
}

impl<'a> Env<'a> {
    /// Build an environment with no active `FOR EACH` item scope.
    #[must_use]
    pub fn new(vars: &'a IndexMap<String, Value>) -> Self {
        Env { vars, item: None }
    }

    /// Build an environment scoped to one `FOR EACH` item, addressable as
    /// `alias::attribute`.
    #[must_use]
    pub fn with_item(vars: &'a IndexMap<String, Value>, alias: &'a str, item: &'a Value) -> Self {
        Env {
            vars,
            item: Some((alias, item)),
        }
    }

    fn resolve(&self, name: &str) -> Option<Value> {
        if let Some((alias, item)) = self.item {
            if let Some(attr) = name.strip_prefix(alias).and_then(|r| r.strip_prefix("::")) {
                return item.get(attr).cloned();
            }
        }
        self.vars.get(name).cloned()
    }
}

/// Evaluate an expression against an environment.
///
/// # Errors
///
/// Returns [`MarcoutError::Evaluation`] if a [`Expr::Name`] is unbound or a
/// [`Expr::Call`] names an unrecognized built-in.
pub fn eval(expr: &Expr, env: &Env<'_>) -> Result<Value> {
    match expr {
        Expr::StringLit(s) => Ok(Value::String(s.clone())),
        Expr::NumberLit(n) => Ok(Value::Number(*n)),
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::Nothing => Ok(Value::Null),
        Expr::Name(name) => env
            .resolve(name)
            .ok_or_else(|| MarcoutError::Evaluation(format!("undefined name: {name}"))),
        Expr::Concat(a, b) => {
            let a = eval(a, env)?;
            let b = eval(b, env)?;
            Ok(Value::String(format!(
                "{}{}",
                a.display_string(),
                b.display_string()
            )))
        },
        Expr::Binary(op, a, b) => {
            let a = eval(a, env)?;
            let b = eval(b, env)?;
            let equal = values_equal(&a, &b);
            let result = match op {
                BinOp::Eq => equal,
                BinOp::Ne => !equal,
            };
            Ok(Value::Bool(result))
        },
        Expr::Call(name, arg_exprs) => {
            let args: Vec<Value> = arg_exprs.iter().map(|a| eval(a, env)).collect::<Result<_>>()?;
            builtins::call(name, &args)
                .ok_or_else(|| MarcoutError::Evaluation(format!("unknown function: {name}")))
        },
    }
}

/// Compare two evaluated values the way `IS`/`IS_NOT` expect: numbers
/// compare numerically, everything else compares by display text so that a
/// quoted string literal and an extracted field both rendered the same way
/// (e.g. `collection_code IS "test"`) are equal regardless of underlying
/// `Value` variant.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x - y).abs() < f64::EPSILON,
        _ => a.display_string() == b.display_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr_parser::parse_expression;

    fn env_with(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn evaluates_name_lookup() {
        let vars = env_with(&[("album_title", Value::String("Pillow".to_string()))]);
        let env = Env::new(&vars);
        let expr = parse_expression("album_title").unwrap();
        assert_eq!(eval(&expr, &env).unwrap(), Value::String("Pillow".to_string()));
    }

    #[test]
    fn undefined_name_is_an_error() {
        let vars = IndexMap::new();
        let env = Env::new(&vars);
        let expr = parse_expression("missing").unwrap();
        assert!(eval(&expr, &env).is_err());
    }

    #[test]
    fn evaluates_concat() {
        let vars = env_with(&[("b", Value::String("x".to_string()))]);
        let env = Env::new(&vars);
        let expr = parse_expression("\"a\" + b").unwrap();
        assert_eq!(eval(&expr, &env).unwrap(), Value::String("ax".to_string()));
    }

    #[test]
    fn evaluates_is_comparison_scenario_s4() {
        let vars = env_with(&[("collection_code", Value::String("test".to_string()))]);
        let env = Env::new(&vars);
        let expr = parse_expression("collection_code IS \"test\"").unwrap();
        assert_eq!(eval(&expr, &env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn evaluates_call_to_builtin() {
        let vars = env_with(&[("artist", Value::String("Mischa Lively".to_string()))]);
        let env = Env::new(&vars);
        let expr = parse_expression("biblio_name(artist)").unwrap();
        assert_eq!(
            eval(&expr, &env).unwrap(),
            Value::String("Lively, Mischa".to_string())
        );
    }

    #[test]
    fn resolves_item_scoped_name_in_foreach() {
        let vars = IndexMap::new();
        let mut item = IndexMap::new();
        item.insert("title".to_string(), Value::String("Track One".to_string()));
        let item_value = Value::Map(item);
        let env = Env::with_item(&vars, "track", &item_value);
        let expr = parse_expression("track::title").unwrap();
        assert_eq!(
            eval(&expr, &env).unwrap(),
            Value::String("Track One".to_string())
        );
    }
}
