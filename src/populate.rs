//! Per-record evaluation: the extract phase, field phase, and foreach
//! resolution of §4.3.
//!
//! [`populate_record`] never mutates the [`Engine`]'s templates — each call
//! walks them by shared reference and builds a fresh [`PopulatedField`]
//! list, satisfying the "templates are pure" invariant (§5, §8 P7). A
//! per-record evaluation failure never aborts the record: it is recorded as
//! an [`EvalDiagnostic`] and the offending field (or extractor) is skipped,
//! per §7's "per-record evaluation failures" policy.

use crate::engine::{Engine, FieldBody, FieldTemplate, ForeachBlock};
use crate::evaluator::{self, Env};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;

/// One entry in a rendered `FOR EACH` group: either a literal marker
/// (`EACH-PREFIX`/`EACH-SUFFIX`/`DEMARC WITH`) or a rendered subfield.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GroupEntry {
    /// A group-prefix, group-suffix, or demarcator literal, in rendered
    /// form, emitted verbatim by both serializers.
    Marker(String),
    /// A rendered `(code, value)` subfield pair.
    Subfield(String, String),
}

/// The body of one populated field (§3 `Populated Field`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PopulatedBody {
    /// A fixed-content field's rendered string, or the pre-rendered Leader
    /// literal.
    Content(String),
    /// A subfielded field's rendered `(code, value)` pairs, in declaration
    /// order.
    Subfields(SmallVec<[(String, String); 4]>),
    /// A foreach field's rendered groups, in sorted item order.
    Foreach(Vec<Vec<GroupEntry>>),
}

/// The evaluation result of one [`FieldTemplate`] against one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulatedField {
    /// `"LDR"` for the Leader pseudo-field, otherwise the MARC tag.
    pub tag: String,
    /// First indicator, or `' '` for the Leader.
    pub indicator_1: char,
    /// Second indicator, or `' '` for the Leader.
    pub indicator_2: char,
    /// The field's rendered body.
    pub body: PopulatedBody,
    /// Terminator to append, if any.
    pub terminator: Option<String>,
}

/// A recovered per-record evaluation failure (§7 kind 3).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalDiagnostic {
    /// The field tag the failure occurred in, or `None` for an extractor
    /// failure (which has no field context yet).
    pub tag: Option<String>,
    /// Human-readable description of the failure.
    pub message: String,
}

/// Evaluate every extractor and field template in `engine` against one
/// `record`, returning the populated fields in declaration order (the
/// Leader first, if the engine has one) plus any recovered diagnostics.
#[must_use]
pub fn populate_record(engine: &Engine, record: &Value) -> (Vec<PopulatedField>, Vec<EvalDiagnostic>) {
    let mut diagnostics = Vec::new();
    let vars = extract_phase(engine, record, &mut diagnostics);

    let mut fields = Vec::new();
    if let Some(leader) = &engine.leader_template {
        fields.push(PopulatedField {
            tag: "LDR".to_string(),
            indicator_1: ' ',
            indicator_2: ' ',
            body: PopulatedBody::Content(leader.render()),
            terminator: None,
        });
    }

    for template in &engine.field_templates {
        match populate_field(template, &vars) {
            Ok(Some(field)) => fields.push(field),
            Ok(None) => {},
            Err(message) => diagnostics.push(EvalDiagnostic {
                tag: Some(template.tag.clone()),
                message,
            }),
        }
    }

    (fields, diagnostics)
}

fn extract_phase(
    engine: &Engine,
    record: &Value,
    diagnostics: &mut Vec<EvalDiagnostic>,
) -> IndexMap<String, Value> {
    let mut vars: IndexMap<String, Value> = IndexMap::new();
    if let Value::Map(fields) = record {
        for (k, v) in fields {
            vars.insert(k.clone(), v.clone());
        }
    }

    for (name, extractor) in &engine.json_extractors {
        match evaluator::eval(&extractor.expression, &Env::new(&vars)) {
            Ok(value) => {
                vars.insert(name.clone(), value);
            },
            Err(err) => {
                let value = match &extractor.default {
                    Some(default) => Value::String(default.clone()),
                    None => {
                        diagnostics.push(EvalDiagnostic {
                            tag: None,
                            message: format!("extractor '{name}' failed: {err}"),
                        });
                        Value::String(String::new())
                    },
                };
                vars.insert(name.clone(), value);
            },
        }
    }
    vars
}

fn populate_field(
    template: &FieldTemplate,
    vars: &IndexMap<String, Value>,
) -> Result<Option<PopulatedField>, String> {
    let env = Env::new(vars);

    if let Some(guard) = &template.export_if {
        match evaluator::eval(guard, &env) {
            Ok(value) if !value_is_truthy(&value) => return Ok(None),
            Ok(_) => {},
            Err(err) => return Err(format!("EXPORT WHEN failed: {err}")),
        }
    }
    if let Some(guard) = &template.export_if_not {
        match evaluator::eval(guard, &env) {
            Ok(value) if value_is_truthy(&value) => return Ok(None),
            Ok(_) => {},
            Err(err) => return Err(format!("EXPORT UNLESS failed: {err}")),
        }
    }

    let body = match &template.body {
        FieldBody::Content(expr) => {
            let value = evaluator::eval(expr, &env).map_err(|e| e.to_string())?;
            PopulatedBody::Content(value.display_string())
        },
        FieldBody::Subfields(subfields) => {
            let mut rendered = SmallVec::with_capacity(subfields.len());
            for (code, expr) in subfields {
                let value = evaluator::eval(expr, &env).map_err(|e| e.to_string())?;
                rendered.push((code.clone(), value.display_string()));
            }
            PopulatedBody::Subfields(rendered)
        },
        FieldBody::Foreach(foreach) => PopulatedBody::Foreach(resolve_foreach(foreach, vars)?),
    };

    Ok(Some(PopulatedField {
        tag: template.tag.clone(),
        indicator_1: template.indicator_1,
        indicator_2: template.indicator_2,
        body,
        terminator: template.terminator.clone(),
    }))
}

fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => other.has_value(),
    }
}

fn resolve_foreach(
    foreach: &ForeachBlock,
    vars: &IndexMap<String, Value>,
) -> Result<Vec<Vec<GroupEntry>>, String> {
    let items = match vars.get(&foreach.source_key) {
        Some(Value::List(items)) => items.clone(),
        Some(_) | None => Vec::new(),
    };

    let mut indexed: Vec<(usize, Value)> = items.into_iter().enumerate().collect();
    if let Some(sort_key) = foreach.sort_by.first() {
        let alias = foreach.item_alias.as_str();
        let sort_expr = crate::expr_parser::parse_expression(sort_key)
            .map_err(|e| format!("SORT BY expression invalid: {e}"))?;
        let mut keyed: Vec<(SortKey, usize, Value)> = Vec::with_capacity(indexed.len());
        for (i, item) in indexed {
            let item_env = Env::with_item(vars, alias, &item);
            let key_value = evaluator::eval(&sort_expr, &item_env).map_err(|e| e.to_string())?;
            keyed.push((SortKey::from_value(&key_value), i, item));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        indexed = keyed.into_iter().map(|(_, i, item)| (i, item)).collect();
    }

    let group_env = Env::new(vars);
    let prefix = render_marker(&foreach.prefix, &group_env)?;
    let suffix = render_marker(&foreach.suffix, &group_env)?;
    let demarc = render_marker(&foreach.demarc, &group_env)?;

    let mut groups = Vec::with_capacity(indexed.len());
    for (_, item) in indexed {
        let item_env = Env::with_item(vars, foreach.item_alias.as_str(), &item);
        let mut entries = Vec::new();
        if let Some(p) = &prefix {
            entries.push(GroupEntry::Marker(p.clone()));
        }
        for (code, expr) in &foreach.subfields {
            let value = evaluator::eval(expr, &item_env).map_err(|e| e.to_string())?;
            entries.push(GroupEntry::Subfield(code.clone(), value.display_string()));
        }
        if let Some(s) = &suffix {
            entries.push(GroupEntry::Marker(s.clone()));
        }
        if let Some(d) = &demarc {
            entries.push(GroupEntry::Marker(d.clone()));
        }
        groups.push(entries);
    }
    Ok(groups)
}

fn render_marker(expr: &Option<crate::ast::Expr>, env: &Env<'_>) -> Result<Option<String>, String> {
    match expr {
        Some(e) => evaluator::eval(e, env)
            .map(|v| Some(v.display_string()))
            .map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

/// An orderable projection of a `SORT BY` key's evaluated value: numeric
/// when possible, else lexicographic on its display text.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    fn from_value(value: &Value) -> Self {
        match value.as_number() {
            Some(n) => SortKey::Number(n),
            None => SortKey::Text(value.display_string()),
        }
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => {
                a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
            },
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Text(b)) => a.to_string().cmp(b),
            (SortKey::Text(a), SortKey::Number(b)) => a.cmp(&b.to_string()),
        }
    }
}
