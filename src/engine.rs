//! The compiled export definition (§3 `Engine`, `FieldTemplate`,
//! `ForeachBlock`) and the per-request bundle (`ExportWorkset`).
//!
//! An [`Engine`] is immutable once parsed and may be shared across workers
//! (§5: "the Engine itself is read-only after parsing and may be shared
//! across workers as an immutable value"). [`crate::populate`] is the only
//! module that turns an `Engine` plus a record into field output, and it
//! never mutates the templates it walks — each record gets a fresh
//! deep-copied evaluation, never a mutated template (§5's most emphasized
//! invariant).

use crate::ast::Expr;
use crate::leader::LeaderTemplate;
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

/// A single `name = expression` entry from `JSON EXTRACTED PROPERTIES`,
/// with its optional `::DEFAULT` fallback literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Extractor {
    /// The expression evaluated against the current record.
    pub expression: Expr,
    /// Literal substituted when evaluation fails, if one was declared.
    pub default: Option<String>,
}

/// One `(subfield_code, expression)` pair declared by `SUBFIELD:` or
/// `EACH-SUBFIELD:`.
pub type SubfieldTemplate = (String, Expr);

/// Most fields declare four or fewer subfields; inline storage avoids an
/// allocation for the common case (the same trade-off the teacher library
/// makes for its own `Field::subfields`).
pub type SubfieldTemplates = SmallVec<[SubfieldTemplate; 4]>;

/// The body shape of one [`FieldTemplate`] (§3: fixed-content, subfield, or
/// foreach field).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBody {
    /// `CONTENT:` — a single expression rendered verbatim.
    Content(Expr),
    /// One or more `SUBFIELD:` pairs, in declaration order.
    Subfields(SubfieldTemplates),
    /// A `FOR EACH:` repeating group.
    Foreach(ForeachBlock),
}

/// A field whose body repeats over a list-valued extractor (§3
/// `ForeachBlock`).
#[derive(Debug, Clone, PartialEq)]
pub struct ForeachBlock {
    /// The local name bound to each item, e.g. `track`.
    pub item_alias: String,
    /// The extracted variable this alias iterates over.
    pub source_key: String,
    /// `EACH-SUBFIELD:` pairs; expressions may reference
    /// `<item_alias>::<attribute>`.
    pub subfields: SubfieldTemplates,
    /// `SORT BY:` keys. Only the first is honored (§9 open question c);
    /// the list form is preserved for a future cascade.
    pub sort_by: Vec<String>,
    /// `EACH-PREFIX:` literal inserted before the repeating groups.
    pub prefix: Option<Expr>,
    /// `EACH-SUFFIX:` literal inserted after the repeating groups.
    pub suffix: Option<Expr>,
    /// Deprecated `DEMARC WITH:` literal — rendered identically to
    /// `suffix` (§9 open question d).
    pub demarc: Option<Expr>,
}

/// One `FIELD:` declaration (§3 `FieldTemplate`).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTemplate {
    /// The 3-character MARC tag.
    pub tag: String,
    /// First indicator; blank is stored as `' '`.
    pub indicator_1: char,
    /// Second indicator; blank is stored as `' '`.
    pub indicator_2: char,
    /// The field's body.
    pub body: FieldBody,
    /// Terminator appended in MARC-text/ISO 2709 output; `None` means no
    /// terminator (`TERMINATE DATA WITH: NOTHING`/`NONE`/`""`).
    pub terminator: Option<String>,
    /// `EXPORT WHEN:` — field is skipped unless this evaluates truthy.
    pub export_if: Option<Expr>,
    /// `EXPORT UNLESS:` — field is skipped if this evaluates truthy.
    pub export_if_not: Option<Expr>,
}

impl FieldTemplate {
    /// A field template with no indicators, no guard, and the default `.`
    /// terminator, ready for its body to be filled in by the parser.
    #[must_use]
    pub fn new(tag: String, body: FieldBody) -> Self {
        FieldTemplate {
            tag,
            indicator_1: ' ',
            indicator_2: ' ',
            body,
            terminator: Some(".".to_string()),
            export_if: None,
            export_if_not: None,
        }
    }
}

/// The compiled, immutable export definition (§3 `Engine`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Engine {
    /// Collection-parameter names every request must supply exactly
    /// (§8 P8).
    pub known_parameters: IndexSet<String>,
    /// Declared function signatures, kept for informational purposes only
    /// — the evaluator dispatches built-ins by name independent of this
    /// map.
    pub functions: IndexMap<String, String>,
    /// Ordered extractors; later extractors may reference earlier ones by
    /// name once they are in the per-record variable map.
    pub json_extractors: IndexMap<String, Extractor>,
    /// The optional Leader override block, pre-rendered at parse time.
    pub leader_template: Option<LeaderTemplate>,
    /// Field templates in declaration order (§8 P4).
    pub field_templates: Vec<FieldTemplate>,
}

impl Engine {
    /// An Engine with no parameters, extractors, leader override, or field
    /// templates — the starting point for the DSL parser to fill in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The per-request bundle: Engine, requested serialization, collection
/// parameters, and records (§3 `ExportWorkset`).
///
/// Constructed once by request resolution and consumed once; it carries no
/// behavior of its own beyond what [`crate::workset`] does with it.
#[derive(Debug, Clone)]
pub struct ExportWorkset {
    /// The compiled export definition.
    pub engine: Engine,
    /// One of the `requested_serialization.serialization-name` values
    /// (§6), already validated against the engine's expectations.
    pub serialization: crate::workset::Serialization,
    /// Collection-wide parameters; key set must equal
    /// `engine.known_parameters` (§8 P8).
    pub collection_info: IndexMap<String, crate::value::Value>,
    /// Input records, opaque to the engine beyond extractor access.
    pub records: Vec<crate::value::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_default_is_empty() {
        let engine = Engine::new();
        assert!(engine.known_parameters.is_empty());
        assert!(engine.field_templates.is_empty());
    }

    #[test]
    fn field_template_new_has_default_terminator() {
        let template = FieldTemplate::new(
            "001".to_string(),
            FieldBody::Content(Expr::Name("control_number".to_string())),
        );
        assert_eq!(template.terminator, Some(".".to_string()));
        assert_eq!(template.indicator_1, ' ');
    }
}
