#![warn(missing_docs)]

//! # marcout
//!
//! A template-driven export engine that transforms JSON record batches into
//! MARC 21 bibliographic records, serialized as human-readable MARC-text or
//! binary ISO 2709.
//!
//! An export definition is plain text in the MARCout DSL: a
//! `KNOWN PARAMETERS` block declaring collection-wide inputs, an optional
//! `FUNCTIONS` block, a `JSON EXTRACTED PROPERTIES` block pulling named
//! values out of each record, and a `MARC FIELD TEMPLATES` block describing
//! one or more MARC fields per template, each with its own content,
//! indicators, subfields, or repeating `FOR EACH` group.
//!
//! ## Quick Start
//!
//! ```
//! use marcout::{dsl_parser, populate, text};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = "\
//! JSON EXTRACTED PROPERTIES ----
//! control_number = control_number
//! MARC FIELD TEMPLATES ----
//! FIELD: 001
//! CONTENT: control_number
//! TERMINATE DATA WITH: NOTHING
//! ";
//! let engine = dsl_parser::parse(source)?;
//! let record = marcout::Value::from(&json!({"control_number": "nbb_a7ff441a"}));
//! let (fields, _diagnostics) = populate::populate_record(&engine, &record);
//! assert_eq!(text::serialize_record(&fields), "=001  nbb_a7ff441a\n\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`tokenizer`] — whitespace-preserving concatenation tokenizer (§4.1)
//! - [`ast`] — raw parse tree and keyword-to-operator rewrite (§4.2)
//! - [`expr_parser`] — phrase unification, lexer, and recursive-descent parser
//! - [`evaluator`] — tree-walking expression evaluator with record/item scope
//! - [`builtins`] — the DSL's built-in functions (§4.3)
//! - [`value`] — the runtime [`Value`] type shared by records and results
//! - [`engine`] — the compiled `Engine`/`FieldTemplate`/`ExportWorkset` model
//! - [`dsl_parser`] — export-definition text to a compiled [`Engine`]
//! - [`populate`] — per-record field population
//! - [`leader`] — 24-byte MARC Leader rendering and computed-field patching
//! - [`iso2709`] — ISO 2709 binary codec
//! - [`text`] — human-readable MARC-text serializer
//! - [`workset`] — unified request resolution and export orchestration
//! - [`error`] — error types and result type
//!
//! ## Non-goals
//!
//! MARC-XML serialization is part of the request schema but is not
//! implemented; requesting it returns [`error::MarcoutError::Workset`].

pub mod ast;
pub mod builtins;
pub mod dsl_parser;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expr_parser;
pub mod iso2709;
pub mod leader;
pub mod populate;
pub mod text;
pub mod tokenizer;
pub mod value;
pub mod workset;

pub use engine::{Engine, ExportWorkset, FieldBody, FieldTemplate, ForeachBlock};
pub use error::{MarcoutError, Result};
pub use populate::{EvalDiagnostic, PopulatedBody, PopulatedField};
pub use value::Value;
pub use workset::{export, resolve_workset, Serialization};
