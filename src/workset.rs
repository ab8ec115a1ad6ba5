//! Request resolution and export orchestration (§6 external interfaces, §7
//! workset-consistency errors).
//!
//! [`resolve_workset`] is the only place the unified JSON request shape is
//! known; everything downstream works with the typed [`ExportWorkset`].
//! [`export`] drives [`crate::populate`] once per record and hands the
//! result to the requested serializer — `marc-xml` is declared in the
//! request schema but, per design note (b), is left as a 501-equivalent.

use crate::dsl_parser;
use crate::engine::{Engine, ExportWorkset};
use crate::error::{MarcoutError, Result};
use crate::iso2709;
use crate::populate::{self, EvalDiagnostic, PopulatedField};
use crate::text;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value as Json;

/// One of the `requested_serialization.serialization-name` values (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serialization {
    /// Line-oriented MARC-text (§4.5).
    MarcText,
    /// Binary ISO 2709 interchange format (§4.4).
    Iso2709,
    /// A debug echo of the internal populated-field structures.
    RawDatastructure,
    /// Declared in the request schema but never implemented (§9 open
    /// question b) — a 501-equivalent.
    MarcXml,
}

impl Serialization {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "marc-text" => Ok(Serialization::MarcText),
            "iso2709" => Ok(Serialization::Iso2709),
            "raw-datastructure" => Ok(Serialization::RawDatastructure),
            "marc-xml" => Ok(Serialization::MarcXml),
            other => Err(MarcoutError::Workset(format!(
                "unknown requested_serialization.serialization-name: {other}"
            ))),
        }
    }
}

/// Reverse the `\n`, `\"`, `\t` escaping applied to `marcout_sourcecode`
/// when it is embedded in the unified JSON request (§6).
#[must_use]
pub fn unescape_dsl_source(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                },
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn require_str<'a>(json: &'a Json, key: &str) -> Result<&'a str> {
    json.get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| MarcoutError::Workset(format!("missing or non-string top-level key: {key}")))
}

fn require_object<'a>(json: &'a Json, key: &str) -> Result<&'a serde_json::Map<String, Json>> {
    json.get(key)
        .and_then(Json::as_object)
        .ok_or_else(|| MarcoutError::Workset(format!("missing or non-object top-level key: {key}")))
}

fn require_array<'a>(json: &'a Json, key: &str) -> Result<&'a Vec<Json>> {
    json.get(key)
        .and_then(Json::as_array)
        .ok_or_else(|| MarcoutError::Workset(format!("missing or non-array top-level key: {key}")))
}

/// Validate that `collection_info`'s key set exactly matches the DSL's
/// `KNOWN PARAMETERS` set (§8 P8).
///
/// # Errors
///
/// Returns [`MarcoutError::Workset`] listing both directions of the
/// symmetric difference when the sets disagree.
pub fn validate_parameters(known: &IndexSet<String>, supplied: &IndexMap<String, Value>) -> Result<()> {
    let supplied_keys: IndexSet<String> = supplied.keys().cloned().collect();
    let missing: Vec<&String> = known.difference(&supplied_keys).collect();
    let unexpected: Vec<&String> = supplied_keys.difference(known).collect();
    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    Err(MarcoutError::Workset(format!(
        "collection_info parameter mismatch: missing {missing:?}, unexpected {unexpected:?}"
    )))
}

/// Resolve a unified JSON request (§6) into an [`ExportWorkset`].
///
/// # Errors
///
/// Returns [`MarcoutError::Workset`] for a missing/malformed top-level key
/// or an unknown `serialization-name`, and propagates
/// [`MarcoutError::DslParse`] from the DSL parser.
pub fn resolve_workset(request: &Json) -> Result<ExportWorkset> {
    let escaped_source = require_str(request, "marcout_sourcecode")?;
    let source = unescape_dsl_source(escaped_source);
    let engine: Engine = dsl_parser::parse(&source)?;

    let requested = require_object(request, "requested_serialization")?;
    let serialization_name = requested
        .get("serialization-name")
        .and_then(Json::as_str)
        .ok_or_else(|| {
            MarcoutError::Workset("requested_serialization.serialization-name is missing".to_string())
        })?;
    let serialization = Serialization::parse(serialization_name)?;

    let collection_info_json = require_object(request, "collection_info")?;
    let collection_info: IndexMap<String, Value> = collection_info_json
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v)))
        .collect();
    validate_parameters(&engine.known_parameters, &collection_info)?;

    let records_json = require_array(request, "records")?;
    let records: Vec<Value> = records_json.iter().map(Value::from).collect();

    Ok(ExportWorkset {
        engine,
        serialization,
        collection_info,
        records,
    })
}

/// Populate every record in `workset` and render it per the requested
/// serialization, returning the concatenated output plus any per-record
/// diagnostics collected along the way.
///
/// # Errors
///
/// Returns [`MarcoutError::Codec`] if ISO 2709 encoding fails for a record,
/// and [`MarcoutError::Workset`] if `marc-xml` was requested.
pub fn export(workset: &ExportWorkset) -> Result<(String, Vec<EvalDiagnostic>)> {
    let mut diagnostics = Vec::new();
    let mut populated_records: Vec<Vec<PopulatedField>> = Vec::with_capacity(workset.records.len());

    for record in &workset.records {
        let vars = collection_merged_record(record, &workset.collection_info);
        let (fields, record_diagnostics) = populate::populate_record(&workset.engine, &vars);
        diagnostics.extend(record_diagnostics);
        populated_records.push(fields);
    }

    let body = match workset.serialization {
        Serialization::MarcText => populated_records.iter().map(|f| text::serialize_record(f)).collect(),
        Serialization::Iso2709 => {
            let mut bytes = Vec::new();
            for fields in &populated_records {
                bytes.extend(iso2709::encode(fields)?);
            }
            String::from_utf8(bytes)
                .map_err(|_| MarcoutError::Codec("encoded record is not valid UTF-8".to_string()))?
        },
        Serialization::RawDatastructure => serde_json::to_string_pretty(&serde_json::json!({
            "records": populated_records,
            "diagnostics": diagnostics,
        }))
        .map_err(|e| MarcoutError::Codec(format!("failed to render raw-datastructure output: {e}")))?,
        Serialization::MarcXml => {
            return Err(MarcoutError::Workset(
                "marc-xml serialization is declared but not implemented".to_string(),
            ))
        },
    };

    Ok((body, diagnostics))
}

/// Overlay collection-wide parameters onto one record's field map so both
/// are visible to extractors under the same namespace (§4.3: "Collection
/// parameters are substituted in the same manner" as extracted fields).
fn collection_merged_record(record: &Value, collection_info: &IndexMap<String, Value>) -> Value {
    let mut merged: IndexMap<String, Value> = collection_info.clone();
    if let Value::Map(fields) = record {
        for (k, v) in fields {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Map(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_reverses_dsl_escaping() {
        assert_eq!(unescape_dsl_source("line1\\nline2"), "line1\nline2");
        assert_eq!(unescape_dsl_source("say \\\"hi\\\""), "say \"hi\"");
        assert_eq!(unescape_dsl_source("a\\tb"), "a\tb");
    }

    #[test]
    fn p8_validate_parameters_detects_both_directions() {
        let known: IndexSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let mut supplied = IndexMap::new();
        supplied.insert("a".to_string(), Value::Null);
        supplied.insert("c".to_string(), Value::Null);
        let err = validate_parameters(&known, &supplied).unwrap_err();
        let message = err.to_string();
        assert!(message.contains('b'));
        assert!(message.contains('c'));
    }

    #[test]
    fn p8_validate_parameters_passes_on_exact_match() {
        let known: IndexSet<String> = ["a".to_string()].into_iter().collect();
        let mut supplied = IndexMap::new();
        supplied.insert("a".to_string(), Value::Null);
        assert!(validate_parameters(&known, &supplied).is_ok());
    }

    #[test]
    fn resolve_workset_rejects_unknown_serialization() {
        let request = serde_json::json!({
            "marcout_sourcecode": "KNOWN PARAMETERS ----\n",
            "requested_serialization": {"serialization-name": "marc-json"},
            "collection_info": {},
            "records": [],
        });
        assert!(resolve_workset(&request).is_err());
    }

    #[test]
    fn resolve_workset_end_to_end_scenario_s1() {
        let request = serde_json::json!({
            "marcout_sourcecode": "JSON EXTRACTED PROPERTIES ----\ncontrol_number = control_number\nMARC FIELD TEMPLATES ----\nFIELD: 001\nCONTENT: control_number\nTERMINATE DATA WITH: NOTHING\n",
            "requested_serialization": {"serialization-name": "marc-text"},
            "collection_info": {},
            "records": [{"control_number": "nbb_a7ff441a"}],
        });
        let workset = resolve_workset(&request).unwrap();
        let (body, diagnostics) = export(&workset).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(body, "=001  nbb_a7ff441a\n\n");
    }

    #[test]
    fn export_marc_xml_is_not_implemented() {
        let request = serde_json::json!({
            "marcout_sourcecode": "",
            "requested_serialization": {"serialization-name": "marc-xml"},
            "collection_info": {},
            "records": [],
        });
        let workset = resolve_workset(&request).unwrap();
        assert!(export(&workset).is_err());
    }
}
