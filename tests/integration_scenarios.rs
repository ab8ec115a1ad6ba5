//! End-to-end tests: DSL source through the full pipeline to serialized
//! output, plus the unified-request workset flow. Unit tests colocated with
//! each module cover the narrower properties; these exercise the seams
//! between modules the way a real caller would.

use marcout::{dsl_parser, iso2709, populate, text, workset, Value};
use serde_json::json;

fn record(json: serde_json::Value) -> Value {
    Value::from(&json)
}

#[test]
fn scenario_s2_full_pipeline_subfielded_field_with_indicators() {
    let source = "\
MARC FIELD TEMPLATES ----
FIELD: 245
INDC1: 1
INDC2: 0
SUBFIELD: a
album_title
SUBFIELD: c
biblio_name(artist)
";
    let engine = dsl_parser::parse(source).unwrap();
    let rec = record(json!({"album_title": "Pillow", "artist": "Mischa Lively"}));
    let (fields, diagnostics) = populate::populate_record(&engine, &rec);
    assert!(diagnostics.is_empty());
    assert_eq!(text::serialize_record(&fields), "=245  10$aPillow$cLively, Mischa.\n\n");
}

#[test]
fn scenario_s3_full_pipeline_foreach_sorts_and_suffixes() {
    let source = "\
MARC FIELD TEMPLATES ----
FIELD: 505
FOR EACH: track in tracks
SORT BY: track::position
EACH-SUBFIELD: t
track::title
EACH-SUFFIX: \" --\"
";
    let engine = dsl_parser::parse(source).unwrap();
    let rec = record(json!({
        "tracks": [
            {"position": 2, "title": "Second"},
            {"position": 1, "title": "First"},
            {"position": 3, "title": "Third"},
        ]
    }));
    let (fields, diagnostics) = populate::populate_record(&engine, &rec);
    assert!(diagnostics.is_empty());
    let line = text::serialize_record(&fields);
    assert_eq!(line, "=505  \\\\$tFirst --$tSecond --$tThird --.\n\n");
}

#[test]
fn scenario_s4_full_pipeline_conditional_skip() {
    let source = "\
MARC FIELD TEMPLATES ----
FIELD: 910
CONTENT: collection_code
EXPORT UNLESS: collection_code IS \"test\"
";
    let engine = dsl_parser::parse(source).unwrap();

    let suppressed = record(json!({"collection_code": "test"}));
    let (fields, _) = populate::populate_record(&engine, &suppressed);
    assert!(fields.is_empty());

    let kept = record(json!({"collection_code": "prod"}));
    let (fields, _) = populate::populate_record(&engine, &kept);
    assert_eq!(fields.len(), 1);
}

#[test]
fn scenario_s6_full_pipeline_control_number() {
    let source = "\
JSON EXTRACTED PROPERTIES ----
control_number = compute_control_number(album_id, collection)
MARC FIELD TEMPLATES ----
FIELD: 001
CONTENT: control_number
TERMINATE DATA WITH: NOTHING
";
    let engine = dsl_parser::parse(source).unwrap();
    let rec = record(json!({"album_id": "mischa-lively-album", "collection": "NBB"}));
    let (fields, diagnostics) = populate::populate_record(&engine, &rec);
    assert!(diagnostics.is_empty());
    let text = text::serialize_record(&fields);
    assert!(text.starts_with("=001  nbb_"));
    assert!(text.trim_end().ends_with('a'));
}

#[test]
fn scenario_s5_iso2709_round_trip_across_field_shapes() {
    let source = "\
MARC FIELD TEMPLATES ----
FIELD: 001
CONTENT: control_number
TERMINATE DATA WITH: NOTHING

FIELD: 245
INDC1: 1
INDC2: 0
SUBFIELD: a
album_title

FIELD: 505
FOR EACH: track in tracks
SORT BY: track::position
EACH-SUBFIELD: t
track::title
EACH-SUFFIX: \" --\"
";
    let engine = dsl_parser::parse(source).unwrap();
    let rec = record(json!({
        "control_number": "nbb_a7ff441a",
        "album_title": "Pillow",
        "tracks": [
            {"position": 2, "title": "Second"},
            {"position": 1, "title": "First"},
        ],
    }));
    let (fields, diagnostics) = populate::populate_record(&engine, &rec);
    assert!(diagnostics.is_empty());

    let encoded = iso2709::encode(&fields).unwrap();
    let decoded = iso2709::decode(&encoded).unwrap();
    let re_encoded = iso2709::encode(&decoded).unwrap();
    assert_eq!(encoded, re_encoded);
}

#[test]
fn scenario_s7_unified_request_end_to_end() {
    let request = json!({
        "marcout_sourcecode": "JSON EXTRACTED PROPERTIES ----\ncontrol_number = control_number\nMARC FIELD TEMPLATES ----\nFIELD: 001\nCONTENT: control_number\nTERMINATE DATA WITH: NOTHING\n",
        "requested_serialization": {"serialization-name": "marc-text"},
        "collection_info": {},
        "records": [{"control_number": "nbb_a7ff441a"}],
    });
    let resolved = workset::resolve_workset(&request).unwrap();
    let (body, diagnostics) = workset::export(&resolved).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(body, "=001  nbb_a7ff441a\n\n");
}

#[test]
fn scenario_s8_unified_request_parameter_mismatch_is_rejected() {
    let request = json!({
        "marcout_sourcecode": "KNOWN PARAMETERS ----\ncollection_code\n",
        "requested_serialization": {"serialization-name": "marc-text"},
        "collection_info": {"unexpected_key": "x"},
        "records": [],
    });
    let err = workset::resolve_workset(&request).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("collection_code"));
    assert!(message.contains("unexpected_key"));
}

#[test]
fn scenario_s9_marc_xml_is_rejected_at_export_not_at_resolve() {
    let request = json!({
        "marcout_sourcecode": "",
        "requested_serialization": {"serialization-name": "marc-xml"},
        "collection_info": {},
        "records": [],
    });
    let resolved = workset::resolve_workset(&request).unwrap();
    assert!(workset::export(&resolved).is_err());
}
