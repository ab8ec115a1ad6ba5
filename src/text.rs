//! Human-readable MARC-text serializer (§4.5).
//!
//! Each field renders as one line: `=` + tag + two spaces + two indicator
//! characters + body + terminator, LF-terminated. A blank indicator is
//! written as the two-character escape `\\` rather than a literal space, so
//! the text form stays unambiguous when indicators are significant
//! (`INDC1: 1` vs. blank).

use crate::populate::{GroupEntry, PopulatedBody, PopulatedField};

/// Render one record's populated fields as MARC-text, one line per field
/// followed by a single trailing blank line (§6: "each record is followed
/// by exactly one blank line").
#[must_use]
pub fn serialize_record(fields: &[PopulatedField]) -> String {
    let mut out = String::new();
    for field in fields {
        out.push_str(&serialize_field(field));
        out.push('\n');
    }
    out.push('\n');
    out
}

fn serialize_field(field: &PopulatedField) -> String {
    let mut line = String::new();
    line.push('=');
    line.push_str(&field.tag);
    line.push_str("  ");

    if field_has_indicators(field) {
        line.push_str(&escape_indicator(field.indicator_1));
        line.push_str(&escape_indicator(field.indicator_2));
    }

    line.push_str(&serialize_body(&field.body));

    if let Some(terminator) = &field.terminator {
        line.push_str(terminator);
    }
    line
}

/// `SUBFIELD:`/`FOR EACH:` bodies always carry indicators; a `CONTENT:`
/// field only does when its template explicitly set `INDC1:`/`INDC2:` to
/// something other than blank (control fields leave both blank and so
/// carry none).
fn field_has_indicators(field: &PopulatedField) -> bool {
    !matches!(field.body, PopulatedBody::Content(_)) || field.indicator_1 != ' ' || field.indicator_2 != ' '
}

fn escape_indicator(indicator: char) -> String {
    if indicator == ' ' {
        "\\".to_string()
    } else {
        indicator.to_string()
    }
}

fn serialize_body(body: &PopulatedBody) -> String {
    match body {
        PopulatedBody::Content(s) => s.clone(),
        PopulatedBody::Subfields(subs) => subs
            .iter()
            .map(|(code, value)| format!("${code}{value}"))
            .collect(),
        PopulatedBody::Foreach(groups) => groups
            .iter()
            .flat_map(|group| group.iter())
            .map(|entry| match entry {
                GroupEntry::Marker(s) => s.clone(),
                GroupEntry::Subfield(code, value) => format!("${code}{value}"),
            })
            .collect(),
    }
}
