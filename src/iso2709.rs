//! Binary ISO 2709 / MARC 21 codec (§4.4).
//!
//! Offsets and lengths are computed over **UTF-8 byte lengths**, never
//! character counts, matching the format's own interchange definition.
//! Delimiter scanning uses SIMD-accelerated [`memchr`] the way
//! [`crate::populate`]'s host codec does for record-boundary detection —
//! here applied to the finer-grained field/subfield terminators within one
//! already-isolated record.

use crate::engine::FieldTemplate;
use crate::error::{MarcoutError, Result};
use crate::leader::{self, LeaderTemplate, LEADER_LEN};
use crate::populate::{GroupEntry, PopulatedBody, PopulatedField};
use memchr::{memchr, memchr_iter, memrchr};

const SUBFIELD_DELIMITER: u8 = 0x1F;
const FIELD_TERMINATOR: u8 = 0x1E;
const RECORD_TERMINATOR: u8 = 0x1D;

/// Encode one record's populated fields to ISO 2709 binary form.
///
/// # Errors
///
/// Returns [`MarcoutError::Codec`] if any field's tag is not exactly three
/// bytes, or the record overall exceeds the format's decimal-length limits.
pub fn encode(fields: &[PopulatedField]) -> Result<Vec<u8>> {
    let (leader_str, data_fields): (String, &[PopulatedField]) = match fields.first() {
        Some(field) if field.tag == "LDR" => match &field.body {
            PopulatedBody::Content(s) => (s.clone(), &fields[1..]),
            _ => return Err(MarcoutError::Codec("LDR field must carry fixed content".to_string())),
        },
        _ => (LeaderTemplate::new().render(), fields),
    };

    let mut directory = Vec::new();
    let mut data_area: Vec<u8> = Vec::new();
    let mut cumulative_offset: usize = 0;

    for field in data_fields {
        if field.tag.len() != 3 {
            return Err(MarcoutError::Codec(format!(
                "field tag must be exactly 3 bytes: {:?}",
                field.tag
            )));
        }
        let payload = encode_field_payload(field);
        let field_length = payload.len();

        directory.extend_from_slice(field.tag.as_bytes());
        directory.extend_from_slice(encode_digits(field_length, 4)?.as_bytes());
        directory.extend_from_slice(encode_digits(cumulative_offset, 5)?.as_bytes());

        data_area.extend_from_slice(&payload);
        cumulative_offset += field_length;
    }
    directory.push(FIELD_TERMINATOR);

    let base_address = LEADER_LEN + directory.len();
    let record_length = base_address + data_area.len() + 1;

    let leader = leader::patch_computed_fields(&leader_str, record_length, base_address);

    let mut out = Vec::with_capacity(record_length);
    out.extend_from_slice(leader.as_bytes());
    out.extend_from_slice(&directory);
    out.extend_from_slice(&data_area);
    out.push(RECORD_TERMINATOR);
    Ok(out)
}

fn encode_digits(value: usize, width: usize) -> Result<String> {
    let s = format!("{value:0width$}", width = width);
    if s.len() != width {
        return Err(MarcoutError::Codec(format!(
            "value {value} does not fit in {width} decimal digits"
        )));
    }
    Ok(s)
}

/// `SUBFIELD:`/`FOR EACH:` bodies always carry indicators; a `CONTENT:`
/// field only does when its template explicitly set `INDC1:`/`INDC2:` to
/// something other than blank (control fields leave both blank and so
/// carry none).
fn field_has_indicators(field: &PopulatedField) -> bool {
    !matches!(field.body, PopulatedBody::Content(_))
        || field.indicator_1 != ' '
        || field.indicator_2 != ' '
}

fn encode_field_payload(field: &PopulatedField) -> Vec<u8> {
    let mut buf = Vec::new();
    if field_has_indicators(field) {
        buf.push(field.indicator_1 as u8);
        buf.push(field.indicator_2 as u8);
    }
    match &field.body {
        PopulatedBody::Content(s) => buf.extend_from_slice(s.as_bytes()),
        PopulatedBody::Subfields(subs) => {
            for (code, value) in subs {
                buf.push(SUBFIELD_DELIMITER);
                buf.extend_from_slice(code.as_bytes());
                buf.extend_from_slice(value.as_bytes());
            }
        },
        PopulatedBody::Foreach(groups) => {
            for group in groups {
                for entry in group {
                    match entry {
                        GroupEntry::Marker(s) => buf.extend_from_slice(s.as_bytes()),
                        GroupEntry::Subfield(code, value) => {
                            buf.push(SUBFIELD_DELIMITER);
                            buf.extend_from_slice(code.as_bytes());
                            buf.extend_from_slice(value.as_bytes());
                        },
                    }
                }
            }
        },
    }
    if let Some(terminator) = &field.terminator {
        buf.extend_from_slice(terminator.as_bytes());
    }
    buf.push(FIELD_TERMINATOR);
    buf
}

/// Decode one ISO 2709 binary record back into populated fields.
///
/// The Leader is prepended as a synthetic `"LDR"` field, matching
/// [`encode`]'s own input shape so `decode` and `encode` compose (§8 P3).
///
/// # Errors
///
/// Returns [`MarcoutError::Codec`] on any malformed directory, out-of-range
/// directory entry, or a field payload that does not begin with the field
/// terminator at its recorded offset.
pub fn decode(bytes: &[u8]) -> Result<Vec<PopulatedField>> {
    if bytes.len() < LEADER_LEN {
        return Err(MarcoutError::Codec("record shorter than the leader".to_string()));
    }
    let leader_str = std::str::from_utf8(&bytes[..LEADER_LEN])
        .map_err(|_| MarcoutError::Codec("leader is not valid UTF-8".to_string()))?
        .to_string();

    let rest = &bytes[LEADER_LEN..];
    let first_fs = memchr(FIELD_TERMINATOR, rest)
        .ok_or_else(|| MarcoutError::Codec("no field terminator found after leader".to_string()))?;
    let directory = &rest[..first_fs];

    if directory.is_empty() || !directory.iter().all(u8::is_ascii_digit) {
        return Err(MarcoutError::Codec("directory is not an all-digit string".to_string()));
    }
    if directory.len() % 12 != 0 {
        return Err(MarcoutError::Codec("directory length is not a multiple of 12".to_string()));
    }

    let last_rs = memrchr(RECORD_TERMINATOR, rest)
        .ok_or_else(|| MarcoutError::Codec("no record terminator found".to_string()))?;
    if last_rs < first_fs {
        return Err(MarcoutError::Codec(
            "record terminator precedes field terminator".to_string(),
        ));
    }
    let field_region = &rest[first_fs..last_rs];

    let mut fields = vec![PopulatedField {
        tag: "LDR".to_string(),
        indicator_1: ' ',
        indicator_2: ' ',
        body: PopulatedBody::Content(leader_str),
        terminator: None,
    }];

    for entry in directory.chunks(12) {
        let tag = std::str::from_utf8(&entry[0..3])
            .map_err(|_| MarcoutError::Codec("directory tag is not valid UTF-8".to_string()))?
            .to_string();
        let length = parse_digits(&entry[3..7])?;
        let offset = parse_digits(&entry[7..12])?;

        let end = match offset.checked_add(length) {
            Some(end) if end <= field_region.len() => end,
            _ => {
                return Err(MarcoutError::Codec(format!(
                    "directory entry for tag {tag} points past the field region"
                )))
            },
        };
        let span = &field_region[offset..end];
        if span.first() != Some(&FIELD_TERMINATOR) {
            return Err(MarcoutError::Codec(format!(
                "field payload for tag {tag} does not begin with a field terminator"
            )));
        }
        let content = &span[1..];
        fields.push(decode_field(tag, content)?);
    }

    Ok(fields)
}

fn parse_digits(bytes: &[u8]) -> Result<usize> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| MarcoutError::Codec(format!("invalid decimal digits: {bytes:?}")))
}

fn decode_field(tag: String, content: &[u8]) -> Result<PopulatedField> {
    match memchr(SUBFIELD_DELIMITER, content) {
        None => Ok(PopulatedField {
            tag,
            indicator_1: ' ',
            indicator_2: ' ',
            body: PopulatedBody::Content(String::from_utf8_lossy(content).into_owned()),
            terminator: None,
        }),
        Some(_) => {
            if content.len() < 2 {
                return Err(MarcoutError::Codec(format!(
                    "subfielded field {tag} is missing its indicators"
                )));
            }
            let indicator_1 = content[0] as char;
            let indicator_2 = content[1] as char;
            let sub_region = &content[2..];
            let positions: Vec<usize> = memchr_iter(SUBFIELD_DELIMITER, sub_region).collect();
            let mut subfields = smallvec::SmallVec::with_capacity(positions.len());
            for (i, &pos) in positions.iter().enumerate() {
                let start = pos + 1;
                let end = positions.get(i + 1).copied().unwrap_or(sub_region.len());
                let chunk = &sub_region[start..end];
                if chunk.is_empty() {
                    continue;
                }
                let code = (chunk[0] as char).to_string();
                let value = String::from_utf8_lossy(&chunk[1..]).into_owned();
                subfields.push((code, value));
            }
            Ok(PopulatedField {
                tag,
                indicator_1,
                indicator_2,
                body: PopulatedBody::Subfields(subfields),
                terminator: None,
            })
        },
    }
}

/// Validate that a field template's tag has the invariant 3-character
/// shape before it ever reaches the codec (§3 invariant: "Tag is exactly
/// three characters").
pub fn validate_tag(template: &FieldTemplate) -> Result<()> {
    if template.tag.chars().count() != 3 {
        return Err(MarcoutError::DslParse(format!(
            "field tag must be exactly 3 characters: {:?}",
            template.tag
        )));
    }
    Ok(())
}
