//! The line-oriented MARCout DSL parser (§4.2).
//!
//! Three passes over the export-definition text: strip comments, segment
//! into named blocks by `---- `-terminated headers, then parse each
//! block's payload — culminating in the stateful `MARC FIELD TEMPLATES`
//! sweep that accumulates one [`FieldTemplate`] (or the Leader) at a time.

use crate::engine::{Engine, Extractor, FieldBody, FieldTemplate, ForeachBlock, SubfieldTemplates};
use crate::error::{MarcoutError, Result};
use crate::expr_parser::parse_expression;
use crate::leader::LeaderTemplate;
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

/// Parse a complete MARCout export-definition text into an [`Engine`].
///
/// # Errors
///
/// Returns [`MarcoutError::DslParse`] for any unknown block header,
/// malformed field-template line, or expression the tokenizer/parser
/// rejects.
pub fn parse(source: &str) -> Result<Engine> {
    let lines = strip_comments(source);
    let blocks = segment_blocks(&lines);

    let mut engine = Engine::new();
    for (name, body) in blocks {
        match name.as_str() {
            "description" => {},
            "known_parameters" => engine.known_parameters = parse_known_parameters(&body),
            "functions" => engine.functions = parse_functions(&body),
            "json_extracted_properties" => engine.json_extractors = parse_extractors(&body)?,
            "marc_field_templates" => {
                let (leader, templates) = parse_field_templates(&body)?;
                engine.leader_template = leader;
                engine.field_templates = templates;
            },
            other => {
                return Err(MarcoutError::DslParse(format!("unrecognized block header: {other}")))
            },
        }
    }
    Ok(engine)
}

fn strip_comments(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw_line in source.lines() {
        let trimmed_start = raw_line.trim_start();
        if trimmed_start.starts_with('#') {
            continue;
        }
        if trimmed_start.is_empty() {
            out.push(String::new());
            continue;
        }
        out.push(strip_inline_comment(raw_line));
    }
    out
}

fn strip_inline_comment(line: &str) -> String {
    let mut in_quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            },
            None => {
                if c == '"' || c == '\'' {
                    in_quote = Some(c);
                } else if c == '#' {
                    return line[..i].trim_end().to_string();
                }
            },
        }
    }
    line.trim_end().to_string()
}

fn segment_blocks(lines: &[String]) -> Vec<(String, Vec<String>)> {
    let mut blocks = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_body: Vec<String> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if trimmed.ends_with("----") {
            if let Some(name) = current_name.take() {
                blocks.push((name, std::mem::take(&mut current_body)));
            }
            let header = trimmed.trim_end_matches('-').trim();
            current_name = Some(header.to_lowercase().replace(' ', "_"));
        } else if current_name.is_some() {
            current_body.push(line.clone());
        }
    }
    if let Some(name) = current_name.take() {
        blocks.push((name, current_body));
    }
    blocks
}

fn parse_known_parameters(body: &[String]) -> IndexSet<String> {
    body.iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_functions(body: &[String]) -> IndexMap<String, String> {
    let mut functions = IndexMap::new();
    for line in body.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let name = line.split('(').next().unwrap_or(line).trim().to_string();
        functions.insert(name, line.to_string());
    }
    functions
}

fn parse_extractors(body: &[String]) -> Result<IndexMap<String, Extractor>> {
    let mut extractors = IndexMap::new();
    for line in body.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let (name, rhs) = line
            .split_once('=')
            .ok_or_else(|| MarcoutError::DslParse(format!("extractor line missing '=': {line}")))?;
        let name = name.trim().to_string();

        let (expr_text, default) = match rhs.find("::DEFAULT") {
            Some(idx) => {
                let expr_part = rhs[..idx].trim();
                let default_part = rhs[idx + "::DEFAULT".len()..].trim();
                (expr_part, Some(strip_quotes(default_part)))
            },
            None => (rhs.trim(), None),
        };

        let expression = parse_expression(expr_text)?;
        extractors.insert(name, Extractor { expression, default });
    }
    Ok(extractors)
}

fn strip_quotes(s: &str) -> String {
    if s.len() >= 2 && (s.starts_with('"') || s.starts_with('\'')) && s.ends_with(&s[0..1]) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[derive(Default)]
struct ForeachAcc {
    item_alias: String,
    source_key: String,
    subfields: SubfieldTemplates,
    sort_by: Vec<String>,
    prefix: Option<crate::ast::Expr>,
    suffix: Option<crate::ast::Expr>,
    demarc: Option<crate::ast::Expr>,
}

struct FieldAcc {
    tag: String,
    indicator_1: char,
    indicator_2: char,
    content: Option<crate::ast::Expr>,
    subfields: SubfieldTemplates,
    foreach: Option<ForeachAcc>,
    terminator: Option<String>,
    export_if: Option<crate::ast::Expr>,
    export_if_not: Option<crate::ast::Expr>,
}

impl FieldAcc {
    fn new(tag: String) -> Self {
        FieldAcc {
            tag,
            indicator_1: ' ',
            indicator_2: ' ',
            content: None,
            subfields: SmallVec::new(),
            foreach: None,
            terminator: Some(".".to_string()),
            export_if: None,
            export_if_not: None,
        }
    }

    fn finish(self) -> Result<FieldTemplate> {
        let body = if let Some(foreach) = self.foreach {
            FieldBody::Foreach(ForeachBlock {
                item_alias: foreach.item_alias,
                source_key: foreach.source_key,
                subfields: foreach.subfields,
                sort_by: foreach.sort_by,
                prefix: foreach.prefix,
                suffix: foreach.suffix,
                demarc: foreach.demarc,
            })
        } else if !self.subfields.is_empty() {
            FieldBody::Subfields(self.subfields)
        } else if let Some(content) = self.content {
            FieldBody::Content(content)
        } else {
            return Err(MarcoutError::DslParse(format!(
                "field {} has no CONTENT, SUBFIELD, or FOR EACH body",
                self.tag
            )));
        };

        Ok(FieldTemplate {
            tag: self.tag,
            indicator_1: self.indicator_1,
            indicator_2: self.indicator_2,
            body,
            terminator: self.terminator,
            export_if: self.export_if,
            export_if_not: self.export_if_not,
        })
    }
}

enum Pending {
    Subfield(String),
    EachSubfield(String),
    LdrOverride(usize),
}

fn parse_indicator(value: &str) -> char {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("blank") {
        ' '
    } else {
        trimmed.chars().next().unwrap_or(' ')
    }
}

fn parse_terminator(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let unquoted = strip_quotes(trimmed);
    if unquoted.is_empty() || unquoted.eq_ignore_ascii_case("none") || unquoted.eq_ignore_ascii_case("nothing") {
        None
    } else {
        Some(unquoted)
    }
}

#[allow(clippy::too_many_lines)]
fn parse_field_templates(body: &[String]) -> Result<(Option<LeaderTemplate>, Vec<FieldTemplate>)> {
    let mut leader: Option<LeaderTemplate> = None;
    let mut templates = Vec::new();
    let mut current: Option<FieldAcc> = None;
    let mut pending: Option<Pending> = None;

    let mut i = 0;
    while i < body.len() {
        let line = body[i].trim();

        if line.is_empty() {
            if let Some(acc) = current.take() {
                templates.push(acc.finish()?);
            }
            i += 1;
            continue;
        }

        if let Some(p) = pending.take() {
            match p {
                Pending::Subfield(code) => {
                    let acc = current
                        .as_mut()
                        .ok_or_else(|| MarcoutError::DslParse("SUBFIELD outside a FIELD block".to_string()))?;
                    acc.subfields.push((code, parse_expression(line)?));
                },
                Pending::EachSubfield(code) => {
                    let acc = current.as_mut().ok_or_else(|| {
                        MarcoutError::DslParse("EACH-SUBFIELD outside a FIELD block".to_string())
                    })?;
                    let foreach = acc
                        .foreach
                        .as_mut()
                        .ok_or_else(|| MarcoutError::DslParse("EACH-SUBFIELD outside a FOR EACH block".to_string()))?;
                    foreach.subfields.push((code, parse_expression(line)?));
                },
                Pending::LdrOverride(pos) => {
                    let rest = line.strip_prefix("OVERRIDE:").ok_or_else(|| {
                        MarcoutError::DslParse(format!("expected OVERRIDE: after LDR POS, found: {line}"))
                    })?;
                    let value = parse_indicator(rest);
                    leader.get_or_insert_with(LeaderTemplate::new).set_override(pos, value);
                },
            }
            i += 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix("FIELD:") {
            if let Some(acc) = current.take() {
                templates.push(acc.finish()?);
            }
            current = Some(FieldAcc::new(rest.trim().to_string()));
        } else if let Some(rest) = line.strip_prefix("LDR POS:") {
            leader.get_or_insert_with(LeaderTemplate::new);
            let pos: usize = rest
                .trim()
                .parse()
                .map_err(|_| MarcoutError::DslParse(format!("invalid LDR POS value: {rest}")))?;
            pending = Some(Pending::LdrOverride(pos));
        } else if line.starts_with("LDR:") || line.trim() == "LDR" {
            leader.get_or_insert_with(LeaderTemplate::new);
        } else if let Some(rest) = line.strip_prefix("INDC1:") {
            field_mut(&mut current, line)?.indicator_1 = parse_indicator(rest);
        } else if let Some(rest) = line.strip_prefix("INDC2:") {
            field_mut(&mut current, line)?.indicator_2 = parse_indicator(rest);
        } else if let Some(rest) = line.strip_prefix("CONTENT:") {
            field_mut(&mut current, line)?.content = Some(parse_expression(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("SUBFIELD:") {
            field_mut(&mut current, line)?;
            pending = Some(Pending::Subfield(rest.trim().to_string()));
        } else if let Some(rest) = line.strip_prefix("FOR EACH:") {
            let (alias, source) = rest
                .trim()
                .split_once(" in ")
                .ok_or_else(|| MarcoutError::DslParse(format!("malformed FOR EACH: {line}")))?;
            field_mut(&mut current, line)?.foreach = Some(ForeachAcc {
                item_alias: alias.trim().to_string(),
                source_key: source.trim().to_string(),
                ..ForeachAcc::default()
            });
        } else if let Some(rest) = line.strip_prefix("EACH-SUBFIELD:") {
            foreach_mut(&mut current, line)?;
            pending = Some(Pending::EachSubfield(rest.trim().to_string()));
        } else if let Some(rest) = line.strip_prefix("SORT BY:") {
            foreach_mut(&mut current, line)?.sort_by.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("EACH-PREFIX:") {
            foreach_mut(&mut current, line)?.prefix = Some(parse_expression(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("EACH-SUFFIX:") {
            foreach_mut(&mut current, line)?.suffix = Some(parse_expression(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("DEMARC WITH:") {
            foreach_mut(&mut current, line)?.demarc = Some(parse_expression(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("EXPORT WHEN:") {
            field_mut(&mut current, line)?.export_if = Some(parse_expression(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("EXPORT UNLESS:") {
            field_mut(&mut current, line)?.export_if_not = Some(parse_expression(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("TERMINATE DATA WITH:") {
            field_mut(&mut current, line)?.terminator = parse_terminator(rest);
        } else {
            return Err(MarcoutError::DslParse(format!(
                "unrecognized field-template line: {line}"
            )));
        }
        i += 1;
    }

    if let Some(acc) = current.take() {
        templates.push(acc.finish()?);
    }

    Ok((leader, templates))
}

fn field_mut<'a>(current: &'a mut Option<FieldAcc>, line: &str) -> Result<&'a mut FieldAcc> {
    current.as_mut().ok_or_else(|| {
        MarcoutError::DslParse(format!("field-template line outside any FIELD block: {line}"))
    })
}

fn foreach_mut<'a>(current: &'a mut Option<FieldAcc>, line: &str) -> Result<&'a mut ForeachAcc> {
    field_mut(current, line)?
        .foreach
        .as_mut()
        .ok_or_else(|| MarcoutError::DslParse(format!("line requires an open FOR EACH block: {line}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FieldBody;

    #[test]
    fn parses_known_parameters() {
        let engine = parse("KNOWN PARAMETERS ----\ncollection_code\nlibrary_name\n").unwrap();
        assert!(engine.known_parameters.contains("collection_code"));
        assert!(engine.known_parameters.contains("library_name"));
    }

    #[test]
    fn parses_extractor_with_default() {
        let src = "JSON EXTRACTED PROPERTIES ----\ncontrol_number = album_id ::DEFAULT \"unknown\"\n";
        let engine = parse(src).unwrap();
        let extractor = engine.json_extractors.get("control_number").unwrap();
        assert_eq!(extractor.default, Some("unknown".to_string()));
    }

    #[test]
    fn scenario_s1_simple_field() {
        let src = "MARC FIELD TEMPLATES ----\nFIELD: 001\nCONTENT: control_number\nTERMINATE DATA WITH: NOTHING\n";
        let engine = parse(src).unwrap();
        assert_eq!(engine.field_templates.len(), 1);
        let field = &engine.field_templates[0];
        assert_eq!(field.tag, "001");
        assert_eq!(field.terminator, None);
        assert!(matches!(field.body, FieldBody::Content(_)));
    }

    #[test]
    fn scenario_s2_subfielded_field() {
        let src = "MARC FIELD TEMPLATES ----\nFIELD: 245\nINDC1: 1\nINDC2: 0\nSUBFIELD: a\nalbum_title\nSUBFIELD: c\nbiblio_name(artist)\n";
        let engine = parse(src).unwrap();
        let field = &engine.field_templates[0];
        assert_eq!(field.indicator_1, '1');
        assert_eq!(field.indicator_2, '0');
        match &field.body {
            FieldBody::Subfields(subs) => assert_eq!(subs.len(), 2),
            _ => panic!("expected subfields"),
        }
    }

    #[test]
    fn scenario_s3_foreach_with_sort_and_suffix() {
        let src = "MARC FIELD TEMPLATES ----\nFIELD: 505\nFOR EACH: track in tracks\nSORT BY: track::position\nEACH-SUBFIELD: t\ntrack::title\nEACH-SUBFIELD: g\nrender_duration(track::duration)\nEACH-SUFFIX: \" --\"\n";
        let engine = parse(src).unwrap();
        match &engine.field_templates[0].body {
            FieldBody::Foreach(foreach) => {
                assert_eq!(foreach.item_alias, "track");
                assert_eq!(foreach.source_key, "tracks");
                assert_eq!(foreach.sort_by, vec!["track::position".to_string()]);
                assert_eq!(foreach.subfields.len(), 2);
                assert!(foreach.suffix.is_some());
            },
            _ => panic!("expected foreach"),
        }
    }

    #[test]
    fn scenario_s4_export_unless() {
        let src = "MARC FIELD TEMPLATES ----\nFIELD: 910\nCONTENT: collection_code\nEXPORT UNLESS: collection_code IS \"test\"\n";
        let engine = parse(src).unwrap();
        assert!(engine.field_templates[0].export_if_not.is_some());
    }

    #[test]
    fn comment_only_lines_are_removed_entirely() {
        let src = "KNOWN PARAMETERS ----\n# this is a comment\ncollection_code\n";
        let engine = parse(src).unwrap();
        assert_eq!(engine.known_parameters.len(), 1);
    }

    #[test]
    fn inline_trailing_comments_are_stripped() {
        let src = "MARC FIELD TEMPLATES ----\nFIELD: 001  # control number field\nCONTENT: control_number\n";
        let engine = parse(src).unwrap();
        assert_eq!(engine.field_templates[0].tag, "001");
    }

    #[test]
    fn hash_inside_quoted_string_is_not_a_comment() {
        let src = "MARC FIELD TEMPLATES ----\nFIELD: 500\nCONTENT: \"note #1\"\n";
        let engine = parse(src).unwrap();
        match &engine.field_templates[0].body {
            FieldBody::Content(_) => {},
            _ => panic!("expected content"),
        }
    }

    #[test]
    fn ldr_pos_override_applies_to_leader() {
        let src = "MARC FIELD TEMPLATES ----\nLDR POS: 6\nOVERRIDE: a\n";
        let (leader, _) = parse_field_templates(&strip_comments(src)[1..].to_vec()).unwrap();
        let rendered = leader.unwrap().render();
        assert_eq!(rendered.chars().nth(6), Some('a'));
    }

    #[test]
    fn unknown_block_header_is_an_error() {
        assert!(parse("NONSENSE ----\nx\n").is_err());
    }

    #[test]
    fn default_terminator_is_period() {
        let src = "MARC FIELD TEMPLATES ----\nFIELD: 650\nCONTENT: subject\n";
        let engine = parse(src).unwrap();
        assert_eq!(engine.field_templates[0].terminator, Some(".".to_string()));
    }
}
