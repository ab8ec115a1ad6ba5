//! Built-in functions callable from MARCout field expressions (§4.3).
//!
//! Every entry takes and returns [`Value`]; the evaluator dispatches to
//! these by name from [`Expr::Call`](crate::ast::Expr::Call) nodes. None of
//! these functions can fail on a well-typed call — a wrong argument count
//! or an uncoercible argument yields [`Value::Null`] rather than an error,
//! matching the evaluator's "missing value, not fatal" philosophy for field
//! content (fatal conditions are reserved for the DSL parser and the codec).

use crate::value::{format_number, Value};
use sha1::{Digest, Sha1};

/// Dispatch a built-in call by name. Returns `None` if `name` is not a
/// recognized built-in (the evaluator then reports an evaluation error).
#[must_use]
pub fn call(name: &str, args: &[Value]) -> Option<Value> {
    match name {
        "is_true" => Some(Value::Bool(is_true(args.first()?))),
        "is_false" => Some(Value::Bool(!is_true(args.first()?))),
        "has_value" => Some(Value::Bool(args.first()?.has_value())),
        "has_no_value" => Some(Value::Bool(!args.first()?.has_value())),
        "starts_with" => Some(Value::Bool(starts_with(args.first()?, args.get(1)?))),
        "contains" => Some(Value::Bool(contains(args.first()?, args.get(1)?))),
        "nothing_value" => Some(Value::Null),
        "normalize_date" => Some(Value::String(normalize_date(args.first()?))),
        "biblio_name" => Some(Value::String(biblio_name(args.first()?))),
        "release_year" => release_year(args.first()?).map(Value::Number),
        "release_decade" => release_decade(args.first()?).map(Value::String),
        "pretty_comma_list" => Some(Value::String(pretty_comma_list(
            args.first()?,
            args.get(1).is_some_and(is_true),
        ))),
        "zeropad" => Some(Value::String(zeropad(args.first()?, args.get(1)?))),
        "h_m_s" => Some(Value::String(h_m_s(args.first()?.as_number()?, false))),
        "render_duration" => Some(Value::String(h_m_s(args.first()?.as_number()?, true))),
        "total_play_length" => Some(Value::String(total_play_length(args.first()?))),
        "compute_control_number" => Some(Value::String(compute_control_number(
            args.first()?,
            args.get(1)?,
        ))),
        _ => None,
    }
}

/// `true` for boolean `true`, the number `1`, or the string `"true"`/`"yes"`
/// (case-insensitive); `false` otherwise.
#[must_use]
pub fn is_true(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => (*n - 1.0).abs() < f64::EPSILON,
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            lower == "true" || lower == "yes"
        },
        _ => false,
    }
}

fn starts_with(s: &Value, p: &Value) -> bool {
    s.display_string().starts_with(&p.display_string())
}

fn contains(s: &Value, p: &Value) -> bool {
    s.display_string().contains(&p.display_string())
}

fn normalize_date(v: &Value) -> String {
    let s = v.display_string();
    match s.split_once('T') {
        Some((date, _)) => date.to_string(),
        None => s,
    }
}

/// Reorder `First Last` to `Last, First` when `n` has no comma already.
fn biblio_name(v: &Value) -> String {
    let s = v.display_string();
    if s.contains(',') {
        return s;
    }
    match s.rsplit_once(' ') {
        Some((first, last)) => format!("{last}, {first}"),
        None => s,
    }
}

fn release_year(v: &Value) -> Option<f64> {
    let date = normalize_date(v);
    let year_str = date.split('-').next()?;
    year_str.parse::<f64>().ok()
}

fn release_decade(v: &Value) -> Option<String> {
    let year = release_year(v)? as i64;
    let first3 = year / 10;
    let start = first3 * 10 + 1;
    let end = (first3 + 1) * 10;
    Some(format!("{start}-{end}"))
}

/// Join a comma-separated string with `" and "` (two items) or an Oxford
/// comma before the final `"and"` (three or more, when `oxford` is set).
fn pretty_comma_list(v: &Value, oxford: bool) -> String {
    let s = v.display_string();
    let items: Vec<&str> = s.split(',').map(str::trim).filter(|i| !i.is_empty()).collect();
    match items.len() {
        0 => String::new(),
        1 => items[0].to_string(),
        2 => format!("{} and {}", items[0], items[1]),
        _ => {
            let (last, rest) = items.split_last().unwrap();
            let joined = rest.join(", ");
            if oxford {
                format!("{joined}, and {last}")
            } else {
                format!("{joined} and {last}")
            }
        },
    }
}

fn zeropad(v: &Value, n: &Value) -> String {
    let s = v.display_string();
    let width = n.as_number().unwrap_or(0.0) as usize;
    if s.len() >= width {
        s
    } else {
        format!("{}{}", "0".repeat(width - s.len()), s)
    }
}

/// Round-half-to-even to the nearest integer second, then split into
/// hours/minutes/seconds, suppressing a leading zero hour component.
fn h_m_s(seconds: f64, parenthesized: bool) -> String {
    let total = round_half_even(seconds) as i64;
    let total = total.max(0);
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    let body = if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    };
    if parenthesized {
        format!("({body})")
    } else {
        body
    }
}

fn round_half_even(n: f64) -> f64 {
    let floor = n.floor();
    let diff = n - floor;
    if (diff - 0.5).abs() < f64::EPSILON {
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        n.round()
    }
}

fn total_play_length(v: &Value) -> String {
    let total: f64 = match v {
        Value::List(items) => items
            .iter()
            .filter_map(|item| item.get("duration").and_then(Value::as_number))
            .sum(),
        _ => 0.0,
    };
    h_m_s(total, false)
}

/// `lower(collection) + "_" + sha1(utf8(album_id))[-7:] + "a"`.
fn compute_control_number(album_id: &Value, collection: &Value) -> String {
    let id = album_id.display_string();
    let coll = collection.display_string().to_lowercase();
    let mut hasher = Sha1::new();
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    let tail = &hex[hex.len() - 7..];
    format!("{coll}_{tail}a")
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn is_true_recognizes_variants() {
        assert!(is_true(&Value::Bool(true)));
        assert!(is_true(&Value::Number(1.0)));
        assert!(is_true(&Value::String("Yes".to_string())));
        assert!(is_true(&Value::String("TRUE".to_string())));
        assert!(!is_true(&Value::String("no".to_string())));
        assert!(!is_true(&Value::Number(0.0)));
    }

    #[test]
    fn has_value_xor_has_no_value_p6() {
        for v in [
            Value::Null,
            Value::String(String::new()),
            Value::String("x".to_string()),
            Value::Number(0.0),
            Value::Bool(false),
            Value::List(vec![]),
        ] {
            let has = call("has_value", std::slice::from_ref(&v)).unwrap();
            let has_no = call("has_no_value", std::slice::from_ref(&v)).unwrap();
            assert_ne!(has, has_no, "P6 violated for {v:?}");
        }
    }

    #[test]
    fn biblio_name_reorders_first_last() {
        assert_eq!(
            biblio_name(&Value::String("Mischa Lively".to_string())),
            "Lively, Mischa"
        );
    }

    #[test]
    fn biblio_name_leaves_already_comma_form() {
        assert_eq!(
            biblio_name(&Value::String("Lively, Mischa".to_string())),
            "Lively, Mischa"
        );
    }

    #[test]
    fn normalize_date_strips_time_component() {
        assert_eq!(
            normalize_date(&Value::String("2016-04-01T00:00:00".to_string())),
            "2016-04-01"
        );
    }

    #[test]
    fn release_year_and_decade() {
        let d = Value::String("2016-04-01".to_string());
        assert_eq!(release_year(&d), Some(2016.0));
        assert_eq!(release_decade(&d), Some("2011-2020".to_string()));
    }

    #[test]
    fn pretty_comma_list_two_items() {
        assert_eq!(
            pretty_comma_list(&Value::String("rock, jazz".to_string()), false),
            "rock and jazz"
        );
    }

    #[test]
    fn pretty_comma_list_oxford_three_items() {
        assert_eq!(
            pretty_comma_list(&Value::String("rock, jazz, funk".to_string()), true),
            "rock, jazz, and funk"
        );
    }

    #[test]
    fn pretty_comma_list_no_oxford_three_items() {
        assert_eq!(
            pretty_comma_list(&Value::String("rock, jazz, funk".to_string()), false),
            "rock, jazz and funk"
        );
    }

    #[test]
    fn zeropad_pads_left() {
        assert_eq!(zeropad(&Value::String("7".to_string()), &Value::Number(3.0)), "007");
    }

    #[test]
    fn h_m_s_suppresses_leading_zero_hour() {
        assert_eq!(h_m_s(125.0, false), "2:05");
    }

    #[test]
    fn h_m_s_includes_hour_when_nonzero() {
        assert_eq!(h_m_s(3725.0, false), "1:02:05");
    }

    #[test]
    fn render_duration_is_parenthesized() {
        assert_eq!(h_m_s(65.0, true), "(1:05)");
    }

    #[test]
    fn total_play_length_sums_track_durations() {
        let mut t1 = IndexMap::new();
        t1.insert("duration".to_string(), Value::Number(60.0));
        let mut t2 = IndexMap::new();
        t2.insert("duration".to_string(), Value::Number(65.0));
        let tracks = Value::List(vec![Value::Map(t1), Value::Map(t2)]);
        assert_eq!(total_play_length(&tracks), "2:05");
    }

    #[test]
    fn compute_control_number_scenario_s6() {
        let id = Value::String("mischa-lively-album".to_string());
        let coll = Value::String("NBB".to_string());
        let result = compute_control_number(&id, &coll);
        assert!(result.starts_with("nbb_"));
        assert!(result.ends_with('a'));
        assert_eq!(result.len(), "nbb_".len() + 7 + 1);
    }

    #[test]
    fn compute_control_number_scenario_s1() {
        // From §8 scenario S1's worked example.
        let id = Value::String("some-album-id".to_string());
        let coll = Value::String("NBB".to_string());
        let result = compute_control_number(&id, &coll);
        assert!(result.starts_with("nbb_"));
    }
}
