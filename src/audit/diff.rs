//! Diff generation for audit logging
//!
//! Generates human-readable diffs between the recognized key/value entries
//! of a configuration before and after a change.

use std::collections::BTreeMap;

use serde_json::Value;

/// Generate a human-readable diff between two JSON values
///
/// Only top-level field changes are reported. Returns `None` when nothing changed.
pub fn generate_diff(before: &Value, after: &Value) -> Option<String> {
    match (before, after) {
        (Value::Object(before_obj), Value::Object(after_obj)) => {
            let mut changes = Vec::new();

            for (key, before_val) in before_obj {
                match after_obj.get(key) {
                    Some(after_val) if after_val != before_val => changes.push(format!(
                        "{}: {} -> {}",
                        key,
                        format_value(before_val),
                        format_value(after_val)
                    )),
                    Some(_) => {}
                    None => changes.push(format!(
                        "{}: {} -> (removed)",
                        key,
                        format_value(before_val)
                    )),
                }
            }

            for (key, after_val) in after_obj {
                if !before_obj.contains_key(key) {
                    changes.push(format!("{}: (added) -> {}", key, format_value(after_val)));
                }
            }

            if changes.is_empty() {
                None
            } else {
                Some(changes.join(", "))
            }
        }
        _ if before != after => Some(format!(
            "{} -> {}",
            format_value(before),
            format_value(after)
        )),
        _ => None,
    }
}

/// Diff two key/value entry maps
pub fn diff_entries(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
) -> Option<String> {
    let to_value = |map: &BTreeMap<String, String>| {
        Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    };
    generate_diff(&to_value(before), &to_value(after))
}

/// Format a JSON value for human-readable display
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if s.chars().count() > 50 {
                let head: String = s.chars().take(47).collect();
                format!("\"{}...\"", head)
            } else {
                format!("\"{}\"", s)
            }
        }
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_changed_entry() {
        let before = entries(&[("listen", "80"), ("server_name", "a.test")]);
        let after = entries(&[("listen", "8080"), ("server_name", "a.test")]);

        let diff = diff_entries(&before, &after).unwrap();
        assert_eq!(diff, "listen: \"80\" -> \"8080\"");
    }

    #[test]
    fn test_added_and_removed_entries() {
        let before = entries(&[("maxretry", "5"), ("ignoreip", "127.0.0.1")]);
        let after = entries(&[("maxretry", "5"), ("bantime", "3600")]);

        let diff = diff_entries(&before, &after).unwrap();
        assert!(diff.contains("ignoreip: \"127.0.0.1\" -> (removed)"));
        assert!(diff.contains("bantime: (added) -> \"3600\""));
        assert!(!diff.contains("maxretry"));
    }

    #[test]
    fn test_no_changes() {
        let same = entries(&[("pm", "dynamic")]);
        assert!(diff_entries(&same, &same).is_none());
    }

    #[test]
    fn test_non_object_values() {
        assert_eq!(
            generate_diff(&json!(true), &json!(false)).as_deref(),
            Some("true -> false")
        );
        assert!(generate_diff(&json!(1), &json!(1)).is_none());
    }

    #[test]
    fn test_long_string_truncation() {
        let before = json!({"comment": "é".repeat(100)});
        let after = json!({"comment": "short"});

        let diff = generate_diff(&before, &after).unwrap();
        assert!(diff.contains("...\""));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!(null)), "null");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!("test")), "\"test\"");
        assert_eq!(format_value(&json!([1, 2, 3])), "[3 items]");
        assert_eq!(format_value(&json!({"a": 1, "b": 2})), "{2 fields}");
    }
}
