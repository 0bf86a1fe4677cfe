//! Helpers for editing the cluster config from the command line

use eyre::{Result, eyre};
use serde_json::{Map, Value};

/// Parse `key=value`, reading the value as JSON and falling back to a string
pub fn parse_assignment(s: &str) -> Result<(String, Value)> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| eyre!("Expected KEY=VALUE, got: {}", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(eyre!("Empty key in assignment: {}", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Set a dotted path (`postgresql.parameters.work_mem`) inside `root`
///
/// Intermediate objects are created as needed. A `null` value removes the key.
pub fn set_path(root: &mut Value, dotted: &str, value: Value) {
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let mut parts = dotted.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        let Value::Object(map) = node else {
            return;
        };
        if parts.peek().is_none() {
            if value.is_null() {
                map.remove(part);
            } else {
                map.insert(part.to_string(), value);
            }
            return;
        }
        let child = map.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        node = child;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assignment_json_value() {
        let (key, value) = parse_assignment("loop_wait=5").unwrap();
        assert_eq!(key, "loop_wait");
        assert_eq!(value, json!(5));

        let (_, value) = parse_assignment("pause=true").unwrap();
        assert_eq!(value, json!(true));
    }

    #[test]
    fn test_parse_assignment_string_fallback() {
        let (_, value) = parse_assignment("postgresql.parameters.work_mem=4MB").unwrap();
        assert_eq!(value, json!("4MB"));
    }

    #[test]
    fn test_parse_assignment_rejects_missing_equals() {
        assert!(parse_assignment("loop_wait").is_err());
        assert!(parse_assignment("=5").is_err());
    }

    #[test]
    fn test_set_path_nested() {
        let mut root = json!({"ttl": 30});
        set_path(&mut root, "postgresql.parameters.work_mem", json!("4MB"));
        assert_eq!(
            root,
            json!({"ttl": 30, "postgresql": {"parameters": {"work_mem": "4MB"}}})
        );
    }

    #[test]
    fn test_set_path_null_removes() {
        let mut root = json!({"ttl": 30, "pause": true});
        set_path(&mut root, "pause", Value::Null);
        assert_eq!(root, json!({"ttl": 30}));
    }

    #[test]
    fn test_set_path_on_null_root() {
        let mut root = Value::Null;
        set_path(&mut root, "pause", json!(true));
        assert_eq!(root, json!({"pause": true}));
    }
}
