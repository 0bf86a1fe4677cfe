//! Member tags derived from the `tags` config section

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Tags that only mean something when set to a truthy value
const RESERVED: [&str; 3] = ["clonefrom", "nofailover", "noloadbalance"];

/// JSON truthiness: false, null, 0, "" and empty collections are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Filtered member tags
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tags(BTreeMap<String, Value>);

impl Tags {
    /// Drop reserved tags with falsy values, keep everything else
    pub fn from_config(raw: &BTreeMap<String, Value>) -> Self {
        Self(
            raw.iter()
                .filter(|(name, value)| !RESERVED.contains(&name.as_str()) || is_truthy(value))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Never promote this member
    pub fn nofailover(&self) -> bool {
        self.get("nofailover").is_some_and(is_truthy)
    }

    /// Exclude this member from load balancing
    pub fn noloadbalance(&self) -> bool {
        self.get("noloadbalance").is_some_and(is_truthy)
    }

    /// Member to replicate from instead of the leader
    pub fn replicatefrom(&self) -> Option<&str> {
        self.get("replicatefrom").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_falsy_reserved_tags_dropped() {
        let tags = Tags::from_config(&raw(json!({
            "nofailover": false,
            "noloadbalance": 0,
            "clonefrom": "",
            "region": "eu",
        })));
        assert_eq!(tags.as_map().len(), 1);
        assert_eq!(tags.get("region"), Some(&json!("eu")));
        assert!(!tags.nofailover());
        assert!(!tags.noloadbalance());
    }

    #[test]
    fn test_truthy_reserved_tags_kept() {
        let tags = Tags::from_config(&raw(json!({
            "nofailover": true,
            "noloadbalance": "yes",
            "clonefrom": 1,
        })));
        assert_eq!(tags.as_map().len(), 3);
        assert!(tags.nofailover());
        assert!(tags.noloadbalance());
    }

    #[test]
    fn test_unreserved_falsy_tags_pass_through() {
        let tags = Tags::from_config(&raw(json!({"custom": false, "weight": 0})));
        assert_eq!(tags.get("custom"), Some(&json!(false)));
        assert_eq!(tags.get("weight"), Some(&json!(0)));
    }

    #[test]
    fn test_replicatefrom() {
        let tags = Tags::from_config(&raw(json!({"replicatefrom": "node2"})));
        assert_eq!(tags.replicatefrom(), Some("node2"));
        assert_eq!(Tags::default().replicatefrom(), None);
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(-1)));
        assert!(is_truthy(&json!(["a"])));
        assert!(is_truthy(&json!({"a": 1})));
    }
}
