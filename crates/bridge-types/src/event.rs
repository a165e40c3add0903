//! Event Record: append-only JSONL entry (spec data model §3, "Event Record").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl EventRecord {
    pub fn new(kind: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            event: event.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_field_renames_to_type() {
        let rec = EventRecord::new("lock", "released", serde_json::json!({"resource": "x"}));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "lock");
        assert!(json.get("kind").is_none());
    }
}
