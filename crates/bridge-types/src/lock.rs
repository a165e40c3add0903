//! Lock File companion info record (spec data model §3, "Lock File").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lock ordering is fixed to eliminate deadlock (spec §4.1, §5):
/// run -> manifest -> document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Run,
    Manifest,
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub resource: String,
    #[serde(rename = "type")]
    pub lock_type: LockType,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    pub caller: String,
    pub hostname: String,
    /// How the lock was realized: `"flock"` or `"mkdir"` (NFS fallback).
    pub method: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_type_orders_by_acquisition_sequence() {
        assert!(LockType::Run < LockType::Manifest);
        assert!(LockType::Manifest < LockType::Document);
    }

    #[test]
    fn lock_info_field_renames_to_type() {
        let info = LockInfo {
            resource: "state.json".to_string(),
            lock_type: LockType::Document,
            pid: 123,
            timestamp: Utc::now(),
            caller: "bridge-core".to_string(),
            hostname: "host".to_string(),
            method: "flock".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "document");
        assert!(json.get("lock_type").is_none());
    }
}
