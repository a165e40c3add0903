//! Finding: reviewer output (spec data model §3, "Finding").

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `{ BLOCKER, DISPUTED, VISION, SPECULATION, INFO, ... }`. The spec leaves
/// the severity set open-ended ("..."); `Other` carries whatever label a
/// model adapter emitted that doesn't match a known variant, so no finding
/// is ever silently dropped for having an unrecognized severity.
///
/// Serialized as a bare uppercase string (`"BLOCKER"`, `"NITPICK"`, ...)
/// rather than an externally-tagged enum, since `Other` must round-trip
/// through arbitrary adapter-supplied labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Blocker,
    Disputed,
    Vision,
    Speculation,
    Info,
    Other(String),
}

impl Serialize for Severity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Err(D::Error::custom("severity must not be empty"));
        }
        Ok(match raw.as_str() {
            "BLOCKER" => Severity::Blocker,
            "DISPUTED" => Severity::Disputed,
            "VISION" => Severity::Vision,
            "SPECULATION" => Severity::Speculation,
            "INFO" => Severity::Info,
            _ => Severity::Other(raw),
        })
    }
}

impl Severity {
    /// Findings routed to the Vision Registry (spec §3, §4.3).
    pub fn routes_to_vision_registry(&self) -> bool {
        matches!(self, Severity::Vision | Severity::Speculation)
    }

    pub fn label(&self) -> &str {
        match self {
            Severity::Blocker => "BLOCKER",
            Severity::Disputed => "DISPUTED",
            Severity::Vision => "VISION",
            Severity::Speculation => "SPECULATION",
            Severity::Info => "INFO",
            Severity::Other(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingLocation {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<FindingLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_and_speculation_route_to_registry() {
        assert!(Severity::Vision.routes_to_vision_registry());
        assert!(Severity::Speculation.routes_to_vision_registry());
        assert!(!Severity::Blocker.routes_to_vision_registry());
        assert!(!Severity::Info.routes_to_vision_registry());
    }

    #[test]
    fn other_severity_round_trips() {
        let f = Finding {
            severity: Severity::Other("NITPICK".to_string()),
            id: "f-1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            location: None,
            potential: None,
        };
        let json = serde_json::to_string(&f).unwrap();
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.severity, Severity::Other("NITPICK".to_string()));
    }

    #[test]
    fn known_severity_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&Severity::Disputed).unwrap();
        assert_eq!(json, "\"DISPUTED\"");
    }
}
