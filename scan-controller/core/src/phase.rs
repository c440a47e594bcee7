use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle phase of a scan.
///
/// A scan normally moves `Pending -> Launching -> Running -> Aggregating -> Done`. A scan falls
/// back from `Running` to `Launching` when one of its execution units disappears, and from `Done`
/// to `Pending` when a rescan is requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ScanPhase {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "LAUNCHING")]
    Launching,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "AGGREGATING")]
    Aggregating,
    #[serde(rename = "DONE")]
    Done,

    /// A phase this controller never writes. Scans in an unknown phase are left alone.
    #[serde(other)]
    Unknown,
}

/// The verdict of a scan, or of a single target of a scan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ScanResult {
    #[serde(rename = "NOT-AVAILABLE")]
    NotAvailable,
    #[serde(rename = "COMPLIANT")]
    Compliant,
    #[serde(rename = "NON-COMPLIANT")]
    NonCompliant,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "NOT-APPLICABLE")]
    NotApplicable,
    #[serde(rename = "INCONSISTENT")]
    Inconsistent,
}

// === impl ScanPhase ===

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Launching => "LAUNCHING",
            Self::Running => "RUNNING",
            Self::Aggregating => "AGGREGATING",
            Self::Done => "DONE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ScanResult ===

impl ScanResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAvailable => "NOT-AVAILABLE",
            Self::Compliant => "COMPLIANT",
            Self::NonCompliant => "NON-COMPLIANT",
            Self::Error => "ERROR",
            Self::NotApplicable => "NOT-APPLICABLE",
            Self::Inconsistent => "INCONSISTENT",
        }
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Status {
        phase: ScanPhase,
    }

    #[test]
    fn phases_use_upper_case_names() {
        let phase: ScanPhase = serde_json::from_str("\"AGGREGATING\"").unwrap();
        assert_eq!(phase, ScanPhase::Aggregating);
        assert_eq!(
            serde_json::to_string(&ScanPhase::Done).unwrap(),
            "\"DONE\""
        );
    }

    #[test]
    fn foreign_phase_is_unknown() {
        let status: Status = serde_json::from_str(r#"{"phase": "PAUSED"}"#).unwrap();
        assert_eq!(status.phase, ScanPhase::Unknown);
    }

    #[test]
    fn results_use_hyphenated_names() {
        let result: ScanResult = serde_json::from_str("\"NON-COMPLIANT\"").unwrap();
        assert_eq!(result, ScanResult::NonCompliant);
        assert_eq!(ScanResult::NotApplicable.to_string(), "NOT-APPLICABLE");
    }
}
