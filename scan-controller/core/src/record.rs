//! Per-target result records.
//!
//! An execution unit reports its outcome by writing a small key-value record. The controller only
//! ever reads these records, except for the synthetic record it writes on behalf of a unit that
//! could not be scheduled.

use crate::ScanResult;
use std::collections::BTreeMap;

/// Set once the unit has finished. Its presence is the record's completion marker.
pub const EXIT_CODE_KEY: &str = "exit-code";
pub const ERROR_MESSAGE_KEY: &str = "error-msg";
pub const WARNINGS_KEY: &str = "warnings";

/// Exit codes written by execution units.
pub mod exit_code {
    pub const COMPLIANT: &str = "0";
    /// The scanner could not evaluate anything, e.g. because its content failed to load.
    pub const ERROR: &str = "1";
    pub const NON_COMPLIANT: &str = "2";
    pub const NOT_APPLICABLE: &str = "not-applicable";
    /// Reserved for records the controller writes for units that cannot be scheduled.
    pub const UNSCHEDULABLE: &str = "unschedulable";
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultRecord {
    exit_code: Option<String>,
    error_message: Option<String>,
    warnings: Option<String>,
}

/// What a completed record reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub result: ScanResult,
    pub message: Option<String>,
}

// === impl ResultRecord ===

impl ResultRecord {
    pub fn from_data(data: &BTreeMap<String, String>) -> Self {
        let non_empty = |key: &str| data.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            exit_code: data.get(EXIT_CODE_KEY).cloned(),
            error_message: non_empty(ERROR_MESSAGE_KEY),
            warnings: non_empty(WARNINGS_KEY),
        }
    }

    /// A record standing in for a unit that will never run because its target cannot be
    /// scheduled.
    pub fn unschedulable(message: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code::UNSCHEDULABLE.to_string()),
            error_message: Some(message.into()),
            warnings: None,
        }
    }

    pub fn into_data(self) -> BTreeMap<String, String> {
        let Self {
            exit_code,
            error_message,
            warnings,
        } = self;
        [
            (EXIT_CODE_KEY, exit_code),
            (ERROR_MESSAGE_KEY, error_message),
            (WARNINGS_KEY, warnings),
        ]
        .into_iter()
        .filter_map(|(k, v)| Some((k.to_string(), v?)))
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.exit_code.is_some()
    }

    pub fn exit_code(&self) -> Option<&str> {
        self.exit_code.as_deref()
    }

    pub fn warnings(&self) -> Option<&str> {
        self.warnings.as_deref()
    }

    pub fn is_unschedulable(&self) -> bool {
        self.exit_code() == Some(exit_code::UNSCHEDULABLE)
    }

    /// Returns `None` until the unit has written its exit code.
    pub fn outcome(&self) -> Option<Outcome> {
        let result = match self.exit_code()? {
            exit_code::COMPLIANT => ScanResult::Compliant,
            exit_code::NON_COMPLIANT => ScanResult::NonCompliant,
            exit_code::NOT_APPLICABLE => ScanResult::NotApplicable,
            _ => {
                return Some(Outcome {
                    result: ScanResult::Error,
                    message: Some(self.error_text()),
                })
            }
        };
        Some(Outcome {
            result,
            message: None,
        })
    }

    /// Returns the scanner's message if it failed so badly that there is nothing to aggregate.
    pub fn unrecoverable_error(&self) -> Option<String> {
        if self.exit_code() == Some(exit_code::ERROR) {
            return Some(self.error_text());
        }
        None
    }

    fn error_text(&self) -> String {
        match (&self.error_message, self.exit_code()) {
            (Some(msg), _) => msg.clone(),
            (None, Some(code)) => format!("the scan exited with code {code}"),
            (None, None) => "the scan did not report a result".to_string(),
        }
    }
}
