//! Combines per-target result records into a scan's verdict.
//!
//! Precedence, from strongest to weakest:
//!
//! 1. A target without a completed record means the verdict is not ready.
//! 2. An error from any target is the verdict, except that a non-strict scan skips targets that
//!    could not be scheduled.
//! 3. Any non-compliant target makes the scan non-compliant.
//! 4. Otherwise the scan is compliant, or not applicable if no target was.
//!
//! Consistency is checked separately: a scan with inconsistent check results is inconsistent
//! whatever the verdict was.

use crate::{record::ResultRecord, ScanResult, INCONSISTENT_CHECK_LABEL};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregate {
    /// At least one target has not finished writing its record.
    NotReady,

    Ready {
        verdict: Verdict,
        /// Unschedulable targets that were left out of the verdict.
        skipped: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub result: ScanResult,
    /// Set when the verdict should also be surfaced as the scan's error message.
    pub error: Option<String>,
}

pub fn aggregate<'r, I>(records: I, strict: bool) -> Aggregate
where
    I: IntoIterator<Item = (&'r str, Option<&'r ResultRecord>)>,
{
    let mut ready = true;
    let mut skipped = Vec::new();
    let mut error = None;
    let mut non_compliant = false;
    let mut compliant = false;
    let mut not_applicable = false;

    for (target, record) in records {
        let (record, outcome) = match record.and_then(|r| Some((r, r.outcome()?))) {
            Some(found) => found,
            None => {
                ready = false;
                continue;
            }
        };

        match outcome.result {
            ScanResult::Error if !strict && record.is_unschedulable() => {
                skipped.push(target.to_string());
            }
            ScanResult::Error => {
                // The first error wins; later records are only checked for readiness.
                error.get_or_insert(Verdict {
                    result: ScanResult::Error,
                    error: outcome.message,
                });
            }
            ScanResult::NonCompliant => non_compliant = true,
            ScanResult::Compliant => compliant = true,
            ScanResult::NotApplicable => not_applicable = true,
            ScanResult::NotAvailable | ScanResult::Inconsistent => {}
        }
    }

    if !ready {
        return Aggregate::NotReady;
    }

    let verdict = if let Some(error) = error {
        error
    } else if non_compliant {
        Verdict::new(ScanResult::NonCompliant)
    } else if compliant {
        Verdict::new(ScanResult::Compliant)
    } else if not_applicable {
        Verdict::new(ScanResult::NotApplicable)
    } else {
        Verdict::error("no target reported a result")
    };

    Aggregate::Ready { verdict, skipped }
}

// === impl Verdict ===

impl Verdict {
    pub fn new(result: ScanResult) -> Self {
        Self {
            result,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: ScanResult::Error,
            error: Some(message.into()),
        }
    }

    /// Overrides the verdict when any of the scan's check results were flagged inconsistent.
    pub fn with_consistency(self, inconsistent_checks: usize) -> Self {
        if inconsistent_checks == 0 {
            return self;
        }

        Self {
            result: ScanResult::Inconsistent,
            error: Some(format!(
                "results were not consistent, search for compliancecheckresults labeled with {INCONSISTENT_CHECK_LABEL}"
            )),
        }
    }
}
