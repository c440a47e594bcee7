use crate::ComplianceScanStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const PROCESSING_CONDITION: &str = "Processing";
pub const READY_CONDITION: &str = "Ready";

const TRUE: &str = "True";
const FALSE: &str = "False";

impl ComplianceScanStatus {
    pub fn set_condition_pending(&mut self, now: &Time) {
        self.set_condition(now, PROCESSING_CONDITION, TRUE, "Pending", "");
        self.set_condition(now, READY_CONDITION, FALSE, "Pending", "The scan is pending");
    }

    pub fn set_conditions_processing(&mut self, now: &Time) {
        self.set_condition(now, PROCESSING_CONDITION, TRUE, "Running", "");
        self.set_condition(
            now,
            READY_CONDITION,
            FALSE,
            "Processing",
            "The scan is processing",
        );
    }

    pub fn set_condition_ready(&mut self, now: &Time) {
        self.set_condition(now, PROCESSING_CONDITION, FALSE, "NotRunning", "");
        self.set_condition(now, READY_CONDITION, TRUE, "Done", "The scan is done");
    }

    pub fn set_condition_invalid(&mut self, now: &Time) {
        self.set_condition(now, PROCESSING_CONDITION, FALSE, "Invalid", "");
        self.set_condition(now, READY_CONDITION, FALSE, "Invalid", "The scan is invalid");
    }

    pub fn set_condition_timeout(&mut self, now: &Time) {
        self.set_condition(now, PROCESSING_CONDITION, FALSE, "Timeout", "");
        self.set_condition(now, READY_CONDITION, FALSE, "Timeout", "The scan timed out");
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// The transition time only moves when the condition's status changes.
    fn set_condition(&mut self, now: &Time, type_: &str, status: &str, reason: &str, message: &str) {
        let last_transition_time = match self.condition(type_) {
            Some(c) if c.status == status => c.last_transition_time.clone(),
            _ => now.clone(),
        };
        let condition = Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time,
            observed_generation: None,
        };

        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(c) => *c = condition,
            None => self.conditions.push(condition),
        }
    }
}
