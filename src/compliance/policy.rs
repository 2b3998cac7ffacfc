use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::domain::ComplianceCategory;

const DEFAULT_WARNING_THRESHOLD: f32 = 70.0;
const DEFAULT_ESCALATION_GRACE_HOURS: i64 = 48;
const DEFAULT_READINESS_WINDOW_HOURS: i64 = 24;
const DEFAULT_QUALITY_CAP: u8 = 70;
const DEFAULT_SUBMISSION_LAG_DAYS: i64 = 7;
const DEFAULT_ISSUE_DUE_DAYS: i64 = 7;

/// Thresholds and weights consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompliancePolicy {
    warning_threshold: f32,
    escalation_grace_hours: i64,
    readiness_window_hours: i64,
    quality_cap: u8,
    submission_lag_days: i64,
    issue_due_days: i64,
    area_weights: BTreeMap<ComplianceCategory, f32>,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            escalation_grace_hours: DEFAULT_ESCALATION_GRACE_HOURS,
            readiness_window_hours: DEFAULT_READINESS_WINDOW_HOURS,
            quality_cap: DEFAULT_QUALITY_CAP,
            submission_lag_days: DEFAULT_SUBMISSION_LAG_DAYS,
            issue_due_days: DEFAULT_ISSUE_DUE_DAYS,
            area_weights: BTreeMap::new(),
        }
    }
}

impl CompliancePolicy {
    pub fn with_warning_threshold(mut self, percent: f32) -> Self {
        self.warning_threshold = if percent.is_finite() && (0.0..=100.0).contains(&percent) {
            percent
        } else {
            DEFAULT_WARNING_THRESHOLD
        };
        self
    }

    pub fn with_escalation_grace_hours(mut self, hours: i64) -> Self {
        self.escalation_grace_hours = if hours >= 0 {
            hours
        } else {
            DEFAULT_ESCALATION_GRACE_HOURS
        };
        self
    }

    pub fn with_readiness_window_hours(mut self, hours: i64) -> Self {
        self.readiness_window_hours = if hours > 0 {
            hours
        } else {
            DEFAULT_READINESS_WINDOW_HOURS
        };
        self
    }

    pub fn with_quality_cap(mut self, cap: u8) -> Self {
        self.quality_cap = cap.min(100);
        self
    }

    pub fn with_submission_lag_days(mut self, days: i64) -> Self {
        self.submission_lag_days = if days > 0 {
            days
        } else {
            DEFAULT_SUBMISSION_LAG_DAYS
        };
        self
    }

    /// Weight a category in the overall score. Non-positive weights are ignored.
    pub fn with_area_weight(mut self, category: ComplianceCategory, weight: f32) -> Self {
        if weight.is_finite() && weight > 0.0 {
            self.area_weights.insert(category, weight);
        }
        self
    }

    pub fn warning_threshold(&self) -> f32 {
        self.warning_threshold
    }

    pub fn escalation_grace(&self) -> Duration {
        Duration::hours(self.escalation_grace_hours)
    }

    pub fn readiness_window(&self) -> Duration {
        Duration::hours(self.readiness_window_hours)
    }

    pub fn quality_cap(&self) -> u8 {
        self.quality_cap
    }

    pub fn submission_lag(&self) -> Duration {
        Duration::days(self.submission_lag_days)
    }

    /// Due date offset given to issues the engine raises on its own.
    pub fn issue_due(&self) -> Duration {
        Duration::days(self.issue_due_days)
    }

    pub fn area_weight(&self, category: ComplianceCategory) -> f32 {
        self.area_weights.get(&category).copied().unwrap_or(1.0)
    }
}
