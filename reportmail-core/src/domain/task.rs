//! Daily task (PJP visit assignment) domain model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::mail::SourceMeta;
use super::names::normalize;
use super::report::Institution;

pub const TASK_STATUS_ASSIGNED: &str = "Assigned";
pub const DEFAULT_VISIT_TYPE: &str = "Visit";

/// A scheduled visit for a field user, produced from a PJP sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTask {
    pub user_id: i64,
    pub task_date: NaiveDate,
    pub visit_type: String,
    pub status: String,
    /// Dealer or site name as written in the sheet
    pub dealer_name: Option<String>,
    pub dealer_id: Option<String>,
    pub zone: Option<String>,
    pub remarks: Option<String>,
    pub institution: Option<Institution>,
    pub source: SourceMeta,
}

impl DailyTask {
    pub fn new(user_id: i64, task_date: NaiveDate, source: SourceMeta) -> Self {
        Self {
            user_id,
            task_date,
            visit_type: DEFAULT_VISIT_TYPE.to_string(),
            status: TASK_STATUS_ASSIGNED.to_string(),
            dealer_name: None,
            dealer_id: None,
            zone: None,
            remarks: None,
            institution: None,
            source,
        }
    }

    /// Dealer part of the natural key
    pub fn dealer_key(&self) -> String {
        self.dealer_name.as_deref().map(normalize).unwrap_or_default()
    }
}
