//! Outstanding aging domain model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::bounded_amount;
use super::mail::SourceMeta;
use super::names::normalize;
use super::report::Institution;
use super::result::{Error, Result};

/// Amount outstanding per aging bucket (days since due)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgingBuckets {
    pub less_than_10_days: Decimal,
    pub days_10_to_15: Decimal,
    pub days_15_to_21: Decimal,
    pub days_21_to_30: Decimal,
    pub days_30_to_45: Decimal,
    pub days_45_to_60: Decimal,
    pub days_60_to_75: Decimal,
    pub days_75_to_90: Decimal,
    pub greater_than_90_days: Decimal,
}

impl AgingBuckets {
    /// Sum of all buckets, rejected when it leaves the storable range
    pub fn total(&self) -> Result<Decimal> {
        let sum = [
            self.less_than_10_days,
            self.days_10_to_15,
            self.days_15_to_21,
            self.days_21_to_30,
            self.days_30_to_45,
            self.days_45_to_60,
            self.days_60_to_75,
            self.days_75_to_90,
            self.greater_than_90_days,
        ]
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| Error::validation("aging total overflows"))?;
        bounded_amount(sum, "aging total")
    }
}

/// Dealer balance aging as of a report date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutstandingAgingRecord {
    pub report_date: NaiveDate,
    pub institution: Option<Institution>,
    /// Dealer name exactly as written in the sheet
    pub dealer_name: String,
    pub verified_dealer_id: Option<String>,
    pub zone: Option<String>,
    pub security_deposit: Decimal,
    pub pending_amount: Decimal,
    pub buckets: AgingBuckets,
    pub is_overdue: bool,
    pub tso_name: Option<String>,
    pub tso_user_id: Option<i64>,
    pub source: SourceMeta,
}

impl OutstandingAgingRecord {
    /// Dealer part of the natural key.
    ///
    /// Resolved dealers key on their id; unmatched dealers key on their
    /// normalized raw name so distinct unknown dealers never collapse.
    pub fn dealer_key(&self) -> String {
        match &self.verified_dealer_id {
            Some(id) => format!("id:{}", id),
            None => format!("name:{}", normalize(&self.dealer_name)),
        }
    }
}
