//! Collection voucher domain model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::mail::SourceMeta;
use super::report::Institution;

/// One received payment, keyed by `(voucher_no, institution)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionVoucher {
    pub voucher_no: String,
    pub institution: Option<Institution>,
    pub voucher_date: NaiveDate,
    pub party_name: String,
    pub dealer_id: Option<String>,
    pub zone: Option<String>,
    pub district: Option<String>,
    pub amount: Decimal,
    pub remarks: Option<String>,
    pub tso_name: Option<String>,
    pub tso_user_id: Option<i64>,
    pub source: SourceMeta,
}

impl CollectionVoucher {
    pub fn key(&self) -> (String, &'static str) {
        (self.voucher_no.clone(), Institution::key(self.institution))
    }
}
