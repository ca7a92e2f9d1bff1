//! Projection and projection-vs-actual domain models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::bounded_amount;
use super::mail::SourceMeta;
use super::report::Institution;
use super::result::{Error, Result};

/// Planned order quantity and collection amount per zone and dealer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub report_date: NaiveDate,
    pub institution: Option<Institution>,
    pub zone: String,
    pub order_dealer_name: String,
    pub collection_dealer_name: String,
    pub dealer_id: Option<String>,
    pub order_qty_mt: Decimal,
    pub collection_amount: Decimal,
    pub source: SourceMeta,
}

/// Projection compared against actual orders, dispatches and collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionVsActualRecord {
    pub report_date: NaiveDate,
    pub institution: Option<Institution>,
    pub zone: String,
    pub dealer_name: String,
    pub dealer_id: Option<String>,
    pub order_projection_mt: Decimal,
    pub actual_order_mt: Decimal,
    pub do_done_mt: Decimal,
    pub projection_vs_actual_order_mt: Decimal,
    pub actual_order_vs_do_mt: Decimal,
    pub collection_projection: Decimal,
    pub actual_collection: Decimal,
    pub short_fall: Decimal,
    pub percent: Decimal,
    pub source: SourceMeta,
}

impl ProjectionVsActualRecord {
    /// Fill the derived metrics from the raw ones
    ///
    /// Fails with a validation error when a derived value overflows or
    /// leaves the storable range.
    pub fn compute_derived(&mut self) -> Result<()> {
        let difference = |a: Decimal, b: Decimal, what: &str| -> Result<Decimal> {
            let value = a
                .checked_sub(b)
                .ok_or_else(|| Error::validation(format!("{} overflows", what)))?;
            bounded_amount(value, what)
        };

        let projection_vs_actual = difference(self.order_projection_mt, self.actual_order_mt, "projection vs actual order")?;
        let actual_vs_do = difference(self.actual_order_mt, self.do_done_mt, "actual order vs DO")?;
        let short_fall = difference(self.collection_projection, self.actual_collection, "short fall")?;
        let percent = if self.collection_projection.is_zero() {
            Decimal::ZERO
        } else {
            let percent = self
                .actual_collection
                .checked_div(self.collection_projection)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(|| Error::validation("collection percent overflows"))?;
            bounded_amount(percent.round_dp(2), "collection percent")?
        };

        self.projection_vs_actual_order_mt = projection_vs_actual;
        self.actual_order_vs_do_mt = actual_vs_do;
        self.short_fall = short_fall;
        self.percent = percent;
        Ok(())
    }
}
