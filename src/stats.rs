//! Read-only summaries derived from the ledger history.
//!
//! Everything is recomputed from the full history on each call, and empty
//! history yields zero-filled results.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::Amount;
use crate::ledger::{Customer, Ledger};
use crate::model::{Redemption, RewardCategory, Transaction};
use crate::tier::TierName;

/// Number of calendar months in the trailing spend series.
pub const MONTHLY_WINDOW: usize = 6;

/// Spend and points for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyStat {
    pub year: i32,
    /// 1-based calendar month.
    pub month: u32,
    pub spend: Amount,
    pub points: u64,
}

impl MonthlyStat {
    fn empty(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            spend: Amount::ZERO,
            points: 0,
        }
    }

    /// `YYYY-MM`
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub monthly: [MonthlyStat; MONTHLY_WINDOW],
    pub tiers: Vec<(TierName, usize)>,
    pub redemptions_by_category: Vec<(RewardCategory, usize)>,
}

impl LedgerStats {
    /// All summaries for `ledger`, with the monthly window ending at the
    /// month of `now`.
    pub fn compute(ledger: &Ledger, now: DateTime<Utc>) -> Self {
        Self {
            monthly: monthly_series(ledger.transactions(), now),
            tiers: tier_distribution(ledger.customers()),
            redemptions_by_category: redemptions_by_category(ledger.redemptions()),
        }
    }
}

/// Spend and points per month for the six calendar months ending with the
/// month of `now`, oldest first. Months without purchases are zero.
pub fn monthly_series(
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> [MonthlyStat; MONTHLY_WINDOW] {
    let current = now.year() * 12 + now.month0() as i32;

    let mut series: [MonthlyStat; MONTHLY_WINDOW] = std::array::from_fn(|i| {
        let index = current - (MONTHLY_WINDOW - 1 - i) as i32;
        MonthlyStat::empty(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
    });

    let first = current - (MONTHLY_WINDOW as i32 - 1);
    for tx in transactions {
        let index = tx.date.year() * 12 + tx.date.month0() as i32;
        if (first..=current).contains(&index) {
            let bucket = &mut series[(index - first) as usize];
            bucket.spend = bucket.spend.saturating_add(tx.amount);
            bucket.points = bucket.points.saturating_add(tx.points_earned);
        }
    }

    series
}

/// Customer count per tier, one entry for every tier name.
pub fn tier_distribution<'a>(
    customers: impl IntoIterator<Item = &'a Customer>,
) -> Vec<(TierName, usize)> {
    let mut counts: Vec<(TierName, usize)> =
        TierName::ALL.iter().map(|&tier| (tier, 0)).collect();
    for customer in customers {
        if let Some(entry) = counts.iter_mut().find(|(tier, _)| *tier == customer.tier()) {
            entry.1 += 1;
        }
    }
    counts
}

/// Redemption count per reward category, one entry for every category.
pub fn redemptions_by_category(redemptions: &[Redemption]) -> Vec<(RewardCategory, usize)> {
    let mut counts: Vec<(RewardCategory, usize)> =
        RewardCategory::ALL.iter().map(|&category| (category, 0)).collect();
    for redemption in redemptions {
        if let Some(entry) = counts
            .iter_mut()
            .find(|(category, _)| *category == redemption.reward.category)
        {
            entry.1 += 1;
        }
    }
    counts
}
