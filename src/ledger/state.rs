use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;
use crate::model::CustomerId;
use crate::tier::{TierName, TierTable};

/// A loyalty customer with their spend, point balance and tier.
///
/// Balance, spend and tier only change through the ledger, and the tier is
/// always recomputed in the same step that changes spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    email: String,
    phone: String,
    points_balance: u64,
    cumulative_spend: Amount,
    tier: TierName,
    join_date: DateTime<Utc>,
}

impl Customer {
    pub(crate) fn new(
        id: CustomerId,
        name: String,
        email: String,
        phone: String,
        join_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            phone,
            points_balance: 0,
            cumulative_spend: Amount::ZERO,
            tier: TierName::Bronze,
            join_date,
        }
    }

    pub fn id(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn points_balance(&self) -> u64 {
        self.points_balance
    }

    pub fn cumulative_spend(&self) -> Amount {
        self.cumulative_spend
    }

    pub fn tier(&self) -> TierName {
        self.tier
    }

    pub fn join_date(&self) -> DateTime<Utc> {
        self.join_date
    }

    /// Spend and balance after a purchase, or `None` if either would
    /// overflow.
    pub(crate) fn checked_accrual(&self, amount: Amount, points: u64) -> Option<(Amount, u64)> {
        Some((
            self.cumulative_spend.checked_add(amount)?,
            self.points_balance.checked_add(points)?,
        ))
    }

    /// Apply a purchase: add spend and points, then re-resolve the tier.
    /// Totals must come from `checked_accrual`.
    pub(crate) fn accrue(&mut self, totals: (Amount, u64), tiers: &TierTable) {
        (self.cumulative_spend, self.points_balance) = totals;
        self.retier(tiers);
    }

    /// Deduct redeemed points. Solvency is checked by the caller.
    pub(crate) fn debit_points(&mut self, points: u64) {
        self.points_balance -= points;
    }

    pub(crate) fn retier(&mut self, tiers: &TierTable) {
        self.tier = tiers.resolve(self.cumulative_spend).name;
    }
}
