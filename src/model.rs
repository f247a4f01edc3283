//! Core domain records exchanged with the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Amount;

/// Customer identifier.
pub type CustomerId = u32;

/// Reward catalog identifier.
pub type RewardId = u32;

/// Purchase transaction identifier.
pub type TransactionId = u64;

/// Redemption identifier.
pub type RedemptionId = u64;

/// A purchase and the points it earned. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub date: DateTime<Utc>,
    pub amount: Amount,
    /// Fixed with the multiplier in effect when the purchase was recorded.
    pub points_earned: u64,
    pub store_location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RewardCategory {
    Discount,
    Product,
    Experience,
}

impl RewardCategory {
    pub const ALL: [RewardCategory; 3] = [
        RewardCategory::Discount,
        RewardCategory::Product,
        RewardCategory::Experience,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RewardCategory::Discount => "Discount",
            RewardCategory::Product => "Product",
            RewardCategory::Experience => "Experience",
        }
    }
}

impl fmt::Display for RewardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RewardCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| s.to_string())
    }
}

/// A reward catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: RewardId,
    pub name: String,
    pub description: String,
    pub points_cost: u64,
    pub category: RewardCategory,
}

/// Partial edit of a catalog reward. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct RewardUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub points_cost: Option<u64>,
    pub category: Option<RewardCategory>,
}

/// An exchange of points for a reward. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: RedemptionId,
    pub customer_id: CustomerId,
    pub date: DateTime<Utc>,
    /// Copy of the catalog entry as it was at redemption time.
    pub reward: Reward,
    pub points_spent: u64,
}

/// The inbound operations the ledger accepts.
#[derive(Debug, Clone)]
pub enum Command {
    /// Enroll a customer at the lowest tier with an empty balance.
    CreateCustomer {
        name: String,
        email: String,
        phone: String,
    },
    /// Add an entry to the reward catalog.
    CreateReward {
        name: String,
        description: String,
        points_cost: u64,
        category: RewardCategory,
    },
    /// Record a purchase and accrue points at the customer's current tier.
    Purchase {
        customer: CustomerId,
        amount: Amount,
        store_location: String,
    },
    /// Spend points on a catalog reward.
    Redeem {
        customer: CustomerId,
        reward: RewardId,
    },
    /// Remove a catalog entry that has never been redeemed.
    DeleteReward { reward: RewardId },
}
