//! Spend-based tiers and the lookup from cumulative spend to tier.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::amount::{Amount, Multiplier};

/// Tier names, ordered from lowest to highest standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TierName {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl TierName {
    pub const ALL: [TierName; 4] = [
        TierName::Bronze,
        TierName::Silver,
        TierName::Gold,
        TierName::Platinum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TierName::Bronze => "Bronze",
            TierName::Silver => "Silver",
            TierName::Gold => "Gold",
            TierName::Platinum => "Platinum",
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tier definition: customers whose cumulative spend is at least
/// `minimum_spend` earn points at `multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub name: TierName,
    pub minimum_spend: Amount,
    pub multiplier: Multiplier,
}

impl Tier {
    pub const fn new(name: TierName, minimum_spend: Amount, multiplier: Multiplier) -> Self {
        Self {
            name,
            minimum_spend,
            multiplier,
        }
    }
}

const DEFAULT_TIERS: [Tier; 4] = [
    Tier::new(TierName::Bronze, Amount::from_units(0), Multiplier::from_hundredths(100)),
    Tier::new(TierName::Silver, Amount::from_units(500), Multiplier::from_hundredths(125)),
    Tier::new(TierName::Gold, Amount::from_units(2_000), Multiplier::from_hundredths(150)),
    Tier::new(TierName::Platinum, Amount::from_units(5_000), Multiplier::from_hundredths(200)),
];

/// Invalid tier table definitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TierTableError {
    #[error("tier table is empty")]
    Empty,
    #[error("lowest tier {0} must start at zero spend, found {1}")]
    NonZeroFloor(TierName, Amount),
    #[error("tier {0} must have a higher minimum spend and rank than the tier below it")]
    NotAscending(TierName),
    #[error("tier {0} multiplier {1} is below 1.00x")]
    MultiplierBelowOne(TierName, Multiplier),
}

/// Ordered, validated list of tiers. Every non-negative spend maps to exactly
/// one tier because the lowest tier starts at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    /// Ascending by `minimum_spend`.
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, TierTableError> {
        let first = tiers.first().ok_or(TierTableError::Empty)?;
        if first.minimum_spend != Amount::ZERO {
            return Err(TierTableError::NonZeroFloor(first.name, first.minimum_spend));
        }

        for tier in &tiers {
            if tier.multiplier < Multiplier::ONE {
                return Err(TierTableError::MultiplierBelowOne(tier.name, tier.multiplier));
            }
        }

        for pair in tiers.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if upper.minimum_spend <= lower.minimum_spend || upper.name <= lower.name {
                return Err(TierTableError::NotAscending(upper.name));
            }
        }

        Ok(Self { tiers })
    }

    /// Tier for the given cumulative spend. Thresholds are inclusive lower
    /// bounds; spends below zero fall back to the lowest tier.
    pub fn resolve(&self, cumulative_spend: Amount) -> &Tier {
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.minimum_spend <= cumulative_spend)
            .unwrap_or(&self.tiers[0])
    }

    /// Definition for a tier name, if this table contains it.
    pub fn get(&self, name: TierName) -> Option<&Tier> {
        self.tiers.iter().find(|tier| tier.name == name)
    }

    /// The tier above the one `cumulative_spend` resolves to, with the spend
    /// still needed to reach it. `None` at the top tier.
    pub fn next_tier(&self, cumulative_spend: Amount) -> Option<(&Tier, Amount)> {
        self.tiers
            .iter()
            .find(|tier| tier.minimum_spend > cumulative_spend)
            .map(|tier| (tier, tier.minimum_spend - cumulative_spend))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tier> + '_ {
        self.tiers.iter()
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_TIERS.to_vec(),
        }
    }
}
