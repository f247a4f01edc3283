//! Error types for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::accrual::AccrualError;
use crate::model::{CustomerId, RedemptionId, RewardId, TransactionId};
use crate::tier::TierName;

/// Rejection returned by a ledger operation. The ledger is left unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("reward {0} not found")]
    RewardNotFound(RewardId),

    #[error("{0}")]
    Accrual(#[from] AccrualError),

    #[error(
        "customer {customer} needs {shortfall} more points: balance {balance}, reward costs {cost}"
    )]
    InsufficientPoints {
        customer: CustomerId,
        balance: u64,
        cost: u64,
        shortfall: u64,
    },

    #[error("reward {reward} is referenced by {redemptions} redemption(s)")]
    RewardInUse { reward: RewardId, redemptions: usize },

    #[error("reward points cost must be positive")]
    InvalidPointsCost,

    #[error("purchase of {amount} would overflow the spend or balance of customer {customer}")]
    LimitExceeded { customer: CustomerId, amount: Amount },
}

/// A customer record that disagrees with its own history.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("customer {customer}: balance {recorded} but history gives {derived}")]
    BalanceMismatch {
        customer: CustomerId,
        recorded: u64,
        derived: i128,
    },

    #[error("customer {customer}: cumulative spend {recorded} but history gives {derived}")]
    SpendMismatch {
        customer: CustomerId,
        recorded: Amount,
        derived: Amount,
    },

    #[error("customer {customer}: tier {recorded} but spend resolves to {derived}")]
    TierMismatch {
        customer: CustomerId,
        recorded: TierName,
        derived: TierName,
    },

    #[error("history references unknown customer {0}")]
    UnknownCustomer(CustomerId),

    #[error("duplicate {0} id {1}")]
    DuplicateId(&'static str, u64),

    #[error("customer {0}: history totals overflow")]
    HistoryOverflow(CustomerId),

    #[error("transaction {transaction} has non-positive amount {amount}")]
    NonPositiveAmount { transaction: TransactionId, amount: Amount },

    #[error("reward {0} has a zero points cost")]
    ZeroPointsCost(RewardId),

    #[error("redemption {redemption} spent {spent} points for a reward costing {cost}")]
    RedemptionCostMismatch {
        redemption: RedemptionId,
        spent: u64,
        cost: u64,
    },
}
