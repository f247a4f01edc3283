pub mod accrual;
pub mod amount;
pub mod csv;
pub mod ledger;
pub mod model;
pub mod stats;
pub mod store;
pub mod tier;

pub use amount::{Amount, Multiplier};
pub use ledger::{Customer, Ledger, LedgerError};
pub use model::{Command, CustomerId, Redemption, Reward, RewardCategory, RewardId, Transaction};
pub use tier::{Tier, TierName, TierTable};
