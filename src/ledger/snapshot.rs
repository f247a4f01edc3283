//! Whole-state snapshots of the ledger for the persistence collaborator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use super::{Customer, InvariantError, Ledger};
use crate::model::{Redemption, Reward, Transaction};
use crate::store::{SnapshotStore, StoreError};
use crate::tier::TierTable;

/// Everything the ledger needs to be rebuilt: customers, catalog and both
/// histories.
///
/// Stored as JSON:
///
/// ```text
/// {
///   "customers": [{ "id": 1, "name": "Ada", "points_balance": 725, ... }],
///   "rewards": [...],
///   "transactions": [...],
///   "redemptions": [...]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub customers: Vec<Customer>,
    pub rewards: Vec<Reward>,
    pub transactions: Vec<Transaction>,
    pub redemptions: Vec<Redemption>,
}

impl Ledger {
    /// Copy the full ledger state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            customers: self.customers.values().cloned().collect(),
            rewards: self.rewards.values().cloned().collect(),
            transactions: self.transactions.clone(),
            redemptions: self.redemptions.clone(),
        }
    }

    /// Rebuild a ledger from a snapshot.
    ///
    /// Customer tiers are re-derived from spend with `tiers`. Duplicate ids,
    /// records the live ledger would never write (non-positive purchases,
    /// free rewards, redemptions that spent other than the reward's cost) and
    /// a balance or spend that disagrees with history reject the snapshot.
    pub fn from_snapshot(
        snapshot: LedgerSnapshot,
        tiers: TierTable,
    ) -> Result<Self, InvariantError> {
        let mut ledger = Ledger::with_tiers(tiers);

        let mut customers = BTreeMap::new();
        for mut customer in snapshot.customers {
            let stored_tier = customer.tier();
            customer.retier(&ledger.tiers);
            if customer.tier() != stored_tier {
                warn!(
                    customer = customer.id(),
                    stored = %stored_tier,
                    derived = %customer.tier(),
                    "stored tier disagrees with spend, using derived tier"
                );
            }
            let id = customer.id();
            if customers.insert(id, customer).is_some() {
                return Err(InvariantError::DuplicateId("customer", id as u64));
            }
        }

        let mut rewards = BTreeMap::new();
        for reward in snapshot.rewards {
            let id = reward.id;
            if reward.points_cost == 0 {
                return Err(InvariantError::ZeroPointsCost(id));
            }
            if rewards.insert(id, reward).is_some() {
                return Err(InvariantError::DuplicateId("reward", id as u64));
            }
        }

        let mut seen = HashSet::new();
        for tx in &snapshot.transactions {
            if !seen.insert(tx.id) {
                return Err(InvariantError::DuplicateId("transaction", tx.id));
            }
            if !tx.amount.is_positive() {
                return Err(InvariantError::NonPositiveAmount {
                    transaction: tx.id,
                    amount: tx.amount,
                });
            }
        }

        seen.clear();
        for redemption in &snapshot.redemptions {
            if !seen.insert(redemption.id) {
                return Err(InvariantError::DuplicateId("redemption", redemption.id));
            }
            if redemption.reward.points_cost == 0 {
                return Err(InvariantError::ZeroPointsCost(redemption.reward.id));
            }
            if redemption.points_spent != redemption.reward.points_cost {
                return Err(InvariantError::RedemptionCostMismatch {
                    redemption: redemption.id,
                    spent: redemption.points_spent,
                    cost: redemption.reward.points_cost,
                });
            }
        }

        ledger.customers = customers;
        ledger.rewards = rewards;
        ledger.transactions = snapshot.transactions;
        ledger.redemptions = snapshot.redemptions;
        ledger.check_invariants()?;
        ledger.reindex();

        Ok(ledger)
    }

    /// Save the full ledger state under `namespace`.
    pub fn save(
        &self,
        store: &mut impl SnapshotStore,
        namespace: &str,
    ) -> Result<(), StoreError> {
        let blob = serde_json::to_vec_pretty(&self.snapshot()).map_err(StoreError::Encode)?;
        store.save(namespace, &blob)?;
        info!(
            namespace,
            customers = self.customers.len(),
            transactions = self.transactions.len(),
            redemptions = self.redemptions.len(),
            "ledger saved"
        );
        Ok(())
    }

    /// Load the ledger saved under `namespace`, or an empty ledger if nothing
    /// was saved yet.
    pub fn load(
        store: &impl SnapshotStore,
        namespace: &str,
        tiers: TierTable,
    ) -> Result<Self, StoreError> {
        let Some(blob) = store.load(namespace)? else {
            info!(namespace, "no saved ledger, starting empty");
            return Ok(Ledger::with_tiers(tiers));
        };

        let snapshot: LedgerSnapshot = serde_json::from_slice(&blob).map_err(StoreError::Decode)?;
        let ledger = Ledger::from_snapshot(snapshot, tiers)?;
        info!(
            namespace,
            customers = ledger.customers.len(),
            transactions = ledger.transactions.len(),
            redemptions = ledger.redemptions.len(),
            "ledger loaded"
        );
        Ok(ledger)
    }
}
