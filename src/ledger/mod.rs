//! Loyalty points ledger.
//!
//! The ledger owns customers, the reward catalog and the append-only purchase
//! and redemption history. Purchases accrue points at the customer's current
//! tier; redemptions spend points after a solvency check. Commands arrive one
//! at a time through `apply` or as a stream drained by `run`.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::Amount;
use crate::accrual::compute_points_earned;
use crate::model::{
    Command, CustomerId, Redemption, RedemptionId, Reward, RewardCategory, RewardId,
    RewardUpdate, Transaction, TransactionId,
};
use crate::tier::{Tier, TierTable};

mod state;
pub use state::Customer;

mod error;
pub use error::{InvariantError, LedgerError};

mod snapshot;
pub use snapshot::LedgerSnapshot;

/// The loyalty ledger.
///
/// Every mutation goes through `&mut self`, so a single owner serializes all
/// updates to a customer's balance and spend.
#[derive(Debug)]
pub struct Ledger {
    tiers: TierTable,
    customers: BTreeMap<CustomerId, Customer>,
    rewards: BTreeMap<RewardId, Reward>,
    transactions: Vec<Transaction>,
    redemptions: Vec<Redemption>,
    /// Number of redemptions per catalog reward id, for the delete guard
    redeemed: HashMap<RewardId, usize>,
    next_customer_id: CustomerId,
    next_reward_id: RewardId,
    next_transaction_id: TransactionId,
    next_redemption_id: RedemptionId,
}

/// Public API
impl Ledger {
    pub fn new() -> Self {
        Self::with_tiers(TierTable::default())
    }

    pub fn with_tiers(tiers: TierTable) -> Self {
        Self {
            tiers,
            customers: BTreeMap::new(),
            rewards: BTreeMap::new(),
            transactions: Vec::new(),
            redemptions: Vec::new(),
            redeemed: HashMap::new(),
            next_customer_id: 1,
            next_reward_id: 1,
            next_transaction_id: 1,
            next_redemption_id: 1,
        }
    }

    /// Run the ledger with the given command stream
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            // rejected commands are logged by `apply` and must not stop the loop
            let _ = self.apply(command);
        }
    }

    /// Apply a single inbound command on top of the current ledger state
    pub fn apply(&mut self, command: Command) -> Result<(), LedgerError> {
        match command {
            Command::CreateCustomer { name, email, phone } => {
                let customer = self.create_customer(name, email, phone);
                info!(customer = customer.id(), "customer created");
            }
            Command::CreateReward {
                name,
                description,
                points_cost,
                category,
            } => match self.create_reward(name, description, points_cost, category) {
                Ok(reward) => {
                    info!(reward = reward.id, cost = reward.points_cost, "reward created");
                }
                Err(e) => {
                    info!(cost = points_cost, reason = %e, "reward skipped");
                    return Err(e);
                }
            },
            Command::Purchase {
                customer,
                amount,
                store_location,
            } => match self.record_transaction(customer, amount, &store_location) {
                Ok(tx) => {
                    info!(
                        customer = customer,
                        tx = tx.id,
                        amount = %amount,
                        points = tx.points_earned,
                        "purchase applied"
                    );
                }
                Err(e) => {
                    info!(customer = customer, amount = %amount, reason = %e, "purchase skipped");
                    return Err(e);
                }
            },
            Command::Redeem { customer, reward } => {
                match self.record_redemption(customer, reward) {
                    Ok(redemption) => {
                        info!(
                            customer = customer,
                            reward = reward,
                            points = redemption.points_spent,
                            "redemption applied"
                        );
                    }
                    Err(e) => {
                        info!(customer = customer, reward = reward, reason = %e, "redemption skipped");
                        return Err(e);
                    }
                }
            }
            Command::DeleteReward { reward } => match self.delete_reward(reward) {
                Ok(_) => info!(reward = reward, "reward deleted"),
                Err(e) => {
                    info!(reward = reward, reason = %e, "reward deletion skipped");
                    return Err(e);
                }
            },
        }
        Ok(())
    }

    /// Enroll a customer with zero balance and spend at the lowest tier.
    pub fn create_customer(
        &mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> &Customer {
        self.create_customer_at(name, email, phone, Utc::now())
    }

    pub fn create_customer_at(
        &mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        join_date: DateTime<Utc>,
    ) -> &Customer {
        let id = self.next_customer_id;
        self.next_customer_id += 1;

        let mut customer = Customer::new(id, name.into(), email.into(), phone.into(), join_date);
        customer.retier(&self.tiers);
        self.customers.entry(id).or_insert(customer)
    }

    /// Add a reward to the catalog.
    pub fn create_reward(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        points_cost: u64,
        category: RewardCategory,
    ) -> Result<&Reward, LedgerError> {
        if points_cost == 0 {
            return Err(LedgerError::InvalidPointsCost);
        }

        let id = self.next_reward_id;
        self.next_reward_id += 1;

        let reward = Reward {
            id,
            name: name.into(),
            description: description.into(),
            points_cost,
            category,
        };
        Ok(self.rewards.entry(id).or_insert(reward))
    }

    /// Edit a catalog reward. Past redemptions keep their own copy and are
    /// not affected.
    pub fn update_reward(
        &mut self,
        reward: RewardId,
        update: RewardUpdate,
    ) -> Result<&Reward, LedgerError> {
        if update.points_cost == Some(0) {
            return Err(LedgerError::InvalidPointsCost);
        }

        let entry = self
            .rewards
            .get_mut(&reward)
            .ok_or(LedgerError::RewardNotFound(reward))?;

        if let Some(name) = update.name {
            entry.name = name;
        }
        if let Some(description) = update.description {
            entry.description = description;
        }
        if let Some(points_cost) = update.points_cost {
            entry.points_cost = points_cost;
        }
        if let Some(category) = update.category {
            entry.category = category;
        }

        Ok(entry)
    }

    /// Record a purchase:
    /// - Resolve the customer's tier before this purchase
    /// - Compute points at that tier's multiplier
    /// - Append the transaction with points fixed
    /// - Add spend and points, then re-resolve the tier for the next purchase
    pub fn record_transaction(
        &mut self,
        customer: CustomerId,
        amount: Amount,
        store_location: &str,
    ) -> Result<&Transaction, LedgerError> {
        self.record_transaction_at(customer, amount, store_location, Utc::now())
    }

    pub fn record_transaction_at(
        &mut self,
        customer: CustomerId,
        amount: Amount,
        store_location: &str,
        date: DateTime<Utc>,
    ) -> Result<&Transaction, LedgerError> {
        let account = self
            .customers
            .get_mut(&customer)
            .ok_or(LedgerError::CustomerNotFound(customer))?;

        // Everything that can fail happens before the first write
        let tier_now = self.tiers.resolve(account.cumulative_spend());
        let points_earned = compute_points_earned(amount, tier_now)?;
        let totals = account
            .checked_accrual(amount, points_earned)
            .ok_or(LedgerError::LimitExceeded { customer, amount })?;

        let id = self.next_transaction_id;
        self.next_transaction_id += 1;

        let previous_tier = account.tier();
        account.accrue(totals, &self.tiers);
        if account.tier() != previous_tier {
            info!(
                customer = customer,
                from = %previous_tier,
                to = %account.tier(),
                "tier changed"
            );
        }

        self.transactions.push(Transaction {
            id,
            customer_id: customer,
            date,
            amount,
            points_earned,
            store_location: store_location.trim().to_string(),
        });

        Ok(&self.transactions[self.transactions.len() - 1])
    }

    /// Record a redemption:
    /// - Ensure customer and reward exist
    /// - Ensure the balance covers the reward cost
    /// - Append the redemption with a copy of the reward
    /// - Deduct the cost; spend and tier are untouched
    pub fn record_redemption(
        &mut self,
        customer: CustomerId,
        reward: RewardId,
    ) -> Result<&Redemption, LedgerError> {
        self.record_redemption_at(customer, reward, Utc::now())
    }

    pub fn record_redemption_at(
        &mut self,
        customer: CustomerId,
        reward: RewardId,
        date: DateTime<Utc>,
    ) -> Result<&Redemption, LedgerError> {
        let account = self
            .customers
            .get_mut(&customer)
            .ok_or(LedgerError::CustomerNotFound(customer))?;

        let snapshot = self
            .rewards
            .get(&reward)
            .ok_or(LedgerError::RewardNotFound(reward))?
            .clone();

        let balance = account.points_balance();
        if balance < snapshot.points_cost {
            return Err(LedgerError::InsufficientPoints {
                customer,
                balance,
                cost: snapshot.points_cost,
                shortfall: snapshot.points_cost - balance,
            });
        }

        let id = self.next_redemption_id;
        self.next_redemption_id += 1;

        account.debit_points(snapshot.points_cost);
        *self.redeemed.entry(reward).or_default() += 1;

        self.redemptions.push(Redemption {
            id,
            customer_id: customer,
            date,
            points_spent: snapshot.points_cost,
            reward: snapshot,
        });

        Ok(&self.redemptions[self.redemptions.len() - 1])
    }

    /// Remove a reward from the catalog unless a redemption references it.
    pub fn delete_reward(&mut self, reward: RewardId) -> Result<Reward, LedgerError> {
        if !self.rewards.contains_key(&reward) {
            return Err(LedgerError::RewardNotFound(reward));
        }

        if let Some(&redemptions) = self.redeemed.get(&reward) {
            return Err(LedgerError::RewardInUse {
                reward,
                redemptions,
            });
        }

        self.rewards
            .remove(&reward)
            .ok_or(LedgerError::RewardNotFound(reward))
    }

    /// Verify every customer against their history: balance equals points
    /// earned minus points spent, spend equals purchase total, and the tier
    /// matches the spend.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let mut derived: HashMap<CustomerId, (Amount, i128)> = HashMap::new();

        for tx in &self.transactions {
            if !self.customers.contains_key(&tx.customer_id) {
                return Err(InvariantError::UnknownCustomer(tx.customer_id));
            }
            let entry = derived.entry(tx.customer_id).or_default();
            entry.0 = entry
                .0
                .checked_add(tx.amount)
                .ok_or(InvariantError::HistoryOverflow(tx.customer_id))?;
            entry.1 += tx.points_earned as i128;
        }

        for redemption in &self.redemptions {
            if !self.customers.contains_key(&redemption.customer_id) {
                return Err(InvariantError::UnknownCustomer(redemption.customer_id));
            }
            let entry = derived.entry(redemption.customer_id).or_default();
            entry.1 -= redemption.points_spent as i128;
        }

        for customer in self.customers.values() {
            let (spend, balance) = derived.get(&customer.id()).copied().unwrap_or_default();

            if customer.points_balance() as i128 != balance {
                return Err(InvariantError::BalanceMismatch {
                    customer: customer.id(),
                    recorded: customer.points_balance(),
                    derived: balance,
                });
            }

            if customer.cumulative_spend() != spend {
                return Err(InvariantError::SpendMismatch {
                    customer: customer.id(),
                    recorded: customer.cumulative_spend(),
                    derived: spend,
                });
            }

            let tier = self.tiers.resolve(spend).name;
            if customer.tier() != tier {
                return Err(InvariantError::TierMismatch {
                    customer: customer.id(),
                    recorded: customer.tier(),
                    derived: tier,
                });
            }
        }

        Ok(())
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Tier definition currently applying to a customer.
    pub fn customer_tier(&self, customer: CustomerId) -> Result<&Tier, LedgerError> {
        let account = self
            .get_customer(customer)
            .ok_or(LedgerError::CustomerNotFound(customer))?;
        Ok(self.tiers.resolve(account.cumulative_spend()))
    }

    /// Return all customers in id order.
    pub fn customers(&self) -> impl Iterator<Item = &Customer> + '_ {
        self.customers.values()
    }

    /// Return one customer
    pub fn get_customer(&self, customer: CustomerId) -> Option<&Customer> {
        self.customers.get(&customer)
    }

    /// Return the reward catalog in id order.
    pub fn rewards(&self) -> impl Iterator<Item = &Reward> + '_ {
        self.rewards.values()
    }

    pub fn get_reward(&self, reward: RewardId) -> Option<&Reward> {
        self.rewards.get(&reward)
    }

    /// Full purchase history in recording order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Full redemption history in recording order.
    pub fn redemptions(&self) -> &[Redemption] {
        &self.redemptions
    }

    pub fn customer_transactions(
        &self,
        customer: CustomerId,
    ) -> impl Iterator<Item = &Transaction> + '_ {
        self.transactions
            .iter()
            .filter(move |tx| tx.customer_id == customer)
    }

    pub fn customer_redemptions(
        &self,
        customer: CustomerId,
    ) -> impl Iterator<Item = &Redemption> + '_ {
        self.redemptions
            .iter()
            .filter(move |redemption| redemption.customer_id == customer)
    }
}

/// Private API
impl Ledger {
    /// Rebuild derived indexes and id counters after restoring records.
    fn reindex(&mut self) {
        self.redeemed.clear();
        for redemption in &self.redemptions {
            *self.redeemed.entry(redemption.reward.id).or_default() += 1;
        }

        self.next_customer_id = self.customers.keys().max().map_or(1, |id| id + 1);
        self.next_reward_id = self
            .rewards
            .keys()
            .copied()
            .chain(self.redemptions.iter().map(|r| r.reward.id))
            .max()
            .map_or(1, |id| id + 1);
        self.next_transaction_id = self
            .transactions
            .iter()
            .map(|tx| tx.id)
            .max()
            .map_or(1, |id| id + 1);
        self.next_redemption_id = self
            .redemptions
            .iter()
            .map(|r| r.id)
            .max()
            .map_or(1, |id| id + 1);
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accrual::AccrualError;
    use crate::tier::TierName;
    use chrono::TimeZone;

    // test utils

    fn units(value: i64) -> Amount {
        Amount::from_units(value)
    }

    fn ledger_with_customer() -> (Ledger, CustomerId) {
        let mut ledger = Ledger::new();
        let id = ledger
            .create_customer("Ada", "ada@example.com", "555-0100")
            .id();
        (ledger, id)
    }

    fn reward(ledger: &mut Ledger, cost: u64) -> RewardId {
        ledger
            .create_reward("Gift card", "Store credit", cost, RewardCategory::Discount)
            .unwrap()
            .id
    }

    #[test]
    fn new_ledger() {
        let ledger = Ledger::new();
        assert_eq!(ledger.customers().count(), 0);
        assert_eq!(ledger.rewards().count(), 0);
        assert!(ledger.transactions().is_empty());
        assert!(ledger.redemptions().is_empty());
    }

    // Customers

    #[test]
    fn create_customer_starts_at_bronze_with_nothing() {
        let (ledger, id) = ledger_with_customer();
        let customer = ledger.get_customer(id).unwrap();
        assert_eq!(customer.name(), "Ada");
        assert_eq!(customer.email(), "ada@example.com");
        assert_eq!(customer.phone(), "555-0100");
        assert_eq!(customer.points_balance(), 0);
        assert_eq!(customer.cumulative_spend(), Amount::ZERO);
        assert_eq!(customer.tier(), TierName::Bronze);
    }

    #[test]
    fn customer_ids_are_sequential() {
        let mut ledger = Ledger::new();
        let a = ledger.create_customer("A", "", "").id();
        let b = ledger.create_customer("B", "", "").id();
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn create_customer_at_keeps_join_date() {
        let mut ledger = Ledger::new();
        let joined = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let customer = ledger.create_customer_at("A", "", "", joined);
        assert_eq!(customer.join_date(), joined);
    }

    // Purchases

    #[test]
    fn purchase_earns_points_and_adds_spend() {
        let (mut ledger, id) = ledger_with_customer();
        let tx = ledger.record_transaction(id, units(120), " Downtown ").unwrap();
        assert_eq!(tx.points_earned, 120);
        assert_eq!(tx.amount, units(120));
        assert_eq!(tx.store_location, "Downtown");

        let customer = ledger.get_customer(id).unwrap();
        assert_eq!(customer.points_balance(), 120);
        assert_eq!(customer.cumulative_spend(), units(120));
    }

    #[test]
    fn promotion_applies_from_next_purchase() {
        let (mut ledger, id) = ledger_with_customer();

        let first = ledger.record_transaction(id, units(600), "A").unwrap();
        assert_eq!(first.points_earned, 600);

        let customer = ledger.get_customer(id).unwrap();
        assert_eq!(customer.cumulative_spend(), units(600));
        assert_eq!(customer.tier(), TierName::Silver);

        let second = ledger.record_transaction(id, units(100), "A").unwrap();
        assert_eq!(second.points_earned, 125);
        assert_eq!(ledger.get_customer(id).unwrap().points_balance(), 725);
    }

    #[test]
    fn exact_threshold_purchase_promotes() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(500), "A").unwrap();
        assert_eq!(ledger.get_customer(id).unwrap().tier(), TierName::Silver);
    }

    #[test]
    fn promotion_does_not_change_past_transactions() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(300), "A").unwrap();
        ledger.record_transaction(id, units(5_000), "A").unwrap();
        ledger.record_transaction(id, units(10), "A").unwrap();

        let earned: Vec<u64> = ledger
            .customer_transactions(id)
            .map(|tx| tx.points_earned)
            .collect();
        // Bronze, Bronze (promotion happens after), Platinum
        assert_eq!(earned, vec![300, 5_000, 20]);
        assert_eq!(ledger.get_customer(id).unwrap().tier(), TierName::Platinum);
    }

    #[test]
    fn fractional_points_truncate() {
        let (mut ledger, id) = ledger_with_customer();
        let tx = ledger
            .record_transaction(id, Amount::from_float(19.99), "A")
            .unwrap();
        assert_eq!(tx.points_earned, 19);
    }

    #[test]
    fn purchase_that_would_overflow_spend_is_rejected() {
        let (mut ledger, id) = ledger_with_customer();
        let amount = Amount::from_float(5e14);
        ledger.record_transaction(id, amount, "A").unwrap();
        let before = ledger.get_customer(id).unwrap().clone();

        let result = ledger.record_transaction(id, amount, "A").map(|tx| tx.id);
        assert_eq!(result, Err(LedgerError::LimitExceeded { customer: id, amount }));

        assert_eq!(ledger.get_customer(id), Some(&before));
        assert_eq!(ledger.transactions().len(), 1);
        assert_eq!(ledger.check_invariants(), Ok(()));
        assert_eq!(ledger.record_transaction(id, units(1), "A").unwrap().id, 2);
    }

    #[test]
    fn purchase_for_unknown_customer_fails() {
        let mut ledger = Ledger::new();
        let result = ledger.record_transaction(7, units(10), "A");
        assert!(matches!(result, Err(LedgerError::CustomerNotFound(7))));
        assert!(ledger.transactions().is_empty());
    }

    #[test]
    fn non_positive_purchase_fails_without_side_effects() {
        let (mut ledger, id) = ledger_with_customer();

        for amount in [Amount::ZERO, units(-5)] {
            let result = ledger.record_transaction(id, amount, "A");
            assert_eq!(
                result.map(|tx| tx.id),
                Err(LedgerError::Accrual(AccrualError::InvalidAmount(amount)))
            );
        }

        let customer = ledger.get_customer(id).unwrap();
        assert_eq!(customer.points_balance(), 0);
        assert_eq!(customer.cumulative_spend(), Amount::ZERO);
        assert!(ledger.transactions().is_empty());

        // Failed purchases do not consume transaction ids
        let tx = ledger.record_transaction(id, units(1), "A").unwrap();
        assert_eq!(tx.id, 1);
    }

    #[test]
    fn customer_tier_reports_current_definition() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(2_500), "A").unwrap();
        let tier = ledger.customer_tier(id).unwrap();
        assert_eq!(tier.name, TierName::Gold);
        assert!(matches!(
            ledger.customer_tier(99),
            Err(LedgerError::CustomerNotFound(99))
        ));
    }

    #[test]
    fn custom_tier_table_is_used() {
        let tiers = TierTable::new(vec![
            Tier::new(TierName::Bronze, Amount::ZERO, crate::Multiplier::from_hundredths(300)),
        ])
        .unwrap();
        let mut ledger = Ledger::with_tiers(tiers);
        let id = ledger.create_customer("A", "", "").id();
        let tx = ledger.record_transaction(id, units(10), "A").unwrap();
        assert_eq!(tx.points_earned, 30);
    }

    // Redemptions

    #[test]
    fn redemption_deducts_points_and_keeps_tier() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(600), "A").unwrap();
        let gift = reward(&mut ledger, 200);

        let redemption = ledger.record_redemption(id, gift).unwrap();
        assert_eq!(redemption.points_spent, 200);
        assert_eq!(redemption.reward.id, gift);

        let customer = ledger.get_customer(id).unwrap();
        assert_eq!(customer.points_balance(), 400);
        assert_eq!(customer.cumulative_spend(), units(600));
        assert_eq!(customer.tier(), TierName::Silver);
    }

    #[test]
    fn redeem_exact_balance_then_fail() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(500), "A").unwrap();
        let gift = reward(&mut ledger, 500);
        let small = reward(&mut ledger, 1);

        ledger.record_redemption(id, gift).unwrap();
        assert_eq!(ledger.get_customer(id).unwrap().points_balance(), 0);

        let result = ledger.record_redemption(id, small);
        assert_eq!(
            result.map(|r| r.id),
            Err(LedgerError::InsufficientPoints {
                customer: id,
                balance: 0,
                cost: 1,
                shortfall: 1,
            })
        );
        assert_eq!(ledger.redemptions().len(), 1);
    }

    #[test]
    fn insufficient_points_reports_shortfall() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(120), "A").unwrap();
        let gift = reward(&mut ledger, 500);

        let err = ledger.record_redemption(id, gift).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientPoints { shortfall: 380, .. }
        ));
        assert!(err.to_string().contains("needs 380 more points"));
        assert_eq!(ledger.get_customer(id).unwrap().points_balance(), 120);
    }

    #[test]
    fn redemption_for_unknown_customer_or_reward_fails() {
        let (mut ledger, id) = ledger_with_customer();
        let gift = reward(&mut ledger, 10);

        assert!(matches!(
            ledger.record_redemption(42, gift),
            Err(LedgerError::CustomerNotFound(42))
        ));
        assert!(matches!(
            ledger.record_redemption(id, 42),
            Err(LedgerError::RewardNotFound(42))
        ));
    }

    #[test]
    fn redemption_keeps_reward_snapshot_after_catalog_edit() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(1_000), "A").unwrap();
        let gift = reward(&mut ledger, 100);
        ledger.record_redemption(id, gift).unwrap();

        ledger
            .update_reward(
                gift,
                RewardUpdate {
                    name: Some("Renamed".to_string()),
                    points_cost: Some(900),
                    category: Some(RewardCategory::Experience),
                    ..RewardUpdate::default()
                },
            )
            .unwrap();

        let history = &ledger.redemptions()[0];
        assert_eq!(history.reward.name, "Gift card");
        assert_eq!(history.reward.points_cost, 100);
        assert_eq!(history.reward.category, RewardCategory::Discount);
        assert_eq!(ledger.get_reward(gift).unwrap().name, "Renamed");

        // New redemptions use the edited cost
        let second = ledger.record_redemption(id, gift).unwrap();
        assert_eq!(second.points_spent, 900);
    }

    // Rewards

    #[test]
    fn create_reward_rejects_zero_cost() {
        let mut ledger = Ledger::new();
        let result = ledger.create_reward("Free", "", 0, RewardCategory::Product);
        assert_eq!(result.map(|r| r.id), Err(LedgerError::InvalidPointsCost));
        assert_eq!(ledger.rewards().count(), 0);
    }

    #[test]
    fn update_reward_validates() {
        let mut ledger = Ledger::new();
        let gift = reward(&mut ledger, 10);

        let result = ledger.update_reward(
            gift,
            RewardUpdate {
                points_cost: Some(0),
                ..RewardUpdate::default()
            },
        );
        assert_eq!(result.map(|r| r.id), Err(LedgerError::InvalidPointsCost));

        let result = ledger.update_reward(9, RewardUpdate::default());
        assert_eq!(result.map(|r| r.id), Err(LedgerError::RewardNotFound(9)));
    }

    #[test]
    fn delete_unredeemed_reward_succeeds() {
        let mut ledger = Ledger::new();
        let gift = reward(&mut ledger, 10);
        let removed = ledger.delete_reward(gift).unwrap();
        assert_eq!(removed.id, gift);
        assert!(ledger.get_reward(gift).is_none());
    }

    #[test]
    fn delete_redeemed_reward_fails() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(100), "A").unwrap();
        let gift = reward(&mut ledger, 10);
        ledger.record_redemption(id, gift).unwrap();
        ledger.record_redemption(id, gift).unwrap();

        let result = ledger.delete_reward(gift);
        assert_eq!(
            result,
            Err(LedgerError::RewardInUse {
                reward: gift,
                redemptions: 2
            })
        );
        assert!(ledger.get_reward(gift).is_some());
    }

    #[test]
    fn delete_unknown_reward_fails() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.delete_reward(3), Err(LedgerError::RewardNotFound(3)));
    }

    // Commands

    #[test]
    fn apply_dispatches_commands() {
        let mut ledger = Ledger::new();
        ledger
            .apply(Command::CreateCustomer {
                name: "Ada".to_string(),
                email: String::new(),
                phone: String::new(),
            })
            .unwrap();
        ledger
            .apply(Command::CreateReward {
                name: "Mug".to_string(),
                description: String::new(),
                points_cost: 50,
                category: RewardCategory::Product,
            })
            .unwrap();
        ledger
            .apply(Command::Purchase {
                customer: 1,
                amount: units(80),
                store_location: "Mall".to_string(),
            })
            .unwrap();
        ledger
            .apply(Command::Redeem {
                customer: 1,
                reward: 1,
            })
            .unwrap();

        let result = ledger.apply(Command::DeleteReward { reward: 1 });
        assert!(matches!(result, Err(LedgerError::RewardInUse { .. })));
        assert_eq!(ledger.get_customer(1).unwrap().points_balance(), 30);
    }

    #[tokio::test]
    async fn run_continues_after_rejected_commands() {
        let mut ledger = Ledger::new();
        let id = ledger.create_customer("Ada", "", "").id();
        let commands = vec![
            Command::Purchase {
                customer: 99,
                amount: units(10),
                store_location: String::new(),
            },
            Command::Purchase {
                customer: id,
                amount: units(10),
                store_location: String::new(),
            },
            Command::Redeem {
                customer: id,
                reward: 5,
            },
            Command::Purchase {
                customer: id,
                amount: units(15),
                store_location: String::new(),
            },
        ];

        ledger.run(tokio_stream::iter(commands)).await;

        assert_eq!(ledger.transactions().len(), 2);
        assert_eq!(ledger.get_customer(id).unwrap().points_balance(), 25);
    }

    // Invariants

    #[test]
    fn invariants_hold_after_mixed_operations() {
        let (mut ledger, id) = ledger_with_customer();
        let other = ledger.create_customer("Grace", "", "").id();
        let gift = reward(&mut ledger, 150);

        ledger.record_transaction(id, units(700), "A").unwrap();
        ledger.record_transaction(other, units(40), "B").unwrap();
        ledger.record_redemption(id, gift).unwrap();
        let _ = ledger.record_redemption(other, gift);
        ledger.record_transaction(id, units(1_500), "A").unwrap();

        assert_eq!(ledger.check_invariants(), Ok(()));
        assert_eq!(ledger.customer_redemptions(id).count(), 1);
        assert_eq!(ledger.customer_redemptions(other).count(), 0);
    }

    #[test]
    fn invariants_detect_tampered_balance() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(100), "A").unwrap();
        ledger.customers.get_mut(&id).unwrap().debit_points(1);

        assert_eq!(
            ledger.check_invariants(),
            Err(InvariantError::BalanceMismatch {
                customer: id,
                recorded: 99,
                derived: 100,
            })
        );
    }

    // Snapshots

    #[test]
    fn snapshot_round_trip_restores_counters_and_guards() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(600), "A").unwrap();
        let gift = reward(&mut ledger, 100);
        ledger.record_redemption(id, gift).unwrap();

        let mut restored = Ledger::from_snapshot(ledger.snapshot(), TierTable::default()).unwrap();
        assert_eq!(restored.snapshot(), ledger.snapshot());

        assert!(matches!(
            restored.delete_reward(gift),
            Err(LedgerError::RewardInUse { .. })
        ));
        assert_eq!(restored.create_customer("B", "", "").id(), 2);
        assert_eq!(restored.record_transaction(id, units(1), "A").unwrap().id, 2);
        assert_eq!(restored.record_redemption(id, gift).unwrap().id, 2);
    }

    #[test]
    fn snapshot_with_unbalanced_customer_is_rejected() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(100), "A").unwrap();
        let mut snapshot = ledger.snapshot();
        snapshot.transactions.clear();

        assert!(matches!(
            Ledger::from_snapshot(snapshot, TierTable::default()),
            Err(InvariantError::BalanceMismatch { .. })
        ));
    }

    #[test]
    fn snapshot_with_duplicate_ids_is_rejected() {
        let (ledger, _) = ledger_with_customer();
        let mut snapshot = ledger.snapshot();
        snapshot.customers.push(snapshot.customers[0].clone());

        assert_eq!(
            Ledger::from_snapshot(snapshot, TierTable::default()).map(|l| l.customers().count()),
            Err(InvariantError::DuplicateId("customer", 1))
        );
    }

    fn snapshot_with_redemption() -> LedgerSnapshot {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(600), "A").unwrap();
        let gift = reward(&mut ledger, 100);
        ledger.record_redemption(id, gift).unwrap();
        ledger.snapshot()
    }

    #[test]
    fn snapshot_with_non_positive_purchase_is_rejected() {
        let mut snapshot = snapshot_with_redemption();
        snapshot.transactions[0].amount = units(-600);

        assert_eq!(
            Ledger::from_snapshot(snapshot, TierTable::default()).map(|l| l.transactions().len()),
            Err(InvariantError::NonPositiveAmount {
                transaction: 1,
                amount: units(-600),
            })
        );
    }

    #[test]
    fn snapshot_with_free_reward_is_rejected() {
        let mut snapshot = snapshot_with_redemption();
        snapshot.rewards[0].points_cost = 0;
        assert_eq!(
            Ledger::from_snapshot(snapshot, TierTable::default()).map(|l| l.rewards().count()),
            Err(InvariantError::ZeroPointsCost(1))
        );

        // A free reward copied into a redemption, with the balance made to match
        let mut snapshot = snapshot_with_redemption();
        snapshot.redemptions[0].reward.points_cost = 0;
        snapshot.redemptions[0].points_spent = 0;
        assert_eq!(
            Ledger::from_snapshot(snapshot, TierTable::default()).map(|l| l.rewards().count()),
            Err(InvariantError::ZeroPointsCost(1))
        );
    }

    #[test]
    fn snapshot_with_mismatched_redemption_cost_is_rejected() {
        let mut snapshot = snapshot_with_redemption();
        snapshot.redemptions[0].points_spent = 40;

        assert_eq!(
            Ledger::from_snapshot(snapshot, TierTable::default()).map(|l| l.redemptions().len()),
            Err(InvariantError::RedemptionCostMismatch {
                redemption: 1,
                spent: 40,
                cost: 100,
            })
        );
    }

    #[test]
    fn snapshot_tier_is_rederived_from_spend() {
        let (mut ledger, id) = ledger_with_customer();
        ledger.record_transaction(id, units(600), "A").unwrap();

        let tiers = TierTable::new(vec![
            Tier::new(TierName::Bronze, Amount::ZERO, crate::Multiplier::ONE),
            Tier::new(TierName::Silver, units(1_000), crate::Multiplier::ONE),
        ])
        .unwrap();
        let restored = Ledger::from_snapshot(ledger.snapshot(), tiers).unwrap();
        assert_eq!(restored.get_customer(id).unwrap().tier(), TierName::Bronze);
    }
}
