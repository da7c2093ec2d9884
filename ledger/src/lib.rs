//! Append-only balance ledger and per-market position store.
//!
//! Both live in-process and hold no storage handle of their own — the
//! trading coordinator is responsible for durability (see `trading_core`'s
//! `Storage` trait). What lives here is the accounting logic itself: the
//! non-negativity invariants, the weighted-average cost basis, and the
//! closed set of reasons a balance is allowed to move.

use chrono::{DateTime, Utc};
use decimal::{Amount, DecimalError, Price, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type UserId = Uuid;
pub type MarketId = Uuid;

/// A binary prediction-market outcome. Every order, position, and trade is
/// scoped to exactly one of these within a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

/// What a ledger entry is posted in reference to, for audit trails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Order,
    Trade,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub id: Uuid,
}

/// The closed set of reasons a balance may move. Adding a new way for money
/// to move into or out of a user's balance means adding a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    FaucetCredit,
    OrderReserve,
    OrderReserveRelease,
    TradeBuy,
    TradeSell,
    TradeFee,
    SettlementWin,
    SettlementLoss,
    MarketCancelRefund,
    AdminAdjustment,
}

/// A single ledger movement: read, check, write, atomically.
#[derive(Debug, Clone, Copy)]
pub struct LedgerDelta {
    pub user_id: UserId,
    pub d_available: Amount,
    pub d_reserved: Amount,
    pub reason: Reason,
    pub reference: Option<Reference>,
}

impl LedgerDelta {
    pub fn new(user_id: UserId, d_available: Amount, d_reserved: Amount, reason: Reason) -> Self {
        Self {
            user_id,
            d_available,
            d_reserved,
            reason,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// An immutable record of one applied `LedgerDelta`. Entries are never
/// updated or deleted once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub delta_available: Amount,
    pub delta_reserved: Amount,
    pub reason: Reason,
    pub reference: Option<Reference>,
    pub created_at: DateTime<Utc>,
}

/// A user's spendable (`available`) and earmarked (`reserved`) funds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: Amount,
    pub reserved: Amount,
}

impl Balance {
    fn zero() -> Self {
        Self {
            available: Amount::zero(),
            reserved: Amount::zero(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("account {0} is not registered")]
    UnknownAccount(UserId),
    #[error("account {0} is already registered")]
    AlreadyRegistered(UserId),
    #[error("applying delta to account {user_id} would make {field} negative ({value})")]
    InvariantViolation {
        user_id: UserId,
        field: &'static str,
        value: rust_decimal::Decimal,
    },
    #[error(transparent)]
    Arithmetic(#[from] DecimalError),
}

/// Append-only balance ledger. Balances are created exactly once via
/// `register_account`; `apply` never upserts a missing row.
#[derive(Debug, Default)]
pub struct Ledger {
    balances: HashMap<UserId, Balance>,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_account(&mut self, user_id: UserId) -> Result<(), LedgerError> {
        if self.balances.contains_key(&user_id) {
            return Err(LedgerError::AlreadyRegistered(user_id));
        }
        self.balances.insert(user_id, Balance::zero());
        Ok(())
    }

    pub fn get_balance(&self, user_id: UserId) -> Result<Balance, LedgerError> {
        self.balances
            .get(&user_id)
            .copied()
            .ok_or(LedgerError::UnknownAccount(user_id))
    }

    /// Apply one delta: read, add, reject if either projected field goes
    /// negative, write the entry and the new balance together.
    pub fn apply(&mut self, delta: LedgerDelta) -> Result<LedgerEntry, LedgerError> {
        let mut entries = self.apply_batch(vec![delta])?;
        Ok(entries.remove(0))
    }

    /// Apply a list of deltas under one logical transaction. Every delta is
    /// validated against a working copy of the affected balances before any
    /// of them is committed, so partial success is impossible.
    pub fn apply_batch(&mut self, deltas: Vec<LedgerDelta>) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut working: HashMap<UserId, Balance> = HashMap::new();

        for delta in &deltas {
            let current = *working
                .entry(delta.user_id)
                .or_insert(self.get_balance(delta.user_id)?);

            let new_available = current
                .available
                .checked_add(delta.d_available)
                .map_err(LedgerError::Arithmetic)?;
            let new_reserved = current
                .reserved
                .checked_add(delta.d_reserved)
                .map_err(LedgerError::Arithmetic)?;

            if new_available.is_negative() {
                return Err(LedgerError::InvariantViolation {
                    user_id: delta.user_id,
                    field: "available",
                    value: new_available.value(),
                });
            }
            if new_reserved.is_negative() {
                return Err(LedgerError::InvariantViolation {
                    user_id: delta.user_id,
                    field: "reserved",
                    value: new_reserved.value(),
                });
            }

            working.insert(
                delta.user_id,
                Balance {
                    available: new_available,
                    reserved: new_reserved,
                },
            );
        }

        let now = deltas
            .first()
            .map(|_| Utc::now())
            .unwrap_or_else(Utc::now);

        let entries: Vec<LedgerEntry> = deltas
            .into_iter()
            .map(|delta| LedgerEntry {
                id: Uuid::new_v4(),
                user_id: delta.user_id,
                delta_available: delta.d_available,
                delta_reserved: delta.d_reserved,
                reason: delta.reason,
                reference: delta.reference,
                created_at: now,
            })
            .collect();

        for (user_id, balance) in working {
            self.balances.insert(user_id, balance);
        }
        self.entries.extend(entries.clone());

        Ok(entries)
    }

    pub fn entries_for(&self, user_id: UserId) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.user_id == user_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PositionError {
    #[error("cannot reserve {requested} shares: only {available} unreserved")]
    InsufficientShares {
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
    #[error("releasing {requested} reserved shares would leave reservedShares negative")]
    NegativeReservedShares { requested: rust_decimal::Decimal },
    #[error(transparent)]
    Arithmetic(#[from] DecimalError),
}

pub type PositionKey = (UserId, MarketId, Outcome);

/// A user's holding in one (market, outcome): shares owned, the subset
/// reserved against open SELL orders, and the weighted-average entry price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub shares: Quantity,
    pub reserved_shares: Quantity,
    pub avg_price: Option<Price>,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            shares: Quantity::zero(),
            reserved_shares: Quantity::zero(),
            avg_price: None,
        }
    }
}

/// All open positions, keyed by (user, market, outcome). Rows are created
/// lazily on first fill and never removed (resolution clears them to zero,
/// it does not delete the row, so audit queries still find it).
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: HashMap<PositionKey, Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: PositionKey) -> Position {
        self.positions.get(&key).copied().unwrap_or_default()
    }

    pub fn reserve(&mut self, key: PositionKey, qty: Quantity) -> Result<(), PositionError> {
        let mut position = self.get(key);
        let unreserved = position
            .shares
            .checked_sub(position.reserved_shares)
            .unwrap_or_else(|_| Quantity::zero());

        if unreserved.value() < qty.value() {
            return Err(PositionError::InsufficientShares {
                requested: qty.value(),
                available: unreserved.value(),
            });
        }

        position.reserved_shares = position.reserved_shares.checked_add(qty)?;
        self.positions.insert(key, position);
        Ok(())
    }

    pub fn release(&mut self, key: PositionKey, qty: Quantity) -> Result<(), PositionError> {
        let mut position = self.get(key);
        position.reserved_shares =
            position
                .reserved_shares
                .checked_sub(qty)
                .map_err(|_| PositionError::NegativeReservedShares {
                    requested: qty.value(),
                })?;
        self.positions.insert(key, position);
        Ok(())
    }

    /// Apply a SELL fill: shares and reservedShares move together.
    pub fn consume_reserved(&mut self, key: PositionKey, qty: Quantity) -> Result<(), PositionError> {
        let mut position = self.get(key);
        position.shares = position.shares.checked_sub(qty)?;
        position.reserved_shares =
            position
                .reserved_shares
                .checked_sub(qty)
                .map_err(|_| PositionError::NegativeReservedShares {
                    requested: qty.value(),
                })?;
        self.positions.insert(key, position);
        Ok(())
    }

    /// Apply a BUY fill: recompute the weighted-average cost then add shares.
    pub fn add(&mut self, key: PositionKey, qty: Quantity, trade_price: Price) -> Result<(), PositionError> {
        let mut position = self.get(key);

        let new_avg = if position.shares.is_zero() {
            trade_price
        } else {
            match position.avg_price {
                None => trade_price,
                Some(existing) => {
                    let cost_basis = existing
                        .value()
                        .checked_mul(position.shares.value())
                        .ok_or(DecimalError::Arithmetic { op: "position cost basis" })?;
                    let incoming = trade_price
                        .value()
                        .checked_mul(qty.value())
                        .ok_or(DecimalError::Arithmetic { op: "position incoming value" })?;
                    let total_shares = position.shares.checked_add(qty)?.value();
                    let weighted = cost_basis
                        .checked_add(incoming)
                        .ok_or(DecimalError::Arithmetic { op: "position weighted sum" })?
                        .checked_div(total_shares)
                        .ok_or(DecimalError::Arithmetic { op: "position weighted average" })?;
                    Price::new(weighted)?
                }
            }
        };

        position.shares = position.shares.checked_add(qty)?;
        position.avg_price = Some(new_avg);
        self.positions.insert(key, position);
        Ok(())
    }

    pub fn clear(&mut self, key: PositionKey) {
        self.positions.insert(key, Position::default());
    }

    pub fn positions_for(&self, user_id: UserId) -> impl Iterator<Item = (&PositionKey, &Position)> {
        self.positions.iter().filter(move |(k, _)| k.0 == user_id)
    }

    pub fn positions_in_market(&self, market_id: MarketId) -> impl Iterator<Item = (&PositionKey, &Position)> {
        self.positions.iter().filter(move |(k, _)| k.1 == market_id)
    }

    pub fn all(&self) -> impl Iterator<Item = (&PositionKey, &Position)> {
        self.positions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn user(n: u128) -> UserId {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_register_then_apply_updates_balance() {
        let mut ledger = Ledger::new();
        let alice = user(1);
        ledger.register_account(alice).unwrap();

        ledger
            .apply(LedgerDelta::new(
                alice,
                Amount::new(dec!(100)),
                Amount::zero(),
                Reason::FaucetCredit,
            ))
            .unwrap();

        let balance = ledger.get_balance(alice).unwrap();
        assert_eq!(balance.available.value(), dec!(100));
        assert_eq!(balance.reserved.value(), dec!(0));
    }

    #[test]
    fn test_apply_rejects_unknown_account() {
        let mut ledger = Ledger::new();
        let result = ledger.apply(LedgerDelta::new(
            user(1),
            Amount::new(dec!(10)),
            Amount::zero(),
            Reason::FaucetCredit,
        ));
        assert!(matches!(result, Err(LedgerError::UnknownAccount(_))));
    }

    #[test]
    fn test_apply_rejects_negative_available() {
        let mut ledger = Ledger::new();
        let alice = user(1);
        ledger.register_account(alice).unwrap();

        let result = ledger.apply(LedgerDelta::new(
            alice,
            Amount::new(dec!(-10)),
            Amount::zero(),
            Reason::OrderReserve,
        ));
        assert!(matches!(result, Err(LedgerError::InvariantViolation { .. })));

        // The rejected delta must not have been partially applied.
        let balance = ledger.get_balance(alice).unwrap();
        assert_eq!(balance.available.value(), dec!(0));
    }

    #[test]
    fn test_reserve_moves_available_to_reserved() {
        let mut ledger = Ledger::new();
        let alice = user(1);
        ledger.register_account(alice).unwrap();
        ledger
            .apply(LedgerDelta::new(alice, Amount::new(dec!(100)), Amount::zero(), Reason::FaucetCredit))
            .unwrap();

        ledger
            .apply(LedgerDelta::new(
                alice,
                Amount::new(dec!(-30)),
                Amount::new(dec!(30)),
                Reason::OrderReserve,
            ))
            .unwrap();

        let balance = ledger.get_balance(alice).unwrap();
        assert_eq!(balance.available.value(), dec!(70));
        assert_eq!(balance.reserved.value(), dec!(30));
    }

    #[test]
    fn test_apply_batch_is_all_or_nothing() {
        let mut ledger = Ledger::new();
        let alice = user(1);
        let bob = user(2);
        ledger.register_account(alice).unwrap();
        ledger.register_account(bob).unwrap();
        ledger
            .apply(LedgerDelta::new(alice, Amount::new(dec!(10)), Amount::zero(), Reason::FaucetCredit))
            .unwrap();

        let batch = vec![
            LedgerDelta::new(alice, Amount::new(dec!(-10)), Amount::zero(), Reason::TradeBuy),
            LedgerDelta::new(bob, Amount::new(dec!(-5)), Amount::zero(), Reason::TradeBuy),
        ];

        let result = ledger.apply_batch(batch);
        assert!(result.is_err());

        // Alice's half of the batch must have been rolled back too.
        assert_eq!(ledger.get_balance(alice).unwrap().available.value(), dec!(10));
    }

    #[test]
    fn test_apply_batch_accumulates_same_user_deltas_in_order() {
        let mut ledger = Ledger::new();
        let alice = user(1);
        ledger.register_account(alice).unwrap();

        let batch = vec![
            LedgerDelta::new(alice, Amount::new(dec!(100)), Amount::zero(), Reason::FaucetCredit),
            LedgerDelta::new(alice, Amount::new(dec!(-40)), Amount::new(dec!(40)), Reason::OrderReserve),
        ];
        ledger.apply_batch(batch).unwrap();

        let balance = ledger.get_balance(alice).unwrap();
        assert_eq!(balance.available.value(), dec!(60));
        assert_eq!(balance.reserved.value(), dec!(40));
    }

    #[test]
    fn test_double_registration_rejected() {
        let mut ledger = Ledger::new();
        let alice = user(1);
        ledger.register_account(alice).unwrap();
        assert!(matches!(
            ledger.register_account(alice),
            Err(LedgerError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_position_reserve_requires_unreserved_shares() {
        let mut store = PositionStore::new();
        let key = (user(1), user(100), Outcome::Yes);

        store.add(key, Quantity::new(dec!(50)).unwrap(), Price::new(dec!(0.4)).unwrap()).unwrap();

        assert!(store.reserve(key, Quantity::new(dec!(60)).unwrap()).is_err());
        store.reserve(key, Quantity::new(dec!(50)).unwrap()).unwrap();
        assert_eq!(store.get(key).reserved_shares.value(), dec!(50));
    }

    #[test]
    fn test_position_add_computes_weighted_average() {
        let mut store = PositionStore::new();
        let key = (user(1), user(100), Outcome::Yes);

        store.add(key, Quantity::new(dec!(100)).unwrap(), Price::new(dec!(0.40)).unwrap()).unwrap();
        store.add(key, Quantity::new(dec!(100)).unwrap(), Price::new(dec!(0.60)).unwrap()).unwrap();

        let position = store.get(key);
        assert_eq!(position.shares.value(), dec!(200));
        assert_eq!(position.avg_price.unwrap().value(), dec!(0.50));
    }

    #[test]
    fn test_position_consume_reserved_moves_shares_and_reservation_together() {
        let mut store = PositionStore::new();
        let key = (user(1), user(100), Outcome::Yes);

        store.add(key, Quantity::new(dec!(50)).unwrap(), Price::new(dec!(0.7)).unwrap()).unwrap();
        store.reserve(key, Quantity::new(dec!(50)).unwrap()).unwrap();
        store.consume_reserved(key, Quantity::new(dec!(50)).unwrap()).unwrap();

        let position = store.get(key);
        assert_eq!(position.shares.value(), dec!(0));
        assert_eq!(position.reserved_shares.value(), dec!(0));
    }

    #[test]
    fn test_position_clear_zeroes_but_keeps_row() {
        let mut store = PositionStore::new();
        let key = (user(1), user(100), Outcome::Yes);
        store.add(key, Quantity::new(dec!(50)).unwrap(), Price::new(dec!(0.7)).unwrap()).unwrap();

        store.clear(key);

        let position = store.get(key);
        assert_eq!(position.shares.value(), dec!(0));
        assert_eq!(position.reserved_shares.value(), dec!(0));
    }
}
