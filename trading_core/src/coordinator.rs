//! The single-writer trading coordinator. Sequences order placement,
//! matching, and settlement as one transaction per event, under a per-market
//! lock so concurrent callers never race on the same book.

use crate::config::TradingConfig;
use crate::error::CoordinatorError;
use crate::storage::{Storage, StorageError, StorageTransaction};
use crate::types::{MarketResolution, MarketStatus, OrderRecord, TradeRecord};
use chrono::Utc;
use decimal::{notional, Amount, Price, Quantity};
use ledger::{Balance, MarketId, Outcome, Position, PositionKey, UserId};
use matching_engine::{BookSnapshot, Match, OrderBook, OrderId, OrderStatus, Sequence, Side};
use rust_decimal::Decimal;
use settlement::{self, SettlementOrder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub struct PlaceOrderResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub matches: Vec<Match>,
}

pub struct BestPrices {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub midpoint: Option<Price>,
}

pub struct MarketSnapshotResult {
    pub market_id: MarketId,
    pub yes: BookSnapshot,
    pub no: BookSnapshot,
}

pub struct Portfolio {
    pub user_id: UserId,
    pub balance: Balance,
    pub positions: Vec<(PositionKey, Position)>,
    pub open_orders: Vec<OrderRecord>,
}

/// One market's mutable matching state: both outcome books plus the
/// admission-sequence counter used to break price ties.
struct MarketState {
    yes_book: OrderBook,
    no_book: OrderBook,
    next_sequence: Sequence,
}

impl MarketState {
    fn new() -> Self {
        Self {
            yes_book: OrderBook::new(),
            no_book: OrderBook::new(),
            next_sequence: 0,
        }
    }

    fn book(&self, outcome: Outcome) -> &OrderBook {
        match outcome {
            Outcome::Yes => &self.yes_book,
            Outcome::No => &self.no_book,
        }
    }

    fn book_mut(&mut self, outcome: Outcome) -> &mut OrderBook {
        match outcome {
            Outcome::Yes => &mut self.yes_book,
            Outcome::No => &mut self.no_book,
        }
    }

    fn next_seq(&mut self) -> Sequence {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }
}

pub struct TradingCoordinator<S: Storage> {
    storage: Arc<S>,
    config: TradingConfig,
    markets: RwLock<HashMap<MarketId, Arc<Mutex<MarketState>>>>,
}

impl<S: Storage> TradingCoordinator<S> {
    pub fn new(storage: Arc<S>, config: TradingConfig) -> Self {
        Self {
            storage,
            config,
            markets: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_market(&self, market_id: MarketId) -> Result<(), CoordinatorError> {
        self.storage.create_market(market_id).await?;
        let mut markets = self.markets.write().await;
        markets.entry(market_id).or_insert_with(|| Arc::new(Mutex::new(MarketState::new())));
        Ok(())
    }

    async fn market_state(&self, market_id: MarketId) -> Result<Arc<Mutex<MarketState>>, CoordinatorError> {
        {
            let markets = self.markets.read().await;
            if let Some(state) = markets.get(&market_id) {
                return Ok(Arc::clone(state));
            }
        }
        self.storage
            .get_market(market_id)
            .await?
            .ok_or(CoordinatorError::MarketNotFound(market_id))?;

        let mut markets = self.markets.write().await;
        let entry = markets.entry(market_id).or_insert_with(|| Arc::new(Mutex::new(MarketState::new())));
        Ok(Arc::clone(entry))
    }

    fn validate_price(&self, value: Decimal) -> Result<Price, CoordinatorError> {
        if value < self.config.min_price || value > self.config.max_price {
            return Err(CoordinatorError::InvalidPrice(value, self.config.min_price, self.config.max_price));
        }
        Ok(Price::new(value)?)
    }

    fn validate_quantity(&self, value: Decimal) -> Result<Quantity, CoordinatorError> {
        if value <= Decimal::ZERO || value > self.config.max_quantity {
            return Err(CoordinatorError::InvalidQuantity(value, self.config.max_quantity));
        }
        Ok(Quantity::new(value)?)
    }

    /// Apply a transaction, retrying transient storage errors with
    /// exponential backoff up to `TradingConfig::max_storage_retries`.
    async fn commit_with_retry(&self, tx: StorageTransaction) -> Result<(), CoordinatorError> {
        let mut attempt = 0u32;
        loop {
            match self.storage.commit(tx.clone()).await {
                Ok(()) => return Ok(()),
                Err(StorageError::Permanent(msg)) => {
                    tracing::error!(error = %msg, "permanent storage error committing transaction");
                    return Err(CoordinatorError::StoragePermanent(msg));
                }
                Err(StorageError::Transient(msg)) => {
                    if attempt >= self.config.max_storage_retries {
                        tracing::error!(error = %msg, attempts = attempt, "exhausted storage retries");
                        return Err(CoordinatorError::StorageTransient(msg));
                    }
                    let delay_ms = self.config.retry_base_delay_ms * 2u64.pow(attempt);
                    tracing::warn!(error = %msg, attempt, delay_ms, "transient storage error, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn place_order(
        &self,
        user_id: UserId,
        market_id: MarketId,
        outcome: Outcome,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<PlaceOrderResult, CoordinatorError> {
        let price = self.validate_price(price)?;
        let quantity = self.validate_quantity(quantity)?;

        let market = self
            .storage
            .get_market(market_id)
            .await?
            .ok_or(CoordinatorError::MarketNotFound(market_id))?;
        if market.status != MarketStatus::Open {
            return Err(CoordinatorError::MarketNotOpen(market_id));
        }

        match side {
            Side::Buy => {
                let balance = self.storage.get_balance(user_id).await?;
                let needed = notional(price, quantity)?;
                if balance.available.value() < needed.value() {
                    return Err(CoordinatorError::InsufficientFunds {
                        user_id,
                        needed: needed.value(),
                        available: balance.available.value(),
                    });
                }
            }
            Side::Sell => {
                let position = self.storage.get_position((user_id, market_id, outcome)).await?;
                let unreserved = position.shares.checked_sub(position.reserved_shares).unwrap_or_else(|_| Quantity::zero());
                if unreserved.value() < quantity.value() {
                    return Err(CoordinatorError::InsufficientShares {
                        user_id,
                        needed: quantity.value(),
                        available: unreserved.value(),
                    });
                }
            }
        }

        let market_state = self.market_state(market_id).await?;
        let mut state = market_state.lock().await;
        let book_snapshot = state.book(outcome).clone();
        let sequence = state.next_seq();

        let now = Utc::now();
        let taker_record = OrderRecord::new(user_id, market_id, outcome, side, price, quantity, sequence, now);

        let mut tx = StorageTransaction::new();
        match side {
            Side::Buy => {
                let reserve_plan = settlement::plan_buy_reserve(user_id, taker_record.id, price, quantity)?;
                tx.ledger_deltas.extend(reserve_plan.ledger_deltas);
            }
            Side::Sell => {
                tx.position_ops.push(settlement::PositionOp::Reserve {
                    key: (user_id, market_id, outcome),
                    qty: quantity,
                });
            }
        }

        let book = state.book_mut(outcome);
        let add_result = book.add_order(taker_record.to_engine_order());

        let mut touched: HashMap<OrderId, OrderRecord> = HashMap::new();
        touched.insert(taker_record.id, taker_record.clone());

        for m in &add_result.matches {
            if !touched.contains_key(&m.maker_order_id) {
                let maker_stored = self
                    .storage
                    .get_order(m.maker_order_id)
                    .await?
                    .ok_or(CoordinatorError::OrderNotFound(m.maker_order_id))?;
                touched.insert(m.maker_order_id, maker_stored);
            }

            let maker_original_qty = touched.get(&m.maker_order_id).unwrap().quantity;
            let maker_settlement: SettlementOrder = touched.get(&m.maker_order_id).unwrap().to_settlement_order();
            let taker_settlement: SettlementOrder = touched.get(&taker_record.id).unwrap().to_settlement_order();

            let trade_plan = settlement::plan_trade(
                m,
                &maker_settlement,
                &taker_settlement,
                maker_original_qty,
                taker_record.quantity,
                self.config.taker_fee_rate,
                self.config.system_account_id,
            )?;

            tx.ledger_deltas.extend(trade_plan.ledger_deltas);
            tx.position_ops.extend(trade_plan.position_ops);
            for change in &trade_plan.order_state_changes {
                if let Some(rec) = touched.get_mut(&change.order_id) {
                    rec.remaining = change.new_remaining;
                    rec.status = change.new_status;
                }
            }

            let fee_value = notional(m.price, m.quantity)?
                .value()
                .checked_mul(self.config.taker_fee_rate)
                .ok_or(decimal::DecimalError::Arithmetic { op: "trade fee" })?;
            tx.new_trades.push(TradeRecord {
                id: uuid::Uuid::new_v4(),
                market_id,
                outcome,
                price: m.price,
                quantity: m.quantity,
                maker_order_id: m.maker_order_id,
                taker_order_id: m.taker_order_id,
                maker_user_id: maker_settlement.user_id,
                taker_user_id: taker_settlement.user_id,
                taker_fee: Amount::new(fee_value),
                created_at: now,
            });

            tracing::info!(
                market_id = %market_id,
                maker_order_id = %m.maker_order_id,
                taker_order_id = %m.taker_order_id,
                price = %m.price,
                quantity = %m.quantity,
                "order matched"
            );
        }

        let final_status = touched.get(&taker_record.id).unwrap().status;
        let final_matches = add_result.matches.clone();
        tx.upsert_orders.extend(touched.into_values());

        match self.commit_with_retry(tx).await {
            Ok(()) => {
                tracing::info!(market_id = %market_id, order_id = %taker_record.id, status = ?final_status, "order placed");
                Ok(PlaceOrderResult {
                    order_id: taker_record.id,
                    status: final_status,
                    matches: final_matches,
                })
            }
            Err(e) => {
                *state.book_mut(outcome) = book_snapshot;
                Err(e)
            }
        }
    }

    pub async fn cancel_order(&self, user_id: UserId, order_id: OrderId, is_admin: bool) -> Result<OrderStatus, CoordinatorError> {
        let order = self
            .storage
            .get_order(order_id)
            .await?
            .ok_or(CoordinatorError::OrderNotFound(order_id))?;
        if !is_admin && order.user_id != user_id {
            return Err(CoordinatorError::NotOwner(user_id));
        }
        if !order.is_cancellable() {
            return Err(CoordinatorError::NotCancellable(order_id));
        }

        let market_state = self.market_state(order.market_id).await?;
        let mut state = market_state.lock().await;
        let book_snapshot = state.book(order.outcome).clone();
        state.book_mut(order.outcome).cancel(order_id);

        let plan = settlement::plan_order_cancel(&order.to_settlement_order())?;
        let mut tx = StorageTransaction::new();
        tx.ledger_deltas = plan.ledger_deltas;
        tx.position_ops = plan.position_ops;
        let mut updated = order.clone();
        updated.status = OrderStatus::Cancelled;
        tx.upsert_orders.push(updated);

        match self.commit_with_retry(tx).await {
            Ok(()) => {
                tracing::info!(order_id = %order_id, "order cancelled");
                Ok(OrderStatus::Cancelled)
            }
            Err(e) => {
                *state.book_mut(order.outcome) = book_snapshot;
                Err(e)
            }
        }
    }

    /// Drain both of a market's books, plan refunds for the open orders found
    /// there, and return both the per-order plan and the updated records
    /// (status not yet set — the caller decides cancel vs. resolve wording).
    async fn drain_market_orders(
        &self,
        state: &mut MarketState,
        market_id: MarketId,
    ) -> Result<(settlement::SettlementPlan, Vec<OrderRecord>), CoordinatorError> {
        let mut drained_ids: Vec<(OrderId, Outcome)> = Vec::new();
        for o in state.yes_book.clear_all() {
            drained_ids.push((o.id, Outcome::Yes));
        }
        for o in state.no_book.clear_all() {
            drained_ids.push((o.id, Outcome::No));
        }

        let mut records = Vec::with_capacity(drained_ids.len());
        for (order_id, _) in &drained_ids {
            let record = self
                .storage
                .get_order(*order_id)
                .await?
                .ok_or(CoordinatorError::OrderNotFound(*order_id))?;
            records.push(record);
        }

        let settlement_orders: Vec<SettlementOrder> = records.iter().map(|r| r.to_settlement_order()).collect();
        let plan = settlement::plan_market_cancel(market_id, &settlement_orders)?;
        Ok((plan, records))
    }

    pub async fn cancel_market(&self, market_id: MarketId, _admin_user_id: UserId) -> Result<usize, CoordinatorError> {
        let market = self
            .storage
            .get_market(market_id)
            .await?
            .ok_or(CoordinatorError::MarketNotFound(market_id))?;
        if market.status != MarketStatus::Open {
            return Ok(0);
        }

        let market_state = self.market_state(market_id).await?;
        let mut state = market_state.lock().await;
        let yes_snapshot = state.yes_book.clone();
        let no_snapshot = state.no_book.clone();

        let (plan, mut records) = self.drain_market_orders(&mut state, market_id).await?;
        let count = records.len();
        for record in &mut records {
            record.status = OrderStatus::Cancelled;
        }

        let mut tx = StorageTransaction::new();
        tx.ledger_deltas = plan.ledger_deltas;
        tx.position_ops = plan.position_ops;
        tx.upsert_orders = records;
        tx.market_status_change = Some((market_id, MarketStatus::Cancelled));

        match self.commit_with_retry(tx).await {
            Ok(()) => {
                tracing::info!(market_id = %market_id, orders_refunded = count, "market cancelled");
                Ok(count)
            }
            Err(e) => {
                state.yes_book = yes_snapshot;
                state.no_book = no_snapshot;
                Err(e)
            }
        }
    }

    pub async fn resolve_market(&self, market_id: MarketId, admin_user_id: UserId, winner: Outcome) -> Result<usize, CoordinatorError> {
        let market = self
            .storage
            .get_market(market_id)
            .await?
            .ok_or(CoordinatorError::MarketNotFound(market_id))?;
        if market.status != MarketStatus::Open {
            return Err(CoordinatorError::MarketNotOpen(market_id));
        }

        let market_state = self.market_state(market_id).await?;
        let mut state = market_state.lock().await;
        let yes_snapshot = state.yes_book.clone();
        let no_snapshot = state.no_book.clone();

        let (cancel_plan, mut records) = self.drain_market_orders(&mut state, market_id).await?;
        for record in &mut records {
            record.status = OrderStatus::Cancelled;
        }

        let positions = self.storage.positions_for_market(market_id).await?;
        let resolve_plan = settlement::plan_resolve(market_id, winner, &positions)?;
        let settled_count = positions.iter().filter(|(_, p)| !p.shares.is_zero()).count();

        let mut tx = StorageTransaction::new();
        tx.ledger_deltas = cancel_plan.ledger_deltas;
        tx.ledger_deltas.extend(resolve_plan.ledger_deltas);
        tx.position_ops = cancel_plan.position_ops;
        tx.position_ops.extend(resolve_plan.position_ops);
        tx.upsert_orders = records;
        tx.market_status_change = Some((market_id, MarketStatus::Resolved));
        tx.market_resolution = Some(MarketResolution {
            market_id,
            winning_outcome: winner,
            resolved_at: Utc::now(),
            resolver_user_id: admin_user_id,
        });

        match self.commit_with_retry(tx).await {
            Ok(()) => {
                tracing::info!(market_id = %market_id, winner = ?winner, positions_settled = settled_count, "market resolved");
                Ok(settled_count)
            }
            Err(e) => {
                state.yes_book = yes_snapshot;
                state.no_book = no_snapshot;
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self, market_id: MarketId) -> Result<MarketSnapshotResult, CoordinatorError> {
        let market_state = self.market_state(market_id).await?;
        let state = market_state.lock().await;
        Ok(MarketSnapshotResult {
            market_id,
            yes: state.yes_book.snapshot(),
            no: state.no_book.snapshot(),
        })
    }

    pub async fn best_prices(&self, market_id: MarketId, outcome: Outcome) -> Result<BestPrices, CoordinatorError> {
        let market_state = self.market_state(market_id).await?;
        let state = market_state.lock().await;
        let book = state.book(outcome);
        Ok(BestPrices {
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            midpoint: book.midpoint(),
        })
    }

    pub async fn portfolio(&self, user_id: UserId) -> Result<Portfolio, CoordinatorError> {
        let balance = self.storage.get_balance(user_id).await?;
        let positions = self.storage.positions_for_user(user_id).await?;
        let open_orders = self.storage.open_orders_for_user(user_id).await?;
        Ok(Portfolio {
            user_id,
            balance,
            positions,
            open_orders,
        })
    }

    /// Rebuild every market's in-memory books from storage at startup, then
    /// cross-check recomputed reservations against the ledger/position
    /// projections. A mismatch means a bug or a writer that ran outside this
    /// coordinator and is fatal — the process should not start trading.
    pub async fn recover(&self) -> Result<(), CoordinatorError> {
        let mut open_orders = self.storage.all_open_orders().await?;
        open_orders.sort_by_key(|o| o.sequence);

        {
            let mut markets = self.markets.write().await;
            for order in &open_orders {
                let state = markets.entry(order.market_id).or_insert_with(|| Arc::new(Mutex::new(MarketState::new())));
                let mut guard = state.lock().await;
                guard.next_sequence = guard.next_sequence.max(order.sequence + 1);
                guard.book_mut(order.outcome).add_order(order.to_engine_order());
            }
        }

        let mut buy_reservations: HashMap<UserId, Amount> = HashMap::new();
        let mut sell_reservations: HashMap<PositionKey, Quantity> = HashMap::new();

        for order in &open_orders {
            match order.side {
                Side::Buy => {
                    let value = notional(order.price, order.remaining)?;
                    let entry = buy_reservations.entry(order.user_id).or_insert_with(Amount::zero);
                    *entry = entry.checked_add(value)?;
                }
                Side::Sell => {
                    let key = (order.user_id, order.market_id, order.outcome);
                    let entry = sell_reservations.entry(key).or_insert_with(Quantity::zero);
                    *entry = entry.checked_add(order.remaining)?;
                }
            }
        }

        for (user_id, expected) in buy_reservations {
            let balance = self.storage.get_balance(user_id).await?;
            if balance.reserved.value() != expected.value() {
                tracing::error!(user_id = %user_id, ledger_reserved = %balance.reserved.value(), recomputed = %expected.value(), "reservation mismatch during recovery");
                return Err(CoordinatorError::ReservationMismatch {
                    user_id,
                    ledger_reserved: balance.reserved.value(),
                    recomputed: expected.value(),
                });
            }
        }

        for (key, expected) in sell_reservations {
            let position = self.storage.get_position(key).await?;
            if position.reserved_shares.value() != expected.value() {
                tracing::error!(user_id = %key.0, ledger_reserved = %position.reserved_shares.value(), recomputed = %expected.value(), "reservation mismatch during recovery");
                return Err(CoordinatorError::ReservationMismatch {
                    user_id: key.0,
                    ledger_reserved: position.reserved_shares.value(),
                    recomputed: expected.value(),
                });
            }
        }

        tracing::info!(orders_recovered = open_orders.len(), "recovery complete");
        Ok(())
    }
}
