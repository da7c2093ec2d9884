//! The persistence seam. `Storage` is the boundary a real relational
//! backend would plug into. `InMemoryStorage` is the reference
//! implementation used by tests and by a standalone deployment that
//! doesn't need durability across restarts.

use crate::error::CoordinatorError;
use crate::types::{MarketRecord, MarketResolution, MarketStatus, OrderRecord, TradeRecord};
use async_trait::async_trait;
use ledger::{Balance, Ledger, LedgerDelta, MarketId, Position, PositionKey, PositionStore, UserId};
use matching_engine::OrderId;
use settlement::PositionOp;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(String),
}

impl From<StorageError> for CoordinatorError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Transient(msg) => CoordinatorError::StorageTransient(msg),
            StorageError::Permanent(msg) => CoordinatorError::StoragePermanent(msg),
        }
    }
}

/// Everything one coordinator event (placement, match, cancel, resolution)
/// needs committed together. `commit` applies this as a single logical
/// transaction — partial application is a storage-implementation bug.
#[derive(Debug, Default, Clone)]
pub struct StorageTransaction {
    pub ledger_deltas: Vec<LedgerDelta>,
    pub position_ops: Vec<PositionOp>,
    pub upsert_orders: Vec<OrderRecord>,
    pub new_trades: Vec<TradeRecord>,
    pub market_status_change: Option<(MarketId, MarketStatus)>,
    pub market_resolution: Option<MarketResolution>,
}

impl StorageTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger_deltas.is_empty()
            && self.position_ops.is_empty()
            && self.upsert_orders.is_empty()
            && self.new_trades.is_empty()
            && self.market_status_change.is_none()
            && self.market_resolution.is_none()
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn register_account(&self, user_id: UserId) -> Result<(), StorageError>;
    async fn get_balance(&self, user_id: UserId) -> Result<Balance, StorageError>;
    async fn get_position(&self, key: PositionKey) -> Result<Position, StorageError>;
    async fn positions_for_market(&self, market_id: MarketId) -> Result<Vec<(PositionKey, Position)>, StorageError>;
    async fn positions_for_user(&self, user_id: UserId) -> Result<Vec<(PositionKey, Position)>, StorageError>;

    async fn create_market(&self, market_id: MarketId) -> Result<(), StorageError>;
    async fn get_market(&self, market_id: MarketId) -> Result<Option<MarketRecord>, StorageError>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>, StorageError>;
    async fn open_orders_for_market(&self, market_id: MarketId) -> Result<Vec<OrderRecord>, StorageError>;
    async fn open_orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderRecord>, StorageError>;
    async fn all_open_orders(&self) -> Result<Vec<OrderRecord>, StorageError>;

    /// Apply a transaction atomically. Implementations that back onto a real
    /// database wrap this in a single SQL transaction; `InMemoryStorage`
    /// serializes access through its own internal mutex.
    async fn commit(&self, tx: StorageTransaction) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct InMemoryState {
    ledger: Ledger,
    positions: PositionStore,
    orders: HashMap<OrderId, OrderRecord>,
    trades: Vec<TradeRecord>,
    markets: HashMap<MarketId, MarketRecord>,
    resolutions: HashMap<MarketId, MarketResolution>,
}

/// In-process reference `Storage`. Holds the ledger, the position store,
/// and the order/trade/market tables behind one mutex, mirroring the single
/// Postgres transaction a real backend would use.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<InMemoryState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn register_account(&self, user_id: UserId) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state
            .ledger
            .register_account(user_id)
            .map_err(|e| StorageError::Permanent(e.to_string()))
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Balance, StorageError> {
        let state = self.state.lock().await;
        state.ledger.get_balance(user_id).map_err(|e| StorageError::Permanent(e.to_string()))
    }

    async fn get_position(&self, key: PositionKey) -> Result<Position, StorageError> {
        let state = self.state.lock().await;
        Ok(state.positions.get(key))
    }

    async fn positions_for_market(&self, market_id: MarketId) -> Result<Vec<(PositionKey, Position)>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.positions.positions_in_market(market_id).map(|(k, v)| (*k, *v)).collect())
    }

    async fn positions_for_user(&self, user_id: UserId) -> Result<Vec<(PositionKey, Position)>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.positions.positions_for(user_id).map(|(k, v)| (*k, *v)).collect())
    }

    async fn create_market(&self, market_id: MarketId) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.markets.insert(
            market_id,
            MarketRecord {
                id: market_id,
                status: MarketStatus::Open,
            },
        );
        Ok(())
    }

    async fn get_market(&self, market_id: MarketId) -> Result<Option<MarketRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.markets.get(&market_id).cloned())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn open_orders_for_market(&self, market_id: MarketId) -> Result<Vec<OrderRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.market_id == market_id && o.is_cancellable())
            .cloned()
            .collect())
    }

    async fn open_orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.is_cancellable())
            .cloned()
            .collect())
    }

    async fn all_open_orders(&self) -> Result<Vec<OrderRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.orders.values().filter(|o| o.is_cancellable()).cloned().collect())
    }

    async fn commit(&self, tx: StorageTransaction) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;

        if !tx.ledger_deltas.is_empty() {
            state
                .ledger
                .apply_batch(tx.ledger_deltas)
                .map_err(|e| StorageError::Permanent(e.to_string()))?;
        }

        for op in tx.position_ops {
            let result = match op {
                PositionOp::Reserve { key, qty } => state.positions.reserve(key, qty),
                PositionOp::Release { key, qty } => state.positions.release(key, qty),
                PositionOp::ConsumeReserved { key, qty } => state.positions.consume_reserved(key, qty),
                PositionOp::Add { key, qty, trade_price } => state.positions.add(key, qty, trade_price),
                PositionOp::Clear { key } => {
                    state.positions.clear(key);
                    Ok(())
                }
            };
            result.map_err(|e| StorageError::Permanent(e.to_string()))?;
        }

        for order in tx.upsert_orders {
            state.orders.insert(order.id, order);
        }

        for trade in tx.new_trades {
            state.trades.push(trade);
        }

        if let Some((market_id, status)) = tx.market_status_change {
            if let Some(market) = state.markets.get_mut(&market_id) {
                market.status = status;
            }
        }

        if let Some(resolution) = tx.market_resolution {
            state.resolutions.insert(resolution.market_id, resolution);
        }

        Ok(())
    }
}
