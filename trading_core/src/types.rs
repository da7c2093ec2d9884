//! The shapes the coordinator persists and exchanges with callers. Order,
//! Market, and Trade all live here rather than in `matching_engine` or
//! `ledger` — they are coordinator-level records, not engine- or
//! ledger-internal state.

use chrono::{DateTime, Utc};
use decimal::{Amount, Price, Quantity};
use ledger::{MarketId, Outcome, UserId};
use matching_engine::{OrderId, OrderStatus, Sequence, Side};
use serde::{Deserialize, Serialize};
use settlement::SettlementOrder;
use uuid::Uuid;

/// The single order shape shared by the matching engine and the
/// coordinator/ledger layers. `to_engine_order` projects the fields the
/// book actually needs to match; everything else here is bookkeeping the
/// engine itself never sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub remaining: Quantity,
    pub status: OrderStatus,
    pub sequence: Sequence,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn new(
        user_id: UserId,
        market_id: MarketId,
        outcome: Outcome,
        side: Side,
        price: Price,
        quantity: Quantity,
        sequence: Sequence,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id,
            outcome,
            side,
            price,
            quantity,
            remaining: quantity,
            status: OrderStatus::Open,
            sequence,
            created_at,
        }
    }

    pub fn to_engine_order(&self) -> matching_engine::Order {
        let mut order = matching_engine::Order::new(self.id, self.side, self.price, self.quantity, self.sequence);
        order.remaining = self.remaining;
        order
    }

    pub fn to_settlement_order(&self) -> SettlementOrder {
        SettlementOrder {
            order_id: self.id,
            user_id: self.user_id,
            market_id: self.market_id,
            outcome: self.outcome,
            side: self.side,
            price: self.price,
            remaining: self.remaining,
        }
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::Partial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Open,
    Resolved,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub id: MarketId,
    pub status: MarketStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketResolution {
    pub market_id: MarketId,
    pub winning_outcome: Outcome,
    pub resolved_at: DateTime<Utc>,
    pub resolver_user_id: UserId,
}

/// Audit record of one matched fill. Every match here always has two real
/// orders and two real owning users — no anonymous counterparty case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub price: Price,
    pub quantity: Quantity,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub maker_user_id: UserId,
    pub taker_user_id: UserId,
    pub taker_fee: Amount,
    pub created_at: DateTime<Utc>,
}
