//! Canonical wire representations. Numeric types stay internal; every
//! `Decimal` crosses the wire as a string, rendered through
//! `decimal::canonical_string` rather than `Decimal`'s own formatting, since
//! prices and quantities each carry a fixed number of wire-visible fractional
//! digits.

use crate::coordinator::{BestPrices, MarketSnapshotResult, PlaceOrderResult, Portfolio};
use crate::types::OrderRecord;
use chrono::SecondsFormat;
use decimal::{canonical_string, Amount, Price, Quantity};
use ledger::{Balance, Outcome, Position, PositionKey};
use matching_engine::{BookSnapshot, Level, Match, OrderStatus, Side};
use serde::{Serialize, Serializer};
use uuid::Uuid;

const PRICE_DIGITS: u32 = 2;
const FULL_DIGITS: u32 = 18;

fn serialize_price<S: Serializer>(value: &Price, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&canonical_string(value.value(), PRICE_DIGITS))
}

fn serialize_quantity<S: Serializer>(value: &Quantity, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&canonical_string(value.value(), FULL_DIGITS))
}

fn serialize_amount<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&canonical_string(value.value(), FULL_DIGITS))
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Yes => "YES",
        Outcome::No => "NO",
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn status_name(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Open => "OPEN",
        OrderStatus::Partial => "PARTIAL",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Cancelled => "CANCELLED",
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub market_id: Uuid,
    pub outcome: String,
    pub side: String,
    #[serde(serialize_with = "serialize_price")]
    pub price: Price,
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity: Quantity,
    #[serde(serialize_with = "serialize_quantity")]
    pub remaining: Quantity,
    pub status: String,
    pub created_at: String,
}

impl From<&OrderRecord> for OrderResponse {
    fn from(order: &OrderRecord) -> Self {
        Self {
            id: order.id,
            market_id: order.market_id,
            outcome: outcome_name(order.outcome).to_string(),
            side: side_name(order.side).to_string(),
            price: order.price,
            quantity: order.quantity,
            remaining: order.remaining,
            status: status_name(order.status).to_string(),
            created_at: order.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub maker_order_id: Uuid,
    #[serde(serialize_with = "serialize_price")]
    pub price: Price,
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity: Quantity,
}

impl From<&Match> for MatchResponse {
    fn from(m: &Match) -> Self {
        Self {
            maker_order_id: m.maker_order_id,
            price: m.price,
            quantity: m.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    pub status: String,
    pub matches: Vec<MatchResponse>,
}

impl From<&PlaceOrderResult> for PlaceOrderResponse {
    fn from(result: &PlaceOrderResult) -> Self {
        Self {
            order_id: result.order_id,
            status: status_name(result.status).to_string(),
            matches: result.matches.iter().map(MatchResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelOrderResponse {
    pub order_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MarketCancelResponse {
    pub market_id: Uuid,
    pub orders_refunded: usize,
}

#[derive(Debug, Serialize)]
pub struct MarketResolveResponse {
    pub market_id: Uuid,
    pub winner: String,
    pub positions_settled: usize,
}

#[derive(Debug, Serialize)]
pub struct LevelResponse {
    #[serde(serialize_with = "serialize_price")]
    pub price: Price,
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity: Quantity,
    pub order_count: usize,
}

impl From<&Level> for LevelResponse {
    fn from(level: &Level) -> Self {
        Self {
            price: level.price,
            quantity: level.quantity,
            order_count: level.order_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookSnapshotResponse {
    pub bids: Vec<LevelResponse>,
    pub asks: Vec<LevelResponse>,
}

impl From<&BookSnapshot> for BookSnapshotResponse {
    fn from(snapshot: &BookSnapshot) -> Self {
        Self {
            bids: snapshot.bids.iter().map(LevelResponse::from).collect(),
            asks: snapshot.asks.iter().map(LevelResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MarketSnapshotResponse {
    pub market_id: Uuid,
    pub yes: BookSnapshotResponse,
    pub no: BookSnapshotResponse,
}

impl From<&MarketSnapshotResult> for MarketSnapshotResponse {
    fn from(snapshot: &MarketSnapshotResult) -> Self {
        Self {
            market_id: snapshot.market_id,
            yes: BookSnapshotResponse::from(&snapshot.yes),
            no: BookSnapshotResponse::from(&snapshot.no),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BestPricesResponse {
    pub best_bid: Option<String>,
    pub best_ask: Option<String>,
    pub midpoint: Option<String>,
}

impl From<&BestPrices> for BestPricesResponse {
    fn from(best: &BestPrices) -> Self {
        Self {
            best_bid: best.best_bid.map(|p| canonical_string(p.value(), PRICE_DIGITS)),
            best_ask: best.best_ask.map(|p| canonical_string(p.value(), PRICE_DIGITS)),
            midpoint: best.midpoint.map(|p| canonical_string(p.value(), PRICE_DIGITS)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    #[serde(serialize_with = "serialize_amount")]
    pub available: Amount,
    #[serde(serialize_with = "serialize_amount")]
    pub reserved: Amount,
}

impl From<&Balance> for BalanceResponse {
    fn from(balance: &Balance) -> Self {
        Self {
            available: balance.available,
            reserved: balance.reserved,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    pub market_id: Uuid,
    pub outcome: String,
    #[serde(serialize_with = "serialize_quantity")]
    pub shares: Quantity,
    #[serde(serialize_with = "serialize_quantity")]
    pub reserved_shares: Quantity,
    pub avg_price: Option<String>,
}

impl From<(&PositionKey, &Position)> for PositionResponse {
    fn from((key, position): (&PositionKey, &Position)) -> Self {
        let (_, market_id, outcome) = *key;
        Self {
            market_id,
            outcome: outcome_name(outcome).to_string(),
            shares: position.shares,
            reserved_shares: position.reserved_shares,
            avg_price: position.avg_price.map(|p| canonical_string(p.value(), PRICE_DIGITS)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub user_id: Uuid,
    pub balance: BalanceResponse,
    pub positions: Vec<PositionResponse>,
    pub open_orders: Vec<OrderResponse>,
}

impl From<&Portfolio> for PortfolioResponse {
    fn from(portfolio: &Portfolio) -> Self {
        Self {
            user_id: portfolio.user_id,
            balance: BalanceResponse::from(&portfolio.balance),
            positions: portfolio.positions.iter().map(|(k, p)| PositionResponse::from((k, p))).collect(),
            open_orders: portfolio.open_orders.iter().map(OrderResponse::from).collect(),
        }
    }
}
