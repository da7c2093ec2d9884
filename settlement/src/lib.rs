//! Pure settlement calculator.
//!
//! Every function here takes a description of what happened (a reservation,
//! a match, a cancellation, a resolution) and returns a `SettlementPlan` —
//! the ledger deltas, position operations, and order-state changes that
//! event implies. Nothing in this crate touches storage, a lock, or the
//! clock; the trading coordinator is the only thing that commits a plan.

use decimal::{notional, Amount, DecimalError, Price, Quantity};
use ledger::{LedgerDelta, MarketId, Outcome, Position, PositionKey, Reason, Reference, ReferenceKind, UserId};
use matching_engine::{Match, OrderId, OrderStatus, Side};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Arithmetic(#[from] DecimalError),
}

/// The subset of an order's state settlement needs to reason about. The
/// coordinator projects its own order record down to this shape at each
/// call site; settlement never sees (or needs) the rest.
#[derive(Debug, Clone, Copy)]
pub struct SettlementOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub side: Side,
    pub price: Price,
    pub remaining: Quantity,
}

/// A position-store mutation to apply. Kept as data, not a closure, so a
/// plan can be logged, replayed, or inspected before being committed.
#[derive(Debug, Clone, Copy)]
pub enum PositionOp {
    Reserve { key: PositionKey, qty: Quantity },
    Release { key: PositionKey, qty: Quantity },
    ConsumeReserved { key: PositionKey, qty: Quantity },
    Add { key: PositionKey, qty: Quantity, trade_price: Price },
    Clear { key: PositionKey },
}

#[derive(Debug, Clone, Copy)]
pub struct OrderStateChange {
    pub order_id: OrderId,
    pub new_remaining: Quantity,
    pub new_status: OrderStatus,
}

/// Everything one lifecycle event (reservation, trade, cancel, resolution)
/// implies. The coordinator applies `ledger_deltas` via `Ledger::apply_batch`,
/// `position_ops` against the `PositionStore`, and `order_state_changes` to
/// its own order records, all within one storage transaction.
#[derive(Debug, Clone, Default)]
pub struct SettlementPlan {
    pub ledger_deltas: Vec<LedgerDelta>,
    pub position_ops: Vec<PositionOp>,
    pub order_state_changes: Vec<OrderStateChange>,
}

impl SettlementPlan {
    fn new() -> Self {
        Self::default()
    }
}

fn order_reference(order_id: OrderId) -> Reference {
    Reference {
        kind: ReferenceKind::Order,
        id: order_id,
    }
}

fn trade_reference(trade_id: Uuid) -> Reference {
    Reference {
        kind: ReferenceKind::Trade,
        id: trade_id,
    }
}

fn market_reference(market_id: MarketId) -> Reference {
    Reference {
        kind: ReferenceKind::Market,
        id: market_id,
    }
}

fn status_for_remaining(original: Quantity, remaining: Quantity) -> OrderStatus {
    if remaining.is_zero() {
        OrderStatus::Filled
    } else if remaining.value() < original.value() {
        OrderStatus::Partial
    } else {
        OrderStatus::Open
    }
}

/// A BUY order reserves `price * qty` out of available funds at placement.
pub fn plan_buy_reserve(
    user_id: UserId,
    order_id: OrderId,
    price: Price,
    qty: Quantity,
) -> Result<SettlementPlan, SettlementError> {
    let value = notional(price, qty)?;
    let mut plan = SettlementPlan::new();
    plan.ledger_deltas.push(
        LedgerDelta::new(user_id, value.checked_neg()?, value, Reason::OrderReserve)
            .with_reference(order_reference(order_id)),
    );
    Ok(plan)
}

/// The inverse of `plan_buy_reserve`, for whatever quantity is still
/// reserved (a full cancel, or the unused remainder of a partial fill).
pub fn plan_order_release(
    user_id: UserId,
    order_id: OrderId,
    price: Price,
    remaining: Quantity,
) -> Result<SettlementPlan, SettlementError> {
    let value = notional(price, remaining)?;
    let mut plan = SettlementPlan::new();
    plan.ledger_deltas.push(
        LedgerDelta::new(user_id, value, value.checked_neg()?, Reason::OrderReserveRelease)
            .with_reference(order_reference(order_id)),
    );
    Ok(plan)
}

/// Settle one match: move funds and shares between maker and taker, collect
/// the taker's fee into the system account, and compute both orders' new
/// remaining/status.
#[allow(clippy::too_many_arguments)]
pub fn plan_trade(
    m: &Match,
    maker: &SettlementOrder,
    taker: &SettlementOrder,
    maker_original_qty: Quantity,
    taker_original_qty: Quantity,
    taker_fee_rate: Decimal,
    system_account_id: UserId,
) -> Result<SettlementPlan, SettlementError> {
    let mut plan = SettlementPlan::new();
    let trade_id = Uuid::new_v4();

    let value = notional(m.price, m.quantity)?;
    let fee = Amount::new(
        value
            .value()
            .checked_mul(taker_fee_rate)
            .ok_or(DecimalError::Arithmetic { op: "trade fee" })?,
    );
    let net = value.checked_add(fee.checked_neg()?)?;

    let maker_key = (maker.user_id, maker.market_id, maker.outcome);
    let taker_key = (taker.user_id, taker.market_id, taker.outcome);

    match taker.side {
        Side::Buy => {
            // Maker was the resting SELL: it receives net proceeds, loses shares.
            plan.ledger_deltas.push(
                LedgerDelta::new(maker.user_id, net, Amount::zero(), Reason::TradeSell)
                    .with_reference(trade_reference(trade_id)),
            );
            plan.position_ops.push(PositionOp::ConsumeReserved {
                key: maker_key,
                qty: m.quantity,
            });

            // Taker was the BUY: release the full amount reserved at its own
            // limit price, crediting back any price improvement over the
            // execution price, then gains shares and pays the fee.
            let taker_reserved_value = notional(taker.price, m.quantity)?;
            let price_improvement = taker_reserved_value.checked_add(value.checked_neg()?)?;
            plan.ledger_deltas.push(
                LedgerDelta::new(taker.user_id, price_improvement, taker_reserved_value.checked_neg()?, Reason::TradeBuy)
                    .with_reference(trade_reference(trade_id)),
            );
            plan.position_ops.push(PositionOp::Add {
                key: taker_key,
                qty: m.quantity,
                trade_price: m.price,
            });
            plan.ledger_deltas.push(
                LedgerDelta::new(taker.user_id, fee.checked_neg()?, Amount::zero(), Reason::TradeFee)
                    .with_reference(trade_reference(trade_id)),
            );
        }
        Side::Sell => {
            // Maker was the resting BUY: consumes reserved funds, gains shares.
            plan.ledger_deltas.push(
                LedgerDelta::new(maker.user_id, Amount::zero(), value.checked_neg()?, Reason::TradeBuy)
                    .with_reference(trade_reference(trade_id)),
            );
            plan.position_ops.push(PositionOp::Add {
                key: maker_key,
                qty: m.quantity,
                trade_price: m.price,
            });

            // Taker was the SELL: receives net proceeds, loses shares, pays the fee.
            plan.ledger_deltas.push(
                LedgerDelta::new(taker.user_id, net, Amount::zero(), Reason::TradeSell)
                    .with_reference(trade_reference(trade_id)),
            );
            plan.position_ops.push(PositionOp::ConsumeReserved {
                key: taker_key,
                qty: m.quantity,
            });
            plan.ledger_deltas.push(
                LedgerDelta::new(taker.user_id, fee.checked_neg()?, Amount::zero(), Reason::TradeFee)
                    .with_reference(trade_reference(trade_id)),
            );
        }
    }

    // The fee always flows from the taker's available balance to SYSTEM's.
    // The maker is credited `net` (value minus fee) rather than the full
    // trade value, so this mirror entry is the only place the fee is
    // actually paid into SYSTEM; it does not net the entries above to zero.
    plan.ledger_deltas.push(
        LedgerDelta::new(system_account_id, fee, Amount::zero(), Reason::TradeFee)
            .with_reference(trade_reference(trade_id)),
    );

    let maker_new_remaining = maker.remaining.checked_sub(m.quantity)?;
    let taker_new_remaining = taker.remaining.checked_sub(m.quantity)?;
    plan.order_state_changes.push(OrderStateChange {
        order_id: m.maker_order_id,
        new_remaining: maker_new_remaining,
        new_status: status_for_remaining(maker_original_qty, maker_new_remaining),
    });
    plan.order_state_changes.push(OrderStateChange {
        order_id: m.taker_order_id,
        new_remaining: taker_new_remaining,
        new_status: status_for_remaining(taker_original_qty, taker_new_remaining),
    });

    Ok(plan)
}

/// Cancel a single order: release whatever reservation it still holds.
pub fn plan_order_cancel(order: &SettlementOrder) -> Result<SettlementPlan, SettlementError> {
    let mut plan = match order.side {
        Side::Buy => plan_order_release(order.user_id, order.order_id, order.price, order.remaining)?,
        Side::Sell => {
            let mut plan = SettlementPlan::new();
            plan.position_ops.push(PositionOp::Release {
                key: (order.user_id, order.market_id, order.outcome),
                qty: order.remaining,
            });
            plan
        }
    };

    plan.order_state_changes.push(OrderStateChange {
        order_id: order.order_id,
        new_remaining: order.remaining,
        new_status: OrderStatus::Cancelled,
    });

    Ok(plan)
}

/// Cancel an entire market's open orders: refund BUY reservations in bulk
/// and release SELL share reservations, aggregated per user to minimize the
/// number of ledger entries an admin action produces.
pub fn plan_market_cancel(market_id: MarketId, open_orders: &[SettlementOrder]) -> Result<SettlementPlan, SettlementError> {
    let mut plan = SettlementPlan::new();
    let mut refunds: std::collections::HashMap<UserId, Amount> = std::collections::HashMap::new();

    for order in open_orders {
        match order.side {
            Side::Buy => {
                let value = notional(order.price, order.remaining)?;
                let entry = refunds.entry(order.user_id).or_insert_with(Amount::zero);
                *entry = entry.checked_add(value)?;
            }
            Side::Sell => {
                plan.position_ops.push(PositionOp::Release {
                    key: (order.user_id, order.market_id, order.outcome),
                    qty: order.remaining,
                });
            }
        }

        plan.order_state_changes.push(OrderStateChange {
            order_id: order.order_id,
            new_remaining: order.remaining,
            new_status: OrderStatus::Cancelled,
        });
    }

    for (user_id, amount) in refunds {
        plan.ledger_deltas.push(
            LedgerDelta::new(user_id, amount, amount.checked_neg()?, Reason::MarketCancelRefund)
                .with_reference(market_reference(market_id)),
        );
    }

    Ok(plan)
}

/// Pay out a resolved market: winners get `shares` credited 1:1, losers get
/// a zero-delta audit entry, and every touched position is cleared. Must be
/// called only after `plan_market_cancel` has settled any still-open orders
/// for the market, so no reservation lingers against a cleared position.
pub fn plan_resolve(
    market_id: MarketId,
    winner: Outcome,
    positions: &[(PositionKey, Position)],
) -> Result<SettlementPlan, SettlementError> {
    let mut plan = SettlementPlan::new();

    for (key, position) in positions {
        if position.shares.is_zero() {
            continue;
        }

        let (_, _, outcome) = *key;
        let payout = Amount::from(position.shares);
        if outcome == winner {
            plan.ledger_deltas.push(
                LedgerDelta::new(key.0, payout, Amount::zero(), Reason::SettlementWin)
                    .with_reference(market_reference(market_id)),
            );
        } else {
            plan.ledger_deltas.push(
                LedgerDelta::new(key.0, Amount::zero(), Amount::zero(), Reason::SettlementLoss)
                    .with_reference(market_reference(market_id)),
            );
        }

        plan.position_ops.push(PositionOp::Clear { key: *key });
    }

    Ok(plan)
}
