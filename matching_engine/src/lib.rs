//! Per-(market, outcome) limit order book with strict price-time priority.
//!
//! This is the deterministic, CPU-only core: no I/O, no randomness, no
//! wall-clock dependence. Ordering ties are broken by a `Sequence` the
//! caller assigns monotonically at admission, not by a timestamp.

use decimal::{Price, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

pub type OrderId = Uuid;
/// Monotonically increasing admission order, used to break price ties.
/// Assigned by the coordinator, not by this crate.
pub type Sequence = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Partial,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub remaining: Quantity,
    pub sequence: Sequence,
}

impl Order {
    pub fn new(id: OrderId, side: Side, price: Price, quantity: Quantity, sequence: Sequence) -> Self {
        Self {
            id,
            side,
            price,
            quantity,
            remaining: quantity,
            sequence,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    pub fn status(&self) -> OrderStatus {
        if self.is_filled() {
            OrderStatus::Filled
        } else if self.remaining == self.quantity {
            OrderStatus::Open
        } else {
            OrderStatus::Partial
        }
    }
}

#[derive(Debug, Clone)]
struct PriceLevel {
    orders: VecDeque<Order>,
    total_quantity: Quantity,
}

impl PriceLevel {
    fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_quantity: Quantity::zero(),
        }
    }

    fn add_order(&mut self, order: Order) {
        self.total_quantity = self
            .total_quantity
            .checked_add(order.remaining)
            .expect("price level quantity overflow");
        self.orders.push_back(order);
    }

    fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// A single execution between a taker and one resting maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub taker_order_id: OrderId,
    pub maker_order_id: OrderId,
    pub maker_side: Side,
    pub price: Price,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOrderResult {
    pub matches: Vec<Match>,
    pub residual: Option<Order>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Per-(market, outcome) order book. Bids are keyed so that iterating the
/// `BTreeMap` from the back yields highest price first; asks iterate
/// front-to-back for lowest price first. Each level is FIFO.
#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    index: HashMap<OrderId, (Side, Price)>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    /// `(bestBid + bestAsk) / 2` when both sides are non-empty; otherwise
    /// whichever side has a best price, or `None` if the book is empty.
    pub fn midpoint(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Price::midpoint(bid, ask).ok(),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => None,
        }
    }

    pub fn quantity_at_price(&self, side: Side, price: Price) -> Quantity {
        let book = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        book.get(&price).map_or(Quantity::zero(), |l| l.total_quantity)
    }

    /// Aggregate resting quantity by price, best price first on each side.
    pub fn snapshot(&self) -> BookSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .map(|(price, level)| Level {
                price: *price,
                quantity: level.total_quantity,
                order_count: level.orders.len(),
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .map(|(price, level)| Level {
                price: *price,
                quantity: level.total_quantity,
                order_count: level.orders.len(),
            })
            .collect();
        BookSnapshot { bids, asks }
    }

    /// Match `order` against the opposite side, then rest any leftover
    /// quantity on its own side. `order.remaining` must be > 0 on entry;
    /// zero-quantity orders are rejected upstream, by the coordinator.
    pub fn add_order(&mut self, mut order: Order) -> AddOrderResult {
        let matches = self.match_order(&mut order);

        let residual = if order.is_filled() {
            None
        } else {
            self.rest(order.clone());
            Some(order)
        };

        AddOrderResult { matches, residual }
    }

    pub fn cancel(&mut self, order_id: OrderId) -> Option<Order> {
        let (side, price) = self.index.remove(&order_id)?;
        let book = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };

        let level = book.get_mut(&price).expect("index points at a live level");
        let pos = level
            .orders
            .iter()
            .position(|o| o.id == order_id)
            .expect("index points at a resting order");
        let order = level.orders.remove(pos).expect("position just located");
        level.total_quantity = level
            .total_quantity
            .checked_sub(order.remaining)
            .expect("removing more than resting quantity");
        if level.is_empty() {
            book.remove(&price);
        }
        Some(order)
    }

    /// Drain every resting order from both sides, in no particular order.
    /// Used by market cancel and resolution.
    pub fn clear_all(&mut self) -> Vec<Order> {
        let mut drained = Vec::new();
        for (_, level) in self.bids.iter_mut() {
            drained.extend(level.orders.drain(..));
        }
        for (_, level) in self.asks.iter_mut() {
            drained.extend(level.orders.drain(..));
        }
        self.bids.clear();
        self.asks.clear();
        self.index.clear();
        drained
    }

    fn rest(&mut self, order: Order) {
        self.index.insert(order.id, (order.side, order.price));
        let book = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        book.entry(order.price).or_insert_with(PriceLevel::new).add_order(order);
    }

    fn match_order(&mut self, taker: &mut Order) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut emptied_prices = Vec::new();

        let opposite = match taker.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        // Bids sweep asks ascending (cheapest first); asks sweep bids
        // descending (richest first) — both are "best price first".
        let candidate_prices: Vec<Price> = match taker.side {
            Side::Buy => opposite.keys().copied().collect(),
            Side::Sell => opposite.keys().copied().rev().collect(),
        };

        for price in candidate_prices {
            if taker.is_filled() {
                break;
            }
            let crosses = match taker.side {
                Side::Buy => price <= taker.price,
                Side::Sell => price >= taker.price,
            };
            if !crosses {
                break;
            }

            let Some(level) = opposite.get_mut(&price) else {
                continue;
            };

            while !level.orders.is_empty() && !taker.is_filled() {
                let mut maker = level.orders.pop_front().expect("checked non-empty");
                let fill_qty = taker.remaining.min(maker.remaining);

                taker.remaining = taker
                    .remaining
                    .checked_sub(fill_qty)
                    .expect("fill exceeds taker remaining");
                maker.remaining = maker
                    .remaining
                    .checked_sub(fill_qty)
                    .expect("fill exceeds maker remaining");
                level.total_quantity = level
                    .total_quantity
                    .checked_sub(fill_qty)
                    .expect("fill exceeds level total");

                matches.push(Match {
                    taker_order_id: taker.id,
                    maker_order_id: maker.id,
                    maker_side: maker.side,
                    price,
                    quantity: fill_qty,
                });

                if maker.is_filled() {
                    self.index.remove(&maker.id);
                } else {
                    level.orders.push_front(maker);
                }
            }

            if level.is_empty() {
                emptied_prices.push(price);
            }
        }

        for price in emptied_prices {
            opposite.remove(&price);
        }

        matches
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(d: rust_decimal::Decimal) -> Price {
        Price::new(d).unwrap()
    }

    fn qty(d: rust_decimal::Decimal) -> Quantity {
        Quantity::new(d).unwrap()
    }

    fn order(side: Side, p: rust_decimal::Decimal, q: rust_decimal::Decimal, seq: u64) -> Order {
        Order::new(Uuid::new_v4(), side, price(p), qty(q), seq)
    }

    #[test]
    fn test_empty_book_has_no_best_prices() {
        let ob = OrderBook::new();
        assert_eq!(ob.best_bid(), None);
        assert_eq!(ob.best_ask(), None);
        assert_eq!(ob.midpoint(), None);
    }

    #[test]
    fn test_resting_order_has_no_matches() {
        let mut ob = OrderBook::new();
        let result = ob.add_order(order(Side::Buy, dec!(0.50), dec!(10), 1));
        assert!(result.matches.is_empty());
        assert!(result.residual.is_some());
        assert_eq!(ob.best_bid(), Some(price(dec!(0.50))));
    }

    #[test]
    fn test_simple_cross_executes_at_maker_price() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Sell, dec!(0.55), dec!(50), 1));
        let result = ob.add_order(order(Side::Buy, dec!(0.60), dec!(50), 2));

        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].price, price(dec!(0.55)));
        assert_eq!(result.matches[0].quantity, qty(dec!(50)));
        assert!(result.residual.is_none());
        assert_eq!(ob.best_bid(), None);
        assert_eq!(ob.best_ask(), None);
    }

    #[test]
    fn test_partial_fill_leaves_residual() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Sell, dec!(0.55), dec!(40), 1));
        let result = ob.add_order(order(Side::Buy, dec!(0.60), dec!(100), 2));

        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].quantity, qty(dec!(40)));
        let residual = result.residual.expect("residual expected");
        assert_eq!(residual.remaining, qty(dec!(60)));
        assert_eq!(residual.status(), OrderStatus::Partial);
    }

    #[test]
    fn test_multi_level_sweep_in_price_then_time_order() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Sell, dec!(0.50), dec!(30), 1)); // S1
        ob.add_order(order(Side::Sell, dec!(0.50), dec!(30), 2)); // S2, later
        ob.add_order(order(Side::Sell, dec!(0.60), dec!(50), 3)); // S3

        let result = ob.add_order(order(Side::Buy, dec!(0.60), dec!(100), 4));

        assert_eq!(result.matches.len(), 3);
        assert_eq!(result.matches[0].price, price(dec!(0.50)));
        assert_eq!(result.matches[0].quantity, qty(dec!(30)));
        assert_eq!(result.matches[1].price, price(dec!(0.50)));
        assert_eq!(result.matches[1].quantity, qty(dec!(30)));
        assert_eq!(result.matches[2].price, price(dec!(0.60)));
        assert_eq!(result.matches[2].quantity, qty(dec!(40)));

        let residual = result.residual.expect("residual expected");
        assert_eq!(residual.remaining, qty(dec!(10)));
        assert_eq!(residual.price, price(dec!(0.60)));
    }

    #[test]
    fn test_time_priority_within_same_price_level() {
        let mut ob = OrderBook::new();
        let first = order(Side::Sell, dec!(0.50), dec!(5), 1);
        let first_id = first.id;
        ob.add_order(first);
        let second = order(Side::Sell, dec!(0.50), dec!(5), 2);
        let second_id = second.id;
        ob.add_order(second);

        let result = ob.add_order(order(Side::Buy, dec!(0.50), dec!(5), 3));
        assert_eq!(result.matches[0].maker_order_id, first_id);

        let result = ob.add_order(order(Side::Buy, dec!(0.50), dec!(5), 4));
        assert_eq!(result.matches[0].maker_order_id, second_id);
    }

    #[test]
    fn test_no_match_when_prices_do_not_cross() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Sell, dec!(0.70), dec!(10), 1));
        let result = ob.add_order(order(Side::Buy, dec!(0.60), dec!(10), 2));

        assert!(result.matches.is_empty());
        assert_eq!(ob.best_bid(), Some(price(dec!(0.60))));
        assert_eq!(ob.best_ask(), Some(price(dec!(0.70))));
    }

    #[test]
    fn test_price_exactly_at_best_opposite_level_crosses_fully() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Sell, dec!(0.60), dec!(10), 1));
        let result = ob.add_order(order(Side::Buy, dec!(0.60), dec!(10), 2));
        assert_eq!(result.matches.len(), 1);
        assert!(result.residual.is_none());
    }

    #[test]
    fn test_cancel_removes_resting_order() {
        let mut ob = OrderBook::new();
        let resting = order(Side::Buy, dec!(0.40), dec!(20), 1);
        let id = resting.id;
        ob.add_order(resting);
        assert_eq!(ob.best_bid(), Some(price(dec!(0.40))));

        let cancelled = ob.cancel(id);
        assert!(cancelled.is_some());
        assert_eq!(ob.best_bid(), None);
        assert!(ob.cancel(id).is_none());
    }

    #[test]
    fn test_cancel_nonexistent_order_returns_none() {
        let mut ob = OrderBook::new();
        assert!(ob.cancel(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_self_trade_permitted() {
        // The book has no notion of user identity, so same-user orders on
        // opposite sides cross like any other pair; self-trade policy is a
        // coordinator-level concern, not the book's.
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Sell, dec!(0.50), dec!(10), 1));
        let result = ob.add_order(order(Side::Buy, dec!(0.50), dec!(10), 2));
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn test_midpoint_uses_both_sides_when_present() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Buy, dec!(0.40), dec!(10), 1));
        ob.add_order(order(Side::Sell, dec!(0.60), dec!(10), 2));
        assert_eq!(ob.midpoint(), Some(price(dec!(0.50))));
    }

    #[test]
    fn test_midpoint_falls_back_to_single_side() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Buy, dec!(0.40), dec!(10), 1));
        assert_eq!(ob.midpoint(), Some(price(dec!(0.40))));
    }

    #[test]
    fn test_clear_all_drains_both_sides() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Buy, dec!(0.40), dec!(10), 1));
        ob.add_order(order(Side::Sell, dec!(0.60), dec!(10), 2));

        let drained = ob.clear_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(ob.best_bid(), None);
        assert_eq!(ob.best_ask(), None);
    }

    #[test]
    fn test_bids_sorted_price_desc_time_asc_after_mutations() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Buy, dec!(0.40), dec!(10), 1));
        ob.add_order(order(Side::Buy, dec!(0.45), dec!(10), 2));
        ob.add_order(order(Side::Buy, dec!(0.42), dec!(10), 3));

        assert_eq!(ob.best_bid(), Some(price(dec!(0.45))));
        let snapshot = ob.snapshot();
        let prices: Vec<_> = snapshot.bids.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![price(dec!(0.45)), price(dec!(0.42)), price(dec!(0.40))]);
    }

    #[test]
    fn test_asks_sorted_price_asc_time_asc_after_mutations() {
        let mut ob = OrderBook::new();
        ob.add_order(order(Side::Sell, dec!(0.60), dec!(10), 1));
        ob.add_order(order(Side::Sell, dec!(0.55), dec!(10), 2));
        ob.add_order(order(Side::Sell, dec!(0.58), dec!(10), 3));

        assert_eq!(ob.best_ask(), Some(price(dec!(0.55))));
        let snapshot = ob.snapshot();
        let prices: Vec<_> = snapshot.asks.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![price(dec!(0.55)), price(dec!(0.58)), price(dec!(0.60))]);
    }

    #[test]
    fn test_cancel_partially_filled_order_removes_remainder() {
        let mut ob = OrderBook::new();
        let resting = order(Side::Buy, dec!(0.50), dec!(20), 1);
        let id = resting.id;
        ob.add_order(resting);
        ob.add_order(order(Side::Sell, dec!(0.50), dec!(5), 2));

        assert_eq!(ob.quantity_at_price(Side::Buy, price(dec!(0.50))), qty(dec!(15)));
        assert!(ob.cancel(id).is_some());
        assert_eq!(ob.best_bid(), None);
    }

    #[test]
    fn test_deterministic_given_same_input_sequence() {
        let build = || {
            let mut ob = OrderBook::new();
            ob.add_order(Order::new(Uuid::nil(), Side::Sell, price(dec!(0.50)), qty(dec!(10)), 1));
            ob.add_order(Order::new(Uuid::nil(), Side::Sell, price(dec!(0.52)), qty(dec!(10)), 2));
            ob.add_order(Order::new(Uuid::nil(), Side::Buy, price(dec!(0.52)), qty(dec!(15)), 3))
        };

        let a = build();
        let b = build();
        assert_eq!(a.matches, b.matches);
        assert_eq!(a.residual, b.residual);
    }
}
