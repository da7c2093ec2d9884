use decimal::{Price, Quantity};
use matching_engine::{Order, OrderBook, Side};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn main() {
    let mut ob = OrderBook::new();

    ob.add_order(Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.99)).unwrap(), Quantity::new(dec!(100)).unwrap(), 1));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.98)).unwrap(), Quantity::new(dec!(150)).unwrap(), 2));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.97)).unwrap(), Quantity::new(dec!(200)).unwrap(), 3));

    let incoming = Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.98)).unwrap(), Quantity::new(dec!(250)).unwrap(), 4);
    let result = ob.add_order(incoming);

    let total_filled: Quantity = result
        .matches
        .iter()
        .fold(Quantity::zero(), |acc, m| acc.checked_add(m.quantity).unwrap());

    println!("Incoming order matched {} units across {} maker orders", total_filled, result.matches.len());
    for m in &result.matches {
        println!("{} units @ {}", m.quantity, m.price);
    }

    println!("Best bid: {:?}", ob.best_bid());

    // The incoming sell rests at 0.98, never 0.97 — matches always clear at
    // the resting maker's price, so the best two bids (0.99, 0.98) are taken
    // in full before touching the 0.97 level.
    assert_eq!(result.matches.len(), 2);
    assert_eq!(total_filled, Quantity::new(dec!(250)).unwrap());
    assert_eq!(ob.best_bid(), Some(Price::new(dec!(0.97)).unwrap()));
}
