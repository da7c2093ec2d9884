use decimal::{Price, Quantity};
use matching_engine::{Order, OrderBook, Side};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn main() {
    let mut ob = OrderBook::new();

    ob.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.50)).unwrap(), Quantity::new(dec!(50)).unwrap(), 1));

    let incoming = Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.50)).unwrap(), Quantity::new(dec!(100)).unwrap(), 2);
    let result = ob.add_order(incoming);

    let filled: Quantity = result
        .matches
        .iter()
        .fold(Quantity::zero(), |acc, m| acc.checked_add(m.quantity).unwrap());

    println!("Requested: 100 units");
    println!("Filled: {} units", filled);

    assert_eq!(filled, Quantity::new(dec!(50)).unwrap());
    assert_eq!(ob.quantity_at_price(Side::Sell, Price::new(dec!(0.50)).unwrap()), Quantity::zero());

    // The other 50 units rest on the book as the residual, waiting for a
    // matching sell at 0.50 or better.
    let residual = result.residual.expect("partially filled order rests");
    assert_eq!(residual.remaining, Quantity::new(dec!(50)).unwrap());
    assert_eq!(ob.best_bid(), Some(Price::new(dec!(0.50)).unwrap()));

    let mut ob2 = OrderBook::new();

    ob2.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.50)).unwrap(), Quantity::new(dec!(30)).unwrap(), 1));
    ob2.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.51)).unwrap(), Quantity::new(dec!(30)).unwrap(), 2));
    ob2.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.52)).unwrap(), Quantity::new(dec!(30)).unwrap(), 3));

    let sweep = Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.52)).unwrap(), Quantity::new(dec!(50)).unwrap(), 4);
    let result2 = ob2.add_order(sweep);

    println!("Multi-level fill:");
    for m in &result2.matches {
        println!("{} units @ {}", m.quantity, m.price);
    }
    assert_eq!(result2.matches.len(), 2);
    assert!(result2.residual.is_none());
}
