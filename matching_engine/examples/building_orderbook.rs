use decimal::{Price, Quantity};
use matching_engine::{Order, OrderBook, Side};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn main() {
    let mut ob = OrderBook::new();

    ob.add_order(Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.99)).unwrap(), Quantity::new(dec!(100)).unwrap(), 1));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.98)).unwrap(), Quantity::new(dec!(150)).unwrap(), 2));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.97)).unwrap(), Quantity::new(dec!(200)).unwrap(), 3));

    ob.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.01)).unwrap(), Quantity::new(dec!(100)).unwrap(), 4));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.02)).unwrap(), Quantity::new(dec!(150)).unwrap(), 5));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.03)).unwrap(), Quantity::new(dec!(200)).unwrap(), 6));

    println!("Best bid: {:?}", ob.best_bid());
    println!("Best ask: {:?}", ob.best_ask());
    println!("Midpoint: {:?}", ob.midpoint());

    assert_eq!(ob.best_bid(), Some(Price::new(dec!(0.99)).unwrap()));
    assert_eq!(ob.best_ask(), Some(Price::new(dec!(0.01)).unwrap()));
}
