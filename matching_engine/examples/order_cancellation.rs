use decimal::{Price, Quantity};
use matching_engine::{Order, OrderBook, Side};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn main() {
    let mut ob = OrderBook::new();

    let order_id = Uuid::new_v4();
    ob.add_order(Order::new(order_id, Side::Buy, Price::new(dec!(0.50)).unwrap(), Quantity::new(dec!(50)).unwrap(), 1));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Buy, Price::new(dec!(0.49)).unwrap(), Quantity::new(dec!(75)).unwrap(), 2));
    ob.add_order(Order::new(Uuid::new_v4(), Side::Sell, Price::new(dec!(0.51)).unwrap(), Quantity::new(dec!(60)).unwrap(), 3));

    println!("Best bid: {:?}", ob.best_bid());
    println!("Best ask: {:?}", ob.best_ask());

    let cancelled = ob.cancel(order_id);
    println!("Cancelled order {}: {}", order_id, cancelled.is_some());

    println!("Best bid after cancellation: {:?}", ob.best_bid());

    assert!(cancelled.is_some());
    assert_eq!(ob.best_bid(), Some(Price::new(dec!(0.49)).unwrap()));

    let non_existent_id = Uuid::new_v4();
    let failed = ob.cancel(non_existent_id);
    println!("Cancelled non-existent order {}: {}", non_existent_id, failed.is_some());

    assert!(failed.is_none());
}
