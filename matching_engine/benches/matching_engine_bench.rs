use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use decimal::{Price, Quantity};
use matching_engine::{Order, OrderBook, Side};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

fn price(d: i64) -> Price {
    Price::new(Decimal::new(d, 4)).unwrap() // d / 10_000, keeps values in (0, 1)
}

fn qty(d: i64) -> Quantity {
    Quantity::new(Decimal::from(d)).unwrap()
}

// Simulates realistic order-placement traffic: mostly resting limit orders,
// with a slice cancelled immediately, as a real gateway would see.
fn simulate_exchange_orders(ob: &mut OrderBook, order_count: usize) {
    let base_price = 5_000i64; // 0.5000
    let mut order_ids = Vec::new();

    for i in 0..order_count {
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        let price_offset = (i % 10) as i64 - 5;
        let order = Order::new(
            Uuid::new_v4(),
            side,
            price(base_price + price_offset),
            qty(((i % 5) + 1) as i64),
            i as u64,
        );
        let result = ob.add_order(order);
        if let Some(residual) = result.residual {
            order_ids.push(residual.id);
        }

        if i % 10 == 0 && !order_ids.is_empty() {
            let cancel_idx = i % order_ids.len();
            ob.cancel(order_ids[cancel_idx]);
        }
    }
}

fn bench_mixed_order_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("exchange_simulation");

    for order_count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*order_count as u64));

        group.bench_with_input(format!("{}_orders", order_count), order_count, |b, &count| {
            b.iter(|| {
                let mut ob = OrderBook::new();
                simulate_exchange_orders(black_box(&mut ob), black_box(count));
            });
        });
    }

    group.finish();
}

fn bench_limit_order_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("limit_orders");

    group.bench_function("place_resting_order", |b| {
        let mut ob = OrderBook::new();
        let mut seq = 0u64;

        b.iter(|| {
            seq += 1;
            let order = Order::new(Uuid::new_v4(), Side::Buy, price(5_000), qty(1), seq);
            ob.add_order(black_box(order));
        });
    });

    group.finish();
}

fn bench_deep_book_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_book");

    group.bench_function("match_across_levels", |b| {
        b.iter_batched(
            || {
                let mut ob = OrderBook::new();
                for i in 0..100 {
                    let order = Order::new(Uuid::new_v4(), Side::Sell, price(5_000 + i), qty(100), i as u64);
                    ob.add_order(order);
                }
                ob
            },
            |mut ob| {
                let sweeper = Order::new(Uuid::new_v4(), Side::Buy, price(5_099), qty(5_000), 1_000);
                ob.add_order(black_box(sweeper));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_high_frequency_placement_and_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("high_frequency");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("hft_simulation", |b| {
        b.iter(|| {
            let mut ob = OrderBook::new();

            for i in 0..1000u64 {
                let price_offset = (i % 10) as i64 - 5;
                let order = Order::new(Uuid::new_v4(), Side::Buy, price(5_000 + price_offset), qty(1), i);
                let result = ob.add_order(order);

                if i % 3 == 0 {
                    if let Some(residual) = result.residual {
                        ob.cancel(residual.id);
                    }
                }
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_mixed_order_throughput,
    bench_limit_order_placement,
    bench_deep_book_sweep,
    bench_high_frequency_placement_and_cancel
);

criterion_main!(benches);
