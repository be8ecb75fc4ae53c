use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use uuid::Uuid;

use vend_eng::dispensary::Location;
use vend_eng::inventory::InventoryRecord;
use vend_eng::{Amount, Engine, LineRequest, OrderStatus, PaymentMethod, Principal, Role};

/// A seeded storefront for benchmarking.
///
/// One dispensary, `num_products` products at 5.0 each with effectively
/// unlimited stock, and `num_buyers` wallets funded far beyond what a run
/// can spend, so no order fails and every iteration does the same work.
struct Storefront {
    engine: Engine,
    operator: Principal,
    dispensary: Uuid,
    products: Vec<Uuid>,
    buyers: Vec<Principal>,
}

impl Storefront {
    fn new(num_products: usize, num_buyers: usize) -> Self {
        let engine = Engine::new();
        let operator = Principal::new(Uuid::new_v4(), Role::Admin);
        let dispensary = engine
            .register_dispensary(
                operator,
                "Bench Hall",
                Location {
                    building: "Bench Hall".to_string(),
                    floor: 0,
                    room: None,
                },
                num_products as u32,
            )
            .unwrap()
            .id;

        let products: Vec<Uuid> = (0..num_products).map(|_| Uuid::new_v4()).collect();
        for (index, product) in products.iter().enumerate() {
            let slot = engine.dispensaries().get(dispensary).unwrap().slots[index]
                .id
                .clone();
            engine
                .put_inventory(
                    operator,
                    InventoryRecord::new(
                        *product,
                        dispensary,
                        slot.clone(),
                        u32::MAX / 2,
                        Amount::from_float(3.0),
                        Amount::from_float(5.0),
                    ),
                )
                .unwrap();
            engine
                .fill_slot(operator, dispensary, &slot, *product, u32::MAX / 2)
                .unwrap();
        }

        let buyers: Vec<Principal> = (0..num_buyers)
            .map(|_| Principal::new(Uuid::new_v4(), Role::Student))
            .collect();
        for buyer in &buyers {
            engine
                .recharge_wallet(
                    *buyer,
                    buyer.user,
                    Amount::from_float(100_000_000.0),
                    PaymentMethod::Admin,
                )
                .unwrap();
        }

        Self {
            engine,
            operator,
            dispensary,
            products,
            buyers,
        }
    }

    fn place_order(&self, step: usize) -> vend_eng::Order {
        let buyer = self.buyers[step % self.buyers.len()];
        let product = self.products[step % self.products.len()];
        self.engine
            .create_order(
                buyer,
                self.dispensary,
                &[LineRequest::new(product, 1)],
                PaymentMethod::Wallet,
                None,
            )
            .unwrap()
    }
}

fn bench_create_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_order");

    for count in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let store = Storefront::new(10, 100);
                for step in 0..count {
                    black_box(store.place_order(step));
                }
                store.engine
            });
        });
    }

    group.finish();
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");

    // create -> dispense -> complete, 1000 orders per iteration
    group.bench_function("1000_orders", |b| {
        b.iter(|| {
            let store = Storefront::new(10, 100);
            for step in 0..1_000 {
                let order = store.place_order(step);
                let slot = order.lines[0].slot.clone();
                store
                    .engine
                    .dispense(store.dispensary, order.id, &slot, store.operator)
                    .unwrap();
                store
                    .engine
                    .update_status(order.id, OrderStatus::Completed, store.operator)
                    .unwrap();
                black_box(order.id);
            }
            store.engine
        });
    });

    group.finish();
}

fn bench_create_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_cancel");

    // The refund/restore round trip, 1000 per iteration
    group.bench_function("1000_orders", |b| {
        b.iter(|| {
            let store = Storefront::new(10, 100);
            for step in 0..1_000 {
                let order = store.place_order(step);
                let buyer = store.buyers[step % store.buyers.len()];
                store.engine.cancel_order(order.id, buyer).unwrap();
                black_box(order.id);
            }
            store.engine
        });
    });

    group.finish();
}

fn bench_concurrent_orders(c: &mut Criterion) {
    use std::sync::Arc;
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.sample_size(10);

    // 8 threads, 500 orders each, distinct buyers per thread
    group.bench_function("8x500", |b| {
        b.iter(|| {
            let store = Arc::new(Storefront::new(10, 8));
            let handles: Vec<_> = (0..8usize)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for step in 0..500 {
                            black_box(store.place_order(t * 500 + step));
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            store
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_create_order,
    bench_full_lifecycle,
    bench_create_cancel,
    bench_concurrent_orders,
);

criterion_main!(benches);
