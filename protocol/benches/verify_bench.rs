// Offline verification benchmarks.
//
// Verification tries every cached secret until one matches, so its cost is
// linear in cache size. These benches measure that line: token minting,
// worst-case verify (token for the last cached order), and a miss.

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use offcoin_protocol::agent::CacheSnapshot;
use offcoin_protocol::clock::ManualClock;
use offcoin_protocol::crypto::mint_secret;
use offcoin_protocol::order::{Coin, CoinStatus, DeliveryStatus, Order, PaymentMode};
use offcoin_protocol::token::{mint_token, verify_against};

fn order(i: usize) -> (Order, Coin) {
    let order = Order {
        order_id: format!("ORD-{:06}", i),
        value: 500,
        delivery_date: Utc::now(),
        payment_mode: PaymentMode::Offline,
        delivery_status: DeliveryStatus::Pending,
        user_id: format!("U-{:06}", i),
        assigned_agent_id: Some("A-1".to_string()),
        secret: Some(mint_secret().expect("os rng")),
        lines: Vec::new(),
        created_at: Utc::now(),
    };
    let coin = Coin {
        coin_id: format!("CN-{:06}", i),
        value: 500,
        user_id: order.user_id.clone(),
        order_id: order.order_id.clone(),
        status: CoinStatus::Active,
        created_at: Utc::now(),
    };
    (order, coin)
}

fn token_for(order: &Order, coin: &Coin) -> String {
    let secret = order.secret.as_ref().expect("offline order");
    mint_token(order, coin, secret, &ManualClock::at_unix(1_700_000_000))
        .expect("mint")
        .into_string()
}

fn bench_mint(c: &mut Criterion) {
    let (order, coin) = order(0);
    let secret = order.secret.clone().expect("offline order");
    let clock = ManualClock::at_unix(1_700_000_000);

    c.bench_function("token/mint", |b| {
        b.iter(|| mint_token(&order, &coin, &secret, &clock).unwrap());
    });
}

fn bench_verify_by_cache_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("token/verify_worst_case");

    for size in [1, 10, 100, 1_000] {
        let pairs: Vec<(Order, Coin)> = (0..size).map(order).collect();
        let (last_order, last_coin) = pairs.last().expect("non-empty");
        let token = token_for(last_order, last_coin);
        let snapshot =
            CacheSnapshot::new(pairs.into_iter().map(|(o, _)| o).collect(), Utc::now());

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &snapshot, |b, snap| {
            b.iter(|| verify_against(&token, snap).unwrap());
        });
    }

    group.finish();
}

fn bench_verify_miss(c: &mut Criterion) {
    let (stranger, stranger_coin) = order(999_999);
    let token = token_for(&stranger, &stranger_coin);
    let snapshot = CacheSnapshot::new((0..100).map(|i| order(i).0).collect(), Utc::now());

    c.bench_function("token/verify_miss_100", |b| {
        b.iter(|| verify_against(&token, &snapshot).unwrap_err());
    });
}

criterion_group!(benches, bench_mint, bench_verify_by_cache_size, bench_verify_miss);
criterion_main!(benches);
