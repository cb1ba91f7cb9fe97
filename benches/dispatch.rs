//! Performance benchmarks for a3s-bot
//!
//! Run with: cargo bench

use a3s_bot::{
    Bot, BotIdentity, CircuitBreaker, CronExpression, ExchangeTemplate, MemoryTransport,
    MessageEvent, MessageOutcome, Responder, SimpleStore, Step, Store,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn identity() -> BotIdentity {
    BotIdentity {
        id: "B1".to_string(),
        name: "bee".to_string(),
    }
}

fn bench_cron_parse(c: &mut Criterion) {
    c.bench_function("CronExpression::parse", |b| {
        b.iter(|| CronExpression::parse("*/15 9-17 * * 1-5").unwrap());
    });

    let expr = CronExpression::parse("30 14 * * 1").unwrap();
    let now = chrono::Utc::now();
    c.bench_function("CronExpression::next_after", |b| {
        b.iter(|| expr.next_after(now));
    });
}

fn bench_breaker(c: &mut Criterion) {
    let breaker = CircuitBreaker::new(u32::MAX, Duration::from_secs(3600));
    let now = Instant::now();
    c.bench_function("CircuitBreaker::check_at", |b| {
        b.iter(|| breaker.check_at(now));
    });
}

fn bench_store(c: &mut Criterion) {
    c.bench_function("SimpleStore put/get", |b| {
        b.iter(|| {
            let mut store: Box<dyn Store> = Box::new(SimpleStore::default());
            store.put("color", "blue").unwrap();
            store.get::<String>("color").unwrap()
        });
    });
}

fn bench_unaddressed_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("indirect_responders");
    for count in [1, 10, 50] {
        let mut builder = Bot::builder(Arc::new(MemoryTransport::new(identity())));
        for i in 0..count {
            builder = builder.indirect(
                Responder::new(&format!("keyword{}", i), "", |_bot, _ev| async {}).unwrap(),
            );
        }
        let bot = builder.build().unwrap();
        rt.block_on(bot.initialize()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &bot, |b, bot| {
            b.to_async(&rt).iter(|| async {
                bot.handle_message(MessageEvent::new("C1", "U1", "keyword0 in chatter", "1.0"))
                    .await
            });
        });
    }
    group.finish();
}

fn bench_exchange_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let template = ExchangeTemplate::new("^start", "")
        .unwrap()
        .then(Step::message_handler("wait", |_ex, _ev| {
            Box::pin(async { Ok(MessageOutcome::Advance) })
        }));
    let bot = Bot::builder(Arc::new(MemoryTransport::new(identity())))
        .exchange(template)
        .build()
        .unwrap();
    rt.block_on(bot.initialize()).unwrap();

    let mut seq = 0u64;
    c.bench_function("exchange start + continue", |b| {
        b.to_async(&rt).iter(|| {
            seq += 1;
            let ts = format!("{}.0", seq);
            let bot = bot.clone();
            async move {
                bot.handle_message(MessageEvent::new("D1", "U1", "start", ts.as_str()).direct())
                    .await;
                bot.handle_message(MessageEvent::new("D1", "U1", "ok", "x").in_thread(ts))
                    .await;
            }
        });
    });
}

criterion_group!(
    benches,
    bench_cron_parse,
    bench_breaker,
    bench_store,
    bench_unaddressed_dispatch,
    bench_exchange_round_trip,
);
criterion_main!(benches);
