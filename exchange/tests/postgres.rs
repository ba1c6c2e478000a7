//! Conversions racing on a real PostgreSQL ledger.
//!
//! Require a reachable database; run with
//! `DATABASE_URL=postgres://... cargo test -p fxledger-exchange -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use fxledger_common::{ConversionRequest, Currency, JobId, JobStatus, UserId};
use fxledger_exchange::{EngineOutcome, ExchangeContext, JobConsumer, JobIntake, NoopDispatcher};
use fxledger_fx::MockRateOracle;
use fxledger_ledger::postgres::PgStoreConfig;
use fxledger_ledger::{LedgerStore, LedgerTx, PgLedgerStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

type Ctx = Arc<ExchangeContext<PgLedgerStore>>;

async fn context() -> (Ctx, PgLedgerStore) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgLedgerStore::connect_lazy(&PgStoreConfig {
        database_url,
        max_connections: 8,
        statement_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    })
    .unwrap();
    store.migrate().await.unwrap();

    let oracle = MockRateOracle::new();
    oracle.set_rate("USD", "EUR", dec!(0.90), 30);
    oracle.set_rate("EUR", "USD", dec!(1.16), 30);

    let ctx = Arc::new(ExchangeContext::new(
        Arc::new(store.clone()),
        Arc::new(oracle),
        Arc::new(NoopDispatcher),
        Duration::from_secs(10),
    ));
    (ctx, store)
}

fn unique_user() -> UserId {
    UserId::new(format!("user-{}", JobId::new()))
}

async fn seed(store: &PgLedgerStore, user: &UserId, currency: Currency, amount: Decimal) {
    let mut tx = store.begin().await.unwrap();
    let id = tx.ensure_account(user, &currency).await.unwrap();
    tx.lock_account_balance(id).await.unwrap();
    tx.adjust_balance(id, amount).await.unwrap();
    tx.commit().await.unwrap();
}

async fn submit_both(ctx: &Ctx, user: &UserId) -> (JobId, JobId) {
    let intake = JobIntake::new(ctx.clone());
    let forward = intake
        .submit(&ConversionRequest::new(user.as_str(), "USD", "EUR", dec!(10)))
        .await
        .unwrap();
    let backward = intake
        .submit(&ConversionRequest::new(user.as_str(), "EUR", "USD", dec!(10)))
        .await
        .unwrap();
    (forward.job_id, backward.job_id)
}

async fn balance(store: &PgLedgerStore, user: &UserId, currency: Currency) -> Decimal {
    store
        .balances(user)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.currency == currency)
        .map(|a| a.balance)
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_opposite_directions_complete_concurrently() {
    let (ctx, store) = context().await;

    for _ in 0..5 {
        let user = unique_user();
        seed(&store, &user, Currency::usd(), dec!(100)).await;
        seed(&store, &user, Currency::eur(), dec!(100)).await;

        let (forward, backward) = submit_both(&ctx, &user).await;
        let consumer = Arc::new(JobConsumer::new(ctx.clone()));

        let c1 = consumer.clone();
        let c2 = consumer.clone();
        let h1 = tokio::spawn(async move { c1.process(forward).await });
        let h2 = tokio::spawn(async move { c2.process(backward).await });

        assert!(matches!(h1.await.unwrap().unwrap(), EngineOutcome::Completed(_)));
        assert!(matches!(h2.await.unwrap().unwrap(), EngineOutcome::Completed(_)));

        assert_eq!(balance(&store, &user, Currency::usd()).await, dec!(101.5652));
        assert_eq!(balance(&store, &user, Currency::eur()).await, dec!(98.973));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_opposite_directions_on_first_use_do_not_deadlock() {
    let (ctx, store) = context().await;

    for _ in 0..5 {
        let user = unique_user();
        let (forward, backward) = submit_both(&ctx, &user).await;
        let consumer = Arc::new(JobConsumer::new(ctx.clone()));

        let c1 = consumer.clone();
        let c2 = consumer.clone();
        let h1 = tokio::spawn(async move { c1.process(forward).await });
        let h2 = tokio::spawn(async move { c2.process(backward).await });

        assert!(matches!(h1.await.unwrap().unwrap(), EngineOutcome::Failed(_)));
        assert!(matches!(h2.await.unwrap().unwrap(), EngineOutcome::Failed(_)));

        for job_id in [forward, backward] {
            let job = store.get_job(job_id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Failed);
        }
        assert_eq!(store.balances(&user).await.unwrap().len(), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_racing_debits_never_overdraw() {
    let (ctx, store) = context().await;
    let user = unique_user();
    seed(&store, &user, Currency::usd(), dec!(100)).await;

    let intake = JobIntake::new(ctx.clone());
    let mut jobs = Vec::new();
    for _ in 0..2 {
        let receipt = intake
            .submit(&ConversionRequest::new(user.as_str(), "USD", "EUR", dec!(60)))
            .await
            .unwrap();
        jobs.push(receipt.job_id);
    }

    let consumer = Arc::new(JobConsumer::new(ctx.clone()));
    let handles: Vec<_> = jobs
        .iter()
        .map(|job_id| {
            let consumer = consumer.clone();
            let job_id = *job_id;
            tokio::spawn(async move { consumer.process(job_id).await })
        })
        .collect();

    let mut completed = 0;
    let mut failed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            EngineOutcome::Completed(_) => completed += 1,
            EngineOutcome::Failed(_) => failed += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!((completed, failed), (1, 1));
    assert_eq!(balance(&store, &user, Currency::usd()).await, dec!(40));
}
