//! Explicit per-process context shared by every operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fxledger_common::{ConversionJob, ExchangeError, JobId, Result, UserId};
use fxledger_fx::{
    HttpRateTransport, RateOracle, RateOracleClient, RateTransport, StaticOverride,
    StaticRateService,
};
use fxledger_ledger::{Account, LedgerStore, PgLedgerStore};
use tracing::{info, warn};

use crate::config::{ExchangeConfig, OracleConfig};
use crate::dispatch::JobDispatcher;
use crate::engine::ConversionEngine;
use crate::metrics::{Metrics, SharedMetrics};

/// Handles to the ledger store, the rate oracle and the dispatch path.
///
/// Built once per process and shared behind an `Arc`. The store pool
/// connects lazily on first use.
pub struct ExchangeContext<S: LedgerStore> {
    store: Arc<S>,
    engine: ConversionEngine,
    dispatcher: Arc<dyn JobDispatcher>,
    metrics: SharedMetrics,
    operation_timeout: Duration,
}

impl<S: LedgerStore> ExchangeContext<S> {
    /// Create a new context.
    pub fn new(
        store: Arc<S>,
        oracle: Arc<dyn RateOracle>,
        dispatcher: Arc<dyn JobDispatcher>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            engine: ConversionEngine::new(oracle),
            dispatcher,
            metrics: Arc::new(Metrics::new()),
            operation_timeout,
        }
    }

    /// Same store, oracle and metrics with a different dispatcher.
    pub fn with_dispatcher(&self, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            store: self.store.clone(),
            engine: self.engine.clone(),
            dispatcher,
            metrics: self.metrics.clone(),
            operation_timeout: self.operation_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &ConversionEngine {
        &self.engine
    }

    pub fn dispatcher(&self) -> &dyn JobDispatcher {
        self.dispatcher.as_ref()
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Run `operation` under the operation deadline.
    ///
    /// On expiry the future is dropped, which drops any open transaction and
    /// rolls it back.
    pub async fn with_deadline<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.timeout();
                warn!(
                    operation = operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Operation deadline exceeded"
                );
                Err(ExchangeError::Timeout(format!(
                    "{} exceeded {:?}",
                    operation, self.operation_timeout
                )))
            }
        }
    }

    /// Committed job state.
    pub async fn job(&self, job_id: JobId) -> Result<ConversionJob> {
        self.with_deadline("job lookup", async {
            self.store
                .get_job(job_id)
                .await?
                .ok_or(ExchangeError::JobNotFound(job_id))
        })
        .await
    }

    /// Committed balances of a user.
    pub async fn balances(&self, user_id: &UserId) -> Result<Vec<Account>> {
        self.with_deadline("balance lookup", async {
            Ok(self.store.balances(user_id).await?)
        })
        .await
    }
}

impl ExchangeContext<PgLedgerStore> {
    /// Build a context backed by PostgreSQL from configuration.
    pub fn from_config(config: &ExchangeConfig, dispatcher: Arc<dyn JobDispatcher>) -> Result<Self> {
        config.validate().map_err(ExchangeError::Configuration)?;

        let store = PgLedgerStore::connect_lazy(&config.store_config())?;
        let oracle = build_oracle(&config.oracle)?;

        Ok(Self::new(
            Arc::new(store),
            oracle,
            dispatcher,
            config.operation_timeout,
        ))
    }
}

/// Rate oracle client over HTTP when a URL is configured, otherwise over the
/// in-process static rate service.
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn RateOracle>> {
    let transport: Arc<dyn RateTransport> = match &config.url {
        Some(url) => {
            info!(url = %url, "Using HTTP rate oracle");
            Arc::new(HttpRateTransport::new(url.clone(), config.timeout)?)
        }
        None => {
            let mut service = StaticRateService::new();
            if let Some(rate) = config.static_rate {
                service = service.with_override(StaticOverride {
                    rate,
                    fee_bps: config.static_fee_bps,
                });
            }
            info!(override_rate = ?config.static_rate, "Using static rate service");
            Arc::new(service)
        }
    };

    Ok(Arc::new(RateOracleClient::new(transport)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NoopDispatcher;
    use fxledger_common::{Currency, CurrencyPair};
    use fxledger_fx::MockRateOracle;
    use fxledger_ledger::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout() {
        let ctx = ExchangeContext::new(
            Arc::new(MemoryLedgerStore::new()),
            Arc::new(MockRateOracle::new()),
            Arc::new(NoopDispatcher),
            Duration::from_millis(10),
        );

        let result: Result<()> = ctx
            .with_deadline("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ExchangeError::Timeout(_))));
        assert_eq!(ctx.metrics().snapshot().timeouts, 1);
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let ctx = ExchangeContext::new(
            Arc::new(MemoryLedgerStore::new()),
            Arc::new(MockRateOracle::new()),
            Arc::new(NoopDispatcher),
            Duration::from_secs(1),
        );

        let err = ctx.job(JobId::new()).await.unwrap_err();
        assert!(matches!(err, ExchangeError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_static_oracle_with_override() {
        let oracle = build_oracle(&OracleConfig {
            static_rate: Some(dec!(150)),
            ..Default::default()
        })
        .unwrap();

        let quote = oracle
            .lookup_rate(&CurrencyPair::new(Currency::usd(), Currency::new("JPY")))
            .await
            .unwrap();
        assert_eq!(quote.rate, dec!(150));
        assert_eq!(quote.fee_bps, 25);
    }
}
