//! fxledger Exchange
//!
//! Conversion engine and the entry points that feed it: queued job intake,
//! the batch job consumer and the synchronous exchange path. All of them share
//! one explicitly constructed [`ExchangeContext`].

pub mod config;
pub mod consumer;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod exchange;
pub mod intake;
pub mod metrics;

pub use config::ExchangeConfig;
pub use consumer::{BatchReport, JobConsumer, JobError};
pub use context::{build_oracle, ExchangeContext};
pub use dispatch::{ChannelDispatcher, DispatchError, JobDispatcher, NoopDispatcher};
pub use engine::{ConversionEngine, EngineOutcome};
pub use exchange::{ExchangeResult, SyncExchange};
pub use intake::JobIntake;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
