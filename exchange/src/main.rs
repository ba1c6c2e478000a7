//! fxledger command line.
//!
//! Thin wrapper over the exchange library: each subcommand builds one
//! [`ExchangeContext`] from the environment and runs a single operation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxledger_common::{ConversionRequest, JobId, UserId};
use fxledger_exchange::{
    ChannelDispatcher, ExchangeConfig, ExchangeContext, JobConsumer, JobIntake, NoopDispatcher,
    SyncExchange,
};
use fxledger_ledger::PgLedgerStore;

#[derive(Parser)]
#[command(name = "fxledger", version, about = "Transactional currency conversion ledger")]
struct Cli {
    /// Write counters in Prometheus text format to this file on exit.
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct RequestArgs {
    /// Requesting user.
    #[arg(long)]
    user: String,
    /// Source currency code.
    #[arg(long)]
    from: String,
    /// Target currency code.
    #[arg(long)]
    to: String,
    /// Amount in the source currency.
    #[arg(long)]
    amount: Decimal,
}

impl RequestArgs {
    fn into_request(self) -> ConversionRequest {
        ConversionRequest::new(self.user, self.from, self.to, self.amount)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Apply ledger schema migrations.
    Migrate,
    /// Queue a conversion job.
    Submit {
        #[command(flatten)]
        request: RequestArgs,
        /// Idempotency key deduplicating retries of this submit.
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Convert immediately and print the terminal result.
    Exchange {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Consume newline-delimited job messages from stdin as one batch.
    Consume,
    /// Submit newline-delimited requests from stdin and process them in-process.
    Worker,
    /// Show a user's balances.
    Balances {
        #[arg(long)]
        user: String,
    },
    /// Show a job.
    Job { job_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ExchangeConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let ctx = Arc::new(ExchangeContext::from_config(&config, Arc::new(NoopDispatcher))?);

    match cli.command {
        Command::Migrate => {
            ctx.store().migrate().await.context("running migrations")?;
            info!("Migrations applied");
        }
        Command::Submit {
            request,
            idempotency_key,
        } => {
            let mut request = request.into_request();
            if let Some(key) = idempotency_key {
                request = request.with_idempotency_key(key);
            }
            let receipt = JobIntake::new(ctx.clone()).submit(&request).await?;
            print_json(&receipt)?;
        }
        Command::Exchange { request } => {
            let result = SyncExchange::new(ctx.clone())
                .exchange(&request.into_request())
                .await?;
            print_json(&result)?;
        }
        Command::Consume => {
            let messages = read_stdin_lines().await?;
            let report = JobConsumer::new(ctx.clone()).consume_batch(&messages).await;
            print_json(&report)?;
        }
        Command::Worker => run_worker(&ctx, &config).await?,
        Command::Balances { user } => {
            let accounts = ctx.balances(&UserId::new(user)).await?;
            print_json(&accounts)?;
        }
        Command::Job { job_id } => {
            let job_id = JobId::parse(&job_id).context("job id must be a UUID")?;
            print_json(&ctx.job(job_id).await?)?;
        }
    }

    if let Some(path) = &cli.metrics_file {
        tokio::fs::write(path, ctx.metrics().to_prometheus())
            .await
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }

    Ok(())
}

/// Submit stdin requests through a channel-backed intake while a consumer
/// drains the channel. Ends once stdin is exhausted and the channel is empty.
async fn run_worker(ctx: &Arc<ExchangeContext<PgLedgerStore>>, config: &ExchangeConfig) -> anyhow::Result<()> {
    let (dispatcher, receiver) = ChannelDispatcher::new(config.dispatch_capacity);
    let intake_ctx = Arc::new(ctx.with_dispatcher(Arc::new(dispatcher)));

    let consumer = JobConsumer::new(ctx.clone());
    let batch_size = config.dispatch_batch_size;
    let consumer_task = tokio::spawn(async move { consumer.run(receiver, batch_size).await });

    let intake = JobIntake::new(intake_ctx);
    for line in read_stdin_lines().await? {
        let request: ConversionRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Skipping malformed request line");
                continue;
            }
        };

        match intake.submit(&request).await {
            Ok(receipt) => print_json(&receipt)?,
            Err(e) => warn!(error = %e, code = e.error_code(), "Submit rejected"),
        }
    }
    drop(intake);

    let report = consumer_task.await.context("consumer task panicked")?;
    print_json(&report)?;
    info!(metrics = ?ctx.metrics().snapshot(), "Worker finished");

    Ok(())
}

async fn read_stdin_lines() -> anyhow::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = Vec::new();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if !line.trim().is_empty() {
            out.push(line);
        }
    }

    Ok(out)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
