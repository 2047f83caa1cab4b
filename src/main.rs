use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use throttling::config::ThrottlingConfig;
use throttling::{Decision, Limiter, Quota};

/// Issue admission checks against a configured limiter.
#[derive(Debug, Parser)]
#[command(name = "throttling", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log filter, e.g. "info" or "throttling=debug"
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a burst of checks against one key and print each decision
    Check {
        /// Key to check
        #[arg(short, long)]
        key: String,

        /// Number of checks to issue
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Checks in flight at once
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Override the configured rate
        #[arg(long)]
        rate: Option<u64>,

        /// Override the configured window in milliseconds
        #[arg(long)]
        window_ms: Option<u64>,

        /// Print decisions as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs)?;

    let config = ThrottlingConfig::load(cli.config.as_deref())?;
    info!(
        rate = config.limiter.rate,
        window_ms = config.limiter.window_ms,
        distributed = config.store.redis_url.is_some(),
        "Configuration loaded"
    );

    let limiter = Arc::new(Limiter::from_config(&config).await?);

    let outcome = match cli.command {
        Command::Check {
            key,
            count,
            concurrency,
            rate,
            window_ms,
            json,
        } => {
            let default = limiter.default_quota();
            let quota = Quota::new(
                rate.unwrap_or(default.rate()),
                window_ms.map(Duration::from_millis).unwrap_or(default.window()),
            )?;

            tokio::select! {
                result = run_checks(limiter.clone(), key, quota, count, concurrency.max(1), json) => result,
                _ = shutdown_signal() => Ok(()),
            }
        }
    };

    limiter.close().await?;
    outcome
}

/// Resolve on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping checks");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping checks");
        }
    }
}

fn init_tracing(filter: &str, json: bool) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter)?)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Issue `count` checks, `concurrency` at a time, printing each decision.
async fn run_checks(
    limiter: Arc<Limiter>,
    key: String,
    quota: Quota,
    count: usize,
    concurrency: usize,
    json: bool,
) -> anyhow::Result<()> {
    let mut allowed = 0usize;
    let mut failed = 0usize;
    let mut issued = 0usize;

    while issued < count {
        let batch = concurrency.min(count - issued);
        let checks = (0..batch).map(|_| {
            let limiter = limiter.clone();
            let key = key.clone();
            async move { limiter.allow_quota(&key, quota).await }
        });

        for result in futures::future::join_all(checks).await {
            issued += 1;
            match result {
                Ok(decision) => {
                    if decision.allowed {
                        allowed += 1;
                    }
                    print_decision(issued, &decision, json)?;
                }
                Err(e) if e.is_store_failure() => {
                    failed += 1;
                    warn!(error = %e, "Store unavailable, no decision");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    info!(
        issued = issued,
        allowed = allowed,
        denied = issued - allowed - failed,
        failed = failed,
        "Checks complete"
    );
    Ok(())
}

fn print_decision(seq: usize, decision: &Decision, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(decision)?);
    } else if decision.allowed {
        println!("#{:<5} allowed  remaining={}", seq, decision.remaining);
    } else {
        println!(
            "#{:<5} denied   retry_after={}ms",
            seq,
            decision.retry_after.as_millis()
        );
    }
    Ok(())
}
