//! Scry demo server binary.
//!
//! Binds the loopback REPL with a small arithmetic evaluator so the
//! wire protocol can be exercised by hand:
//!
//! ```bash
//! # Start unauthenticated, then: nc 127.0.0.1 <port>
//! scry-server
//!
//! # Require a secret as the first line of each connection
//! scry-server --secret hunter2
//! ```

use std::sync::Arc;

use clap::Parser;
use scry_core::{EvalError, ReplConfig, Value};
use scry_server::Listener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Scry loopback REPL server
#[derive(Parser, Debug)]
#[command(name = "scry-server")]
#[command(about = "Loopback REPL for inspecting a running process")]
#[command(version)]
struct Args {
    /// Terminal window title
    #[arg(short, long, default_value = ReplConfig::DEFAULT_TITLE)]
    title: String,

    /// Pre-shared secret required as the first line of each connection
    #[arg(short, long)]
    secret: Option<String>,

    /// Value returned for blank input lines
    #[arg(short, long, default_value = "ready")]
    default_value: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Sums whitespace-separated integers; anything non-numeric is an
/// evaluation error. Enough to exercise both result and error paths.
fn demo_evaluate(line: &str) -> Result<Value, EvalError> {
    let mut sum: i64 = 0;
    for token in line.split_whitespace() {
        let n: i64 =
            token.parse().map_err(|_| EvalError::new(format!("not a number: {token}")))?;
        sum = sum.saturating_add(n);
    }

    Ok(Value::from(sum))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut config = ReplConfig::new(Arc::new(demo_evaluate))
        .with_title(args.title)
        .with_default_value(Value::from(args.default_value));
    if let Some(secret) = args.secret {
        config = config.with_secret(secret);
    }
    let authenticated = config.secret.is_some();

    let listener = Listener::bind(Arc::new(config)).await?;

    tracing::info!("REPL listening on 127.0.0.1:{}", listener.port());
    if authenticated {
        tracing::info!("send the secret as the first line to authenticate");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    listener.stop();

    Ok(())
}
