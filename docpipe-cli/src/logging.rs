//! Subscriber setup for the CLI.
//!
//! `RUST_LOG` selects the filter (default `info`). Records emitted through
//! the `log` facade, such as those from the database layer, are bridged into
//! tracing by `LogTracer`. Output goes to stderr so stdout stays parseable.

use anyhow::Context;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

pub fn init(json: bool) -> anyhow::Result<()> {
    LogTracer::init().context("Failed to install log bridge")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        let subscriber = Registry::default().with(filter).with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        );
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to install tracing subscriber")?;
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to install tracing subscriber")?;
    }

    Ok(())
}
