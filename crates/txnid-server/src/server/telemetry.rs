//! # Telemetry
//!
//! Logging is always on: a `tracing_subscriber` registry with an
//! [`EnvFilter`] and a `fmt` layer. `RUST_LOG` takes precedence; otherwise
//! the level is `debug` with `--verbose` and `info` without it.
//!
//! ## Feature matrix
//!
//! - `metrics`: Enables OpenTelemetry counters for connections, issued IDs,
//!   stopped responses, rollovers and persistence failures.
//! - `stdout`: Exports those metrics to stdout every five seconds.
//!
//! ## Feature constraints
//!
//! - The `stdout` exporter requires `metrics`.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features metrics,stdout -- --verbose
//! ```
//!
//! The metric helpers below compile to no-ops when `metrics` is disabled,
//! so call sites never need their own `cfg`.

// Disallow using `stdout` without `metrics`
#[cfg(all(feature = "stdout", not(feature = "metrics")))]
compile_error!("The 'stdout' feature requires 'metrics' to be enabled.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Meter};
#[cfg(feature = "metrics")]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::Resource;
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

pub struct TelemetryProviders {
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down exporters. Errors are printed, not returned:
    /// by the time this runs the log subscriber may be the thing failing.
    pub fn shutdown(self) {
        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Default filter directive when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

pub fn init_telemetry(verbose: bool, json: bool) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // Exactly one of these is `Some`; `Option<Layer>` is itself a layer.
    let (pretty, json) = if json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_thread_ids(true)
                    .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                    .with_file(true)
                    .pretty(),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()?;

    #[cfg(feature = "metrics")]
    {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let scope = InstrumentationScope::builder("txnid")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
    }

    Ok(TelemetryProviders {
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(feature = "metrics")]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("txnid-server")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static CONNECTIONS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static IDS_ISSUED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STOPPED_RESPONSES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ROLLOVERS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static PERSIST_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = CONNECTIONS.set(
        meter
            .u64_counter("connections")
            .with_description("Accepted client connections")
            .build(),
    );

    let _ = IDS_ISSUED.set(
        meter
            .u64_counter("ids_issued")
            .with_description("Transaction IDs handed to clients")
            .build(),
    );

    let _ = STOPPED_RESPONSES.set(
        meter
            .u64_counter("stopped_responses")
            .with_description("Connections answered with -1 because issuance was stopped")
            .build(),
    );

    let _ = ROLLOVERS.set(
        meter
            .u64_counter("rollovers")
            .with_description("Counter range rollovers")
            .build(),
    );

    let _ = PERSIST_FAILURES.set(
        meter
            .u64_counter("persist_failures")
            .with_description("Failed progress file writes")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_connections() {
    if let Some(counter) = CONNECTIONS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_connections() {}

#[cfg(feature = "metrics")]
pub fn increment_ids_issued() {
    if let Some(counter) = IDS_ISSUED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_ids_issued() {}

#[cfg(feature = "metrics")]
pub fn increment_stopped_responses() {
    if let Some(counter) = STOPPED_RESPONSES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_stopped_responses() {}

#[cfg(feature = "metrics")]
pub fn increment_rollovers() {
    if let Some(counter) = ROLLOVERS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_rollovers() {}

#[cfg(feature = "metrics")]
pub fn increment_persist_failures() {
    if let Some(counter) = PERSIST_FAILURES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_persist_failures() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_lowers_default_level() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "debug");
    }
}
