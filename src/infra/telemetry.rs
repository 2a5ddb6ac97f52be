use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            "orderloom_mutations_pending",
            Unit::Count,
            "Current number of tracked writes in flight."
        );
        describe_counter!(
            "orderloom_mutation_failed_total",
            Unit::Count,
            "Total number of writes that failed, labelled by transport error kind."
        );
        describe_counter!(
            "orderloom_cache_invalidate_total",
            Unit::Count,
            "Total number of successful cache invalidations."
        );
        describe_counter!(
            "orderloom_cache_invalidate_failed_total",
            Unit::Count,
            "Total number of cache invalidations rejected by the backend."
        );
        describe_histogram!(
            "orderloom_cache_invalidate_ms",
            Unit::Milliseconds,
            "Cache invalidation latency in milliseconds."
        );
        describe_counter!(
            "orderloom_cache_refetch_coalesced_total",
            Unit::Count,
            "Total number of refetches that joined an in-flight load."
        );
        describe_histogram!(
            "orderloom_navigation_flush_ms",
            Unit::Milliseconds,
            "Time spent flushing pending work before navigating."
        );
        describe_counter!(
            "orderloom_navigation_flush_timeout_total",
            Unit::Count,
            "Total number of navigations that gave up waiting for pending work."
        );
        describe_counter!(
            "orderloom_audit_append_total",
            Unit::Count,
            "Total number of audit entries written."
        );
        describe_counter!(
            "orderloom_audit_write_failed_total",
            Unit::Count,
            "Total number of audit entries the store rejected."
        );
    });
}
