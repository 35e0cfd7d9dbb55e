use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber and describe the crate's metrics.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    // Stdout carries command output; logs go to stderr.
    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "userstats_topic_cache_hit_total",
            Unit::Count,
            "Topic counts served from the query cache."
        );
        describe_counter!(
            "userstats_topic_cache_miss_total",
            Unit::Count,
            "Topic counts recomputed from the database."
        );
        describe_counter!(
            "userstats_query_cache_hit_total",
            Unit::Count,
            "Total number of in-memory query cache hits."
        );
        describe_counter!(
            "userstats_query_cache_miss_total",
            Unit::Count,
            "Total number of in-memory query cache misses, expired entries included."
        );
        describe_counter!(
            "userstats_query_cache_evict_total",
            Unit::Count,
            "Total number of in-memory query cache evictions due to capacity."
        );
    });
}
