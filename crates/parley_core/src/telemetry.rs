//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a human-readable fmt subscriber honoring `RUST_LOG`.
///
/// Defaults to `info` when `RUST_LOG` is unset.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_filter(filter);

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    Ok(())
}

/// Install fmt logging plus OpenTelemetry span export to stdout.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
#[cfg(feature = "otel")]
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::{
        Resource,
        trace::{RandomIdGenerator, Sampler, TracerProvider},
    };

    let provider = TracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .with_id_generator(RandomIdGenerator::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(Resource::default())
        .build();
    let tracer = provider.tracer("parley");
    opentelemetry::global::set_tracer_provider(provider);

    let otel_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(EnvFilter::from_default_env());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Flush pending spans before exit.
#[cfg(feature = "otel")]
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
