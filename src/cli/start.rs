use crate::cli::{actions::Action, commands, dispatch::handler};
use anyhow::Result;
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};
use std::{env::var, time::Duration};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

fn init_tracer() -> Result<opentelemetry_sdk::trace::Tracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]))
        .build();

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Start the CLI: parse arguments, initialize telemetry, resolve the action.
///
/// The OTLP layer is only wired when `OTEL_EXPORTER_OTLP_ENDPOINT` is set;
/// plain fmt logging works without a collector.
///
/// # Errors
///
/// Returns an error if argument parsing, telemetry initialization, or
/// action dispatch fails.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity_level = match matches.get_one::<u8>("verbosity").map_or(0, |&v| v) {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let fmt_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    // RUST_LOG=
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy();

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let telemetry = OpenTelemetryLayer::new(init_tracer()?);
        let subscriber = Registry::default()
            .with(fmt_layer)
            .with(telemetry)
            .with(env_filter);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(fmt_layer).with(env_filter);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let action = handler(&matches)?;

    Ok(action)
}
