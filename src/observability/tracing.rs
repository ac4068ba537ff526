use std::sync::OnceLock;

use anyhow::{Context, Error, Result};
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "dailyfeed-content";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Tracing サブスクライバを一度だけ初期化する。
///
/// `RUST_LOG_FORMAT=json`（既定）なら JSON、`text` なら人が読む形式で出力する。
/// `OTEL_EXPORTER_OTLP_ENDPOINT` が設定されていれば OTLP へスパンも送る。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init() -> Result<()> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("RUST_LOG_FORMAT").map_or(true, |value| value != "text");
    let json_layer = use_json.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(false)
    });
    let text_layer = (!use_json).then(fmt::layer);

    let otel_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    let (otel_layer, otel_error) = match otel_endpoint.as_deref().map(init_tracer) {
        Some(Ok(tracer)) => (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            None,
        ),
        Some(Err(error)) => (None, Some(error)),
        None => (None, None),
    };
    let otel_enabled = otel_layer.is_some();

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init();

    match result {
        Ok(()) => {
            let _ = TRACING_INIT.set(());
            if let Some(error) = otel_error {
                info!(
                    otel_enabled,
                    error = %error,
                    "tracing initialized without OpenTelemetry (init failed)"
                );
            } else {
                info!(otel_enabled, "tracing initialized");
            }
            Ok(())
        }
        // 別のサブスクライバが先に登録済み（テストなど）なら、それを使い続ける。
        Err(_) if TRACING_INIT.set(()).is_ok() => Ok(()),
        Err(error) => Err(Error::msg(error.to_string())),
    }
}

/// OTLPエクスポーター経由でOpenTelemetryトレーサーを初期化する。
///
/// サンプリング比率は `OTEL_SAMPLING_RATIO`（既定 1.0）。
fn init_tracer(endpoint: &str) -> Result<SdkTracer> {
    let sampling_ratio = std::env::var("OTEL_SAMPLING_RATIO")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(1.0);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_ratio))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = tracer_provider.tracer(SERVICE_NAME);
    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}
