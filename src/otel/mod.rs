//! OpenTelemetry integration for registry-admission
//!
//! Tracing and metrics providers with optional OTLP export, plus the
//! subscriber setup used by the binary.

use crate::config::{LoggingConfig, OtelConfig};
use crate::error::OtelError;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// OpenTelemetry provider for registry-admission
///
/// Manages tracing and metrics providers with OTLP export capability.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            // Initialize tracer provider with OTLP exporter
            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;

            // Initialize meter provider with OTLP exporter
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;

            (Some(tracer_provider), meter_provider)
        } else {
            // Metrics stay in process when export is disabled
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        // Set global tracer provider
        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    /// Get a tracer from the provider
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            // Return a no-op tracer when disabled
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Shutdown the OpenTelemetry providers gracefully
    pub fn shutdown(&self) -> Result<(), OtelError> {
        // Shutdown meter provider
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        // Force flush any remaining spans
        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        // Best-effort shutdown on drop
        let _ = self.shutdown();
    }
}

/// Admission metrics
pub struct Metrics {
    /// Requests handled, by outcome
    pub requests_total: Counter<u64>,

    /// Pulls denied, by stage
    pub denied_total: Counter<u64>,

    /// Pulls failed by a collaborator, by stage
    pub failed_total: Counter<u64>,

    /// End-to-end handling time in seconds
    pub request_duration: Histogram<f64>,

    /// Backend fetch time in seconds
    pub upstream_duration: Histogram<f64>,
}

impl Metrics {
    /// Create new metrics with the given meter
    pub fn new(meter: &Meter) -> Self {
        let requests_total = meter
            .u64_counter("registry_admission_requests_total")
            .with_description("Total number of requests handled")
            .init();

        let denied_total = meter
            .u64_counter("registry_admission_denied_total")
            .with_description("Total number of manifest pulls denied by a policy stage")
            .init();

        let failed_total = meter
            .u64_counter("registry_admission_failed_total")
            .with_description("Total number of manifest pulls failed by a collaborator error")
            .init();

        let request_duration = meter
            .f64_histogram("registry_admission_request_duration_seconds")
            .with_description("Request handling duration in seconds")
            .init();

        let upstream_duration = meter
            .f64_histogram("registry_admission_upstream_duration_seconds")
            .with_description("Registry backend request duration in seconds")
            .init();

        Self {
            requests_total,
            denied_total,
            failed_total,
            request_duration,
            upstream_duration,
        }
    }

    /// Record a handled request
    pub fn record_request(&self, outcome: &str, duration_secs: f64) {
        let attrs = [KeyValue::new("outcome", outcome.to_string())];
        self.requests_total.add(1, &attrs);
        self.request_duration.record(duration_secs, &attrs);
    }

    /// Record a policy denial
    pub fn record_denied(&self, stage: &str) {
        self.denied_total
            .add(1, &[KeyValue::new("stage", stage.to_string())]);
    }

    /// Record a stage failure
    pub fn record_failed(&self, stage: &str) {
        self.failed_total
            .add(1, &[KeyValue::new("stage", stage.to_string())]);
    }

    /// Record backend request duration
    ///
    /// `mode` is `buffered` for intercepted pulls, `streamed` otherwise.
    pub fn record_upstream_duration(&self, mode: &str, duration_secs: f64) {
        self.upstream_duration
            .record(duration_secs, &[KeyValue::new("mode", mode.to_string())]);
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize tracing subscriber with OpenTelemetry integration
///
/// `logging.format` selects `json` (default) or `pretty` output.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(parse_level(&logging.level));

    let fmt_layer = if logging.format.eq_ignore_ascii_case("pretty") {
        tracing_subscriber::fmt::layer().pretty().boxed()
    } else {
        tracing_subscriber::fmt::layer().json().boxed()
    };

    // OpenTelemetry layer only when export is enabled
    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("registry-admission")));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}
