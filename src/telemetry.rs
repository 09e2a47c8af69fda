use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to build prometheus exporter: {0}")]
    Exporter(String),
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("Metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub struct Metrics {
    request_counter: Counter<u64>,
    round_trip_duration: Histogram<u64>,
    round_trip_failures: Counter<u64>,
    detected_objects: Counter<u64>,
    _provider: SdkMeterProvider,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| MetricsError::Exporter(e.to_string()))?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("yolo_uploader");
        // The HTTP metrics layer records through the global provider.
        global::set_meter_provider(provider.clone());

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let round_trip_duration = meter
            .u64_histogram("detection_round_trip_ms")
            .with_boundaries(generate_boundaries(&[
                (50, 500, 50),
                (500, 2000, 250),
                (2000, 10000, 2000),
            ]))
            .with_description("Duration of detection round trips in milliseconds")
            .build();

        let round_trip_failures = meter
            .u64_counter("detection_failures_total")
            .with_description("Detection round trips that ended in an error")
            .build();

        let detected_objects = meter
            .u64_counter("detected_objects_total")
            .with_description("Objects reported by the detection service, by label")
            .build();

        Ok(Metrics {
            request_counter,
            round_trip_duration,
            round_trip_failures,
            detected_objects,
            _provider: provider,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_round_trip(&self, duration_ms: u64, succeeded: bool) {
        let attributes = vec![KeyValue::new("succeeded", succeeded)];
        self.round_trip_duration.record(duration_ms, &attributes);
        if !succeeded {
            self.round_trip_failures.add(1, &[]);
        }
    }

    pub fn record_detections<'a>(&self, labels: impl IntoIterator<Item = (&'a str, usize)>) {
        for (label, count) in labels {
            let attributes = vec![KeyValue::new("label", label.to_string())];
            self.detected_objects.add(count as u64, &attributes);
        }
    }

    pub fn encode(&self) -> Result<String, MetricsError> {
        use prometheus::{Encoder, TextEncoder};

        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Histogram boundaries from `(start, end, step)` segments, without repeats.
fn generate_boundaries(segments: &[(u64, u64, u64)]) -> Vec<f64> {
    let mut boundaries: Vec<u64> = Vec::new();
    for &(start, end, step) in segments {
        for bound in (start..=end).step_by(step as usize) {
            if boundaries.last().map_or(true, |&last| bound > last) {
                boundaries.push(bound);
            }
        }
    }
    boundaries.into_iter().map(|b| b as f64).collect()
}
