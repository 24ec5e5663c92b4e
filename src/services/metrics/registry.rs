use prometheus::{
    Registry, CounterVec, HistogramVec, HistogramOpts, Opts,
    Encoder, TextEncoder,
};
use std::sync::Arc;

/// Central metrics registry for the commerce API
pub struct MetricsRegistry {
    registry: Registry,

    // HTTP Metrics
    pub http_requests_total: CounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // Account Metrics
    pub otp_issued_total: CounterVec,
    pub otp_verifications_total: CounterVec,
    pub logins_total: CounterVec,
    pub tokens_blacklisted_total: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        // HTTP Metrics
        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests")
                .namespace("commerce"),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration")
                .namespace("commerce")
                .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        // Account Metrics
        let otp_issued_total = CounterVec::new(
            Opts::new("otp_issued_total", "One-time passwords issued")
                .namespace("commerce"),
            &["purpose"],
        )?;
        registry.register(Box::new(otp_issued_total.clone()))?;

        let otp_verifications_total = CounterVec::new(
            Opts::new("otp_verifications_total", "One-time password verification attempts")
                .namespace("commerce"),
            &["purpose", "outcome"],
        )?;
        registry.register(Box::new(otp_verifications_total.clone()))?;

        let logins_total = CounterVec::new(
            Opts::new("logins_total", "Login attempts")
                .namespace("commerce"),
            &["method", "outcome"],
        )?;
        registry.register(Box::new(logins_total.clone()))?;

        let tokens_blacklisted_total = CounterVec::new(
            Opts::new("tokens_blacklisted_total", "JWTs added to the blacklist")
                .namespace("commerce"),
            &["token_type"],
        )?;
        registry.register(Box::new(tokens_blacklisted_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            otp_issued_total,
            otp_verifications_total,
            logins_total,
            tokens_blacklisted_total,
        }))
    }

    pub fn export(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Get the underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
