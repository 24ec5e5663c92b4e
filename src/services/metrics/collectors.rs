use std::sync::Arc;

use super::MetricsRegistry;
use crate::modules::accounts::model::OtpPurpose;

/// Collector for account flow metrics
#[derive(Clone)]
pub struct AccountMetricsCollector {
    metrics: Arc<MetricsRegistry>,
}

impl AccountMetricsCollector {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }

    pub fn record_otp_issued(&self, purpose: OtpPurpose) {
        self.metrics
            .otp_issued_total
            .with_label_values(&[purpose.as_str()])
            .inc();
    }

    pub fn record_otp_verification(&self, purpose: OtpPurpose, outcome: &str) {
        self.metrics
            .otp_verifications_total
            .with_label_values(&[purpose.as_str(), outcome])
            .inc();
    }

    pub fn record_login(&self, method: &str, outcome: &str) {
        self.metrics
            .logins_total
            .with_label_values(&[method, outcome])
            .inc();
    }

    pub fn record_blacklisted(&self, token_type: &str) {
        self.metrics
            .tokens_blacklisted_total
            .with_label_values(&[token_type])
            .inc();
    }
}
