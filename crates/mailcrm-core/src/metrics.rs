//! Prometheus counters for dispatch and webhook activity

use mailcrm_common::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Dispatch and reconciliation counters in a private registry
pub struct Metrics {
    registry: Registry,
    pub emails_sent: IntCounterVec,
    pub emails_failed: IntCounterVec,
    pub emails_scheduled: IntCounter,
    pub webhook_events: IntCounterVec,
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics error: {}", e))
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("mailcrm".to_string()), None).map_err(metric_error)?;

        let emails_sent = IntCounterVec::new(
            Opts::new("emails_sent_total", "Emails accepted by the delivery gateway"),
            &["path"],
        )
        .map_err(metric_error)?;
        let emails_failed = IntCounterVec::new(
            Opts::new("emails_failed_total", "Emails the delivery gateway refused"),
            &["path"],
        )
        .map_err(metric_error)?;
        let emails_scheduled = IntCounter::new(
            "emails_scheduled_total",
            "Emails deferred to the due poller",
        )
        .map_err(metric_error)?;
        let webhook_events = IntCounterVec::new(
            Opts::new("webhook_events_total", "Provider webhook events received"),
            &["event", "outcome"],
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(emails_sent.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(emails_failed.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(emails_scheduled.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(webhook_events.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            emails_sent,
            emails_failed,
            emails_scheduled,
            webhook_events,
        })
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.emails_sent.with_label_values(&["immediate"]).inc();
        metrics
            .webhook_events
            .with_label_values(&["opened", "applied"])
            .inc_by(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("mailcrm_emails_sent_total{path=\"immediate\"} 1"));
        assert!(text.contains("mailcrm_webhook_events_total{event=\"opened\",outcome=\"applied\"} 2"));
    }
}
