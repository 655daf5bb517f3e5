//! Prometheus PushGateway sink.

use async_trait::async_trait;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::ingest::Record;
use crate::schema::Schema;

use super::{MetricSink, SinkError};

/// Pushes a text-encoded snapshot of the shared registry to a PushGateway
/// once per cycle.
///
/// Publication and retraction happen on the registry through [`PromSink`];
/// this adapter only forwards the resulting state, so `publish`/`retract`
/// are no-ops here. Grouping is by job name, optionally with an instance
/// label.
///
/// [`PromSink`]: super::PromSink
pub struct PushGatewaySink {
    client: reqwest::Client,
    push_url: String,
    registry: Registry,
}

impl PushGatewaySink {
    /// Create a sink pushing `registry` to the gateway at `addr`
    /// (for example `http://127.0.0.1:9091`).
    pub fn new(registry: Registry, addr: &str, job: &str, instance: Option<&str>) -> Self {
        let mut push_url = format!("{}/metrics/job/{}", addr.trim_end_matches('/'), job);
        if let Some(instance) = instance {
            push_url.push_str("/instance/");
            push_url.push_str(instance);
        }
        Self {
            client: reqwest::Client::new(),
            push_url,
            registry,
        }
    }

    /// The gateway grouping URL this sink pushes to.
    pub fn push_url(&self) -> &str {
        &self.push_url
    }
}

#[async_trait]
impl MetricSink for PushGatewaySink {
    fn name(&self) -> &'static str {
        "pushgateway"
    }

    fn publish(&self, _record: &Record) -> Result<(), SinkError> {
        Ok(())
    }

    fn retract(&self, _schema: &'static Schema, _label_values: &[String]) -> Result<(), SinkError> {
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let encoder = TextEncoder::new();
        let mut payload = Vec::new();
        encoder.encode(&self.registry.gather(), &mut payload)?;

        let response = self
            .client
            .put(&self.push_url)
            .header(reqwest::header::CONTENT_TYPE, encoder.format_type())
            .body(payload)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Unavailable(format!(
                "gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url_job_only() {
        let sink = PushGatewaySink::new(Registry::new(), "http://gw:9091/", "p2p", None);
        assert_eq!(sink.push_url(), "http://gw:9091/metrics/job/p2p");
    }

    #[test]
    fn test_push_url_with_instance() {
        let sink = PushGatewaySink::new(Registry::new(), "http://gw:9091", "p2p", Some("gw-01"));
        assert_eq!(sink.push_url(), "http://gw:9091/metrics/job/p2p/instance/gw-01");
    }
}
