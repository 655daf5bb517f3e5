//! Metric sink capability and its backend adapters.
//!
//! The ingestion core is sink-agnostic: it hands every decoded [`Record`] to
//! each registered [`MetricSink`] and forwards retraction events from the
//! relay tracker. How a record becomes a vendor-specific time series is the
//! adapter's business.
//!
//! - [`PromSink`]: shared-registry gauges served by the pull endpoint
//! - [`TelegrafSink`]: Influx line-protocol buffer pushed over TCP
//! - [`PushGatewaySink`]: registry snapshot pushed to a Prometheus gateway
//!
//! `publish` and `retract` are immediate, local, in-memory operations;
//! `flush` is where push-based adapters talk to the network. A flush failure
//! never rolls back gauge state already applied — the next cycle's flush is
//! the retry.

mod prom;
mod pushgateway;
mod telegraf;

pub use prom::PromSink;
pub use pushgateway::PushGatewaySink;
pub use telegraf::TelegrafSink;

use async_trait::async_trait;
use thiserror::Error;

use crate::ingest::Record;
use crate::schema::Schema;

/// Errors raised by sink adapters.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The backend cannot be reached or rejected the payload.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Metric registration or encoding failed.
    #[error("metric encode error: {0}")]
    Encode(#[from] prometheus::Error),

    /// Transport-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A destination that turns records into externally visible time series.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &'static str;

    /// Apply one record's label set and gauge values.
    fn publish(&self, record: &Record) -> Result<(), SinkError>;

    /// Delete the series identified by `label_values` for every gauge of
    /// `schema`. Retracting a series that was never published is a no-op.
    fn retract(&self, schema: &'static Schema, label_values: &[String]) -> Result<(), SinkError>;

    /// Forward accumulated state to the backend. Pull-based adapters have
    /// nothing to do here.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
