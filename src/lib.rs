//! statgw — exporter gateway for P2P platform statistics.
//!
//! Periodically reads the append-only, pipe-delimited statistics files
//! produced by the telephony/P2P platform, decodes them against fixed
//! per-source schemas, and republishes them as time-series metrics to one or
//! more backends.
//!
//! # Architecture
//!
//! - **Schema table** ([`schema`]): static description of every source kind;
//!   drives decoding and metric definition generically
//! - **Ingestion** ([`ingest`]): flag-file cursors, record extraction, and
//!   the per-cycle engine
//! - **Relay liveness** ([`relay`]): absence-based retraction for the fixed
//!   relay fleet
//! - **Sinks** ([`sink`]): Prometheus registry, Telegraf line protocol,
//!   PushGateway
//! - **Driver** ([`poller`]) and **HTTP surface** ([`server`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prometheus::Registry;
//! use statgw::{IngestEngine, PromSink, RelayTracker, SchemaTable, SourceSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new();
//! let sink = Arc::new(PromSink::new(&registry)?);
//! let sources = vec![SourceSpec {
//!     schema: SchemaTable::get("relay")?,
//!     flag_path: "/var/stats/relay.flag".into(),
//! }];
//! let mut engine = IngestEngine::new(sources, vec![sink], RelayTracker::new([]), &registry)?;
//! engine.run_cycle();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod ingest;
pub mod poller;
pub mod relay;
pub mod schema;
pub mod server;
pub mod sink;

pub use config::{AppConfig, ConfigError};
pub use ingest::{CycleStats, IngestEngine, IngestError, Record, SourceSpec};
pub use poller::Poller;
pub use relay::{RelayIdentity, RelayTracker};
pub use schema::{Schema, SchemaTable};
pub use sink::{MetricSink, PromSink, PushGatewaySink, SinkError, TelegrafSink};
