//! Prometheus registry sink.

use std::collections::HashMap;

use async_trait::async_trait;
use prometheus::{GaugeVec, Opts, Registry};

use crate::ingest::Record;
use crate::schema::{FieldRole, Schema, SchemaTable, NAMESPACE};

use super::{MetricSink, SinkError};

/// Gauge-registry sink backing both the pull endpoint and the PushGateway
/// payload.
///
/// One `GaugeVec` per (schema, value field) is built from the schema table at
/// construction — the metric surface is entirely table-driven. The last
/// record published for a labeled series wins, which is why the engine must
/// deliver records in file order.
pub struct PromSink {
    /// Per schema name, one gauge per value field, in schema field order.
    gauges: HashMap<&'static str, Vec<GaugeVec>>,
}

impl PromSink {
    /// Build and register every schema's gauges into `registry`.
    ///
    /// # Errors
    /// Returns the underlying error if a gauge fails to register (duplicate
    /// registration of the same registry is the only realistic cause).
    pub fn new(registry: &Registry) -> Result<Self, SinkError> {
        let mut gauges = HashMap::new();

        for schema in SchemaTable::all() {
            let labels = schema.label_names();
            let mut vecs = Vec::new();
            for (_, field) in schema.value_fields() {
                let FieldRole::Value { metric, help } = field.role else {
                    continue;
                };
                let opts = Opts::new(metric, help)
                    .namespace(NAMESPACE)
                    .subsystem(schema.subsystem);
                let vec = GaugeVec::new(opts, &labels)?;
                registry.register(Box::new(vec.clone()))?;
                vecs.push(vec);
            }
            gauges.insert(schema.name, vecs);
        }

        Ok(Self { gauges })
    }

    fn schema_gauges(&self, schema: &Schema) -> Result<&[GaugeVec], SinkError> {
        self.gauges
            .get(schema.name)
            .map(Vec::as_slice)
            .ok_or_else(|| SinkError::Unavailable(format!("no gauges for schema '{}'", schema.name)))
    }
}

#[async_trait]
impl MetricSink for PromSink {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn publish(&self, record: &Record) -> Result<(), SinkError> {
        let vecs = self.schema_gauges(record.schema)?;
        let labels = record.label_values();

        for ((idx, _), vec) in record.schema.value_fields().zip(vecs) {
            vec.with_label_values(&labels)
                .set(record.values[idx].as_metric());
        }
        Ok(())
    }

    fn retract(&self, schema: &'static Schema, label_values: &[String]) -> Result<(), SinkError> {
        let vecs = self.schema_gauges(schema)?;
        let labels: Vec<&str> = label_values.iter().map(String::as_str).collect();

        for vec in vecs {
            // A series that was never set (or was already retracted) reports
            // a lookup error; retraction is idempotent, so ignore it.
            let _ = vec.remove_label_values(&labels);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{extract, Cursor};
    use crate::schema::{RELAY, USER_STATISTIC};
    use std::io::Write;

    fn one_record(schema: &'static Schema, line: &str) -> Record {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(line.as_bytes())
            .unwrap();
        extract(
            schema,
            &Cursor {
                data_path: path,
                start: 1,
                end: 1,
            },
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_publish_sets_labeled_gauges() {
        let registry = Registry::new();
        let sink = PromSink::new(&registry).unwrap();

        let record = one_record(
            &RELAY,
            "20180807|1|210.51.168.108|9000|3|12|100|5|9000|0|7|6|400|380",
        );
        sink.publish(&record).unwrap();

        let families = registry.gather();
        let onphone = families
            .iter()
            .find(|mf| mf.get_name() == "p2p_relay_onphone")
            .expect("relay onphone family");
        assert_eq!(onphone.get_metric().len(), 1);
        assert_eq!(onphone.get_metric()[0].get_gauge().get_value(), 3.0);
    }

    #[test]
    fn test_publish_unlabeled_schema() {
        let registry = Registry::new();
        let sink = PromSink::new(&registry).unwrap();

        let record = one_record(&USER_STATISTIC, "20180807|1200|30|80|12|9|pc:800,ios:400");
        sink.publish(&record).unwrap();

        let families = registry.gather();
        let online = families
            .iter()
            .find(|mf| mf.get_name() == "p2p_userStatistic_online")
            .expect("online family");
        assert_eq!(online.get_metric()[0].get_gauge().get_value(), 1200.0);
    }

    #[test]
    fn test_last_publish_wins_per_series() {
        let registry = Registry::new();
        let sink = PromSink::new(&registry).unwrap();

        let older = one_record(
            &RELAY,
            "20180806|1|210.51.168.108|9000|5|12|100|5|9000|0|7|6|400|380",
        );
        let newer = one_record(
            &RELAY,
            "20180807|1|210.51.168.108|9000|8|12|100|5|9000|0|7|6|400|380",
        );
        sink.publish(&older).unwrap();
        sink.publish(&newer).unwrap();

        let families = registry.gather();
        let onphone = families
            .iter()
            .find(|mf| mf.get_name() == "p2p_relay_onphone")
            .unwrap();
        assert_eq!(onphone.get_metric().len(), 1);
        assert_eq!(onphone.get_metric()[0].get_gauge().get_value(), 8.0);
    }

    #[test]
    fn test_retract_removes_every_relay_series() {
        let registry = Registry::new();
        let sink = PromSink::new(&registry).unwrap();

        let record = one_record(
            &RELAY,
            "20180807|1|210.51.168.108|9000|3|12|100|5|9000|0|7|6|400|380",
        );
        sink.publish(&record).unwrap();

        let labels = record.owned_label_values();
        sink.retract(&RELAY, &labels).unwrap();

        for mf in registry.gather() {
            if mf.get_name().starts_with("p2p_relay_") {
                assert!(
                    mf.get_metric().is_empty(),
                    "{} still has series after retraction",
                    mf.get_name()
                );
            }
        }

        // Retracting again is a no-op, not an error.
        sink.retract(&RELAY, &labels).unwrap();
    }

    #[test]
    fn test_all_schemas_register_without_collision() {
        let registry = Registry::new();
        PromSink::new(&registry).unwrap();
        // Registering the same table twice into one registry is the
        // duplicate-registration error, not a silent overwrite.
        assert!(PromSink::new(&registry).is_err());
    }
}
