//! Influx line-protocol sink for a Telegraf socket listener.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::ingest::{FieldValue, Record};
use crate::schema::{FieldRole, Schema, NAMESPACE};

use super::{MetricSink, SinkError};

/// Dial timeout for the Telegraf socket.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Line-protocol sink.
///
/// `publish` renders records into an in-memory buffer; `flush` sends the
/// buffer over TCP once per cycle and clears it whether or not the send
/// succeeded — delivery is at-most-once per cycle, there is no cross-cycle
/// replay. A failed connection is dropped and re-dialed on the next flush.
///
/// Line protocol has no notion of deleting a series, so `retract` is a no-op;
/// silent series simply stop receiving points downstream.
pub struct TelegrafSink {
    target: String,
    buf: Mutex<String>,
    conn: tokio::sync::Mutex<Option<TcpStream>>,
}

impl TelegrafSink {
    /// Create a sink writing to `target` (`host:port`).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            buf: Mutex::new(String::new()),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Bytes currently buffered for the next flush.
    pub fn pending(&self) -> usize {
        self.buf.lock().expect("telegraf buffer poisoned").len()
    }

    fn encode(record: &Record) -> String {
        let mut line = format!("{}_{}", NAMESPACE, record.schema.subsystem);

        for idx in record.schema.label_indices() {
            let FieldRole::Label(key) = record.schema.fields[idx].role else {
                continue;
            };
            if let Some(value) = record.values[idx].as_str() {
                // Influx forbids empty tag values; skip rather than emit a
                // line the listener will reject wholesale.
                if !value.is_empty() {
                    line.push(',');
                    line.push_str(key);
                    line.push('=');
                    line.push_str(&escape_tag(value));
                }
            }
        }

        line.push(' ');
        let mut first = true;
        for (idx, field) in record.schema.value_fields() {
            let FieldRole::Value { metric, .. } = field.role else {
                continue;
            };
            if !first {
                line.push(',');
            }
            first = false;
            line.push_str(metric);
            line.push('=');
            match &record.values[idx] {
                FieldValue::Int(v) => line.push_str(&v.to_string()),
                FieldValue::Float(v) => line.push_str(&v.to_string()),
                FieldValue::Str(_) => line.push('0'),
            }
        }
        line.push('\n');
        line
    }
}

fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[async_trait]
impl MetricSink for TelegrafSink {
    fn name(&self) -> &'static str {
        "telegraf"
    }

    fn publish(&self, record: &Record) -> Result<(), SinkError> {
        let line = Self::encode(record);
        self.buf
            .lock()
            .expect("telegraf buffer poisoned")
            .push_str(&line);
        Ok(())
    }

    fn retract(&self, _schema: &'static Schema, _label_values: &[String]) -> Result<(), SinkError> {
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let payload = std::mem::take(&mut *self.buf.lock().expect("telegraf buffer poisoned"));
        if payload.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.target))
                .await
                .map_err(|_| {
                    SinkError::Unavailable(format!("connect to {} timed out", self.target))
                })??;
            *conn = Some(stream);
        }

        let stream = conn.as_mut().expect("connection just established");
        if let Err(e) = stream.write_all(payload.as_bytes()).await {
            // Drop the broken connection; the next flush re-dials.
            *conn = None;
            return Err(e.into());
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
    use tokio::io::AsyncReadExt;

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
    fn test_encode_labeled_record() {
        let record = one_record(
            &RELAY,
            "20180807|1|210.51.168.108|9000|3|12|100|5|9000|0|7|6|400|380",
        );
        let line = TelegrafSink::encode(&record);
        assert!(line.starts_with("p2p_relay,RelayId=1,IP=210.51.168.108,Port=9000 "));
        assert!(line.contains("onphone=3"));
        assert!(line.contains("new_down_stream=380"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_encode_unlabeled_record_has_no_tags() {
        let record = one_record(&USER_STATISTIC, "20180807|1200|30|80|12|9|pc:800");
        let line = TelegrafSink::encode(&record);
        assert!(line.starts_with("p2p_userStatistic online=1200,"));
    }

    #[test]
    fn test_escape_tag_values() {
        assert_eq!(escape_tag("a b"), "a\\ b");
        assert_eq!(escape_tag("a,b=c"), "a\\,b\\=c");
    }

    #[test]
    fn test_publish_accumulates_until_flush() {
        let sink = TelegrafSink::new("127.0.0.1:1");
        let record = one_record(&USER_STATISTIC, "20180807|1|2|3|4|5|x");
        sink.publish(&record).unwrap();
        sink.publish(&record).unwrap();
        assert!(sink.pending() > 0);
    }

    #[tokio::test]
    async fn test_flush_writes_buffer_and_clears_it() {
        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            // Some sandboxed environments disallow binding; skip the test.
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return,
            Err(e) => panic!("failed to bind test listener: {e}"),
        };
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = vec![0u8; 1024];
            let n = socket.read(&mut received).await.unwrap();
            String::from_utf8_lossy(&received[..n]).to_string()
        });

        let sink = TelegrafSink::new(addr.to_string());
        let record = one_record(&USER_STATISTIC, "20180807|1200|30|80|12|9|x");
        sink.publish(&record).unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.pending(), 0);

        let received = server.await.unwrap();
        assert!(received.contains("p2p_userStatistic online=1200"));
    }

    #[tokio::test]
    async fn test_flush_failure_discards_payload() {
        // Nothing listens on this port; the dial fails fast.
        let sink = TelegrafSink::new("127.0.0.1:1");
        let record = one_record(&USER_STATISTIC, "20180807|1|2|3|4|5|x");
        sink.publish(&record).unwrap();

        assert!(sink.flush().await.is_err());
        // At-most-once per cycle: the payload is gone, not queued for retry.
        assert_eq!(sink.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_is_noop() {
        let sink = TelegrafSink::new("127.0.0.1:1");
        sink.flush().await.unwrap();
    }
}
