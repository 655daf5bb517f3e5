//! Fixed-period poll driver.

use std::time::Duration;

use prometheus::{IntCounter, Opts, Registry};
use tokio::sync::watch;

use crate::ingest::IngestEngine;
use crate::schema::NAMESPACE;

/// Runs the poll loop: one full ingestion cycle, then a flush of every sink,
/// then sleep until the next period boundary.
///
/// Cycles never overlap — a cycle that runs long simply delays the next tick.
/// Sink-flush failures are logged and counted; the in-memory gauge updates of
/// the cycle are never rolled back, and the next cycle's flush is the retry.
pub struct Poller {
    engine: IngestEngine,
    period: Duration,
    flush_errors: IntCounter,
}

impl Poller {
    /// Build a poller and register its flush error counter into `registry`.
    ///
    /// # Errors
    /// Returns the underlying error if the counter cannot be registered.
    pub fn new(
        engine: IngestEngine,
        period: Duration,
        registry: &Registry,
    ) -> Result<Self, prometheus::Error> {
        let flush_errors = IntCounter::with_opts(
            Opts::new("flush_errors_total", "sink flush failures")
                .namespace(NAMESPACE)
                .subsystem("ops"),
        )?;
        registry.register(Box::new(flush_errors.clone()))?;

        Ok(Self {
            engine,
            period,
            flush_errors,
        })
    }

    /// Run until `shutdown` flips to true. The first cycle runs immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(period = ?self.period, "poll loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let stats = self.engine.run_cycle();
            tracing::info!(
                sources_ok = stats.sources_ok,
                sources_failed = stats.sources_failed,
                records = stats.records,
                retractions = stats.retractions,
                "poll cycle complete"
            );

            let failed_flushes = self.engine.flush_sinks().await;
            if failed_flushes > 0 {
                self.flush_errors.inc_by(failed_flushes as u64);
            }
        }
        tracing::info!("poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceSpec;
    use crate::relay::RelayTracker;
    use crate::schema::USER_STATISTIC;
    use crate::sink::PromSink;
    use std::io::Write;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_poller_runs_cycles_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("user.txt")).unwrap();
        f.write_all(b"20180807|1200|30|80|12|9|x").unwrap();
        let flag_path = dir.path().join("user.flag");
        std::fs::File::create(&flag_path)
            .unwrap()
            .write_all(b"user.txt|1|1\n")
            .unwrap();

        let registry = Registry::new();
        let sink = Arc::new(PromSink::new(&registry).unwrap());
        let engine = IngestEngine::new(
            vec![SourceSpec {
                schema: &USER_STATISTIC,
                flag_path,
            }],
            vec![sink],
            RelayTracker::new([]),
            &registry,
        )
        .unwrap();

        let poller = Poller::new(engine, Duration::from_secs(3600), &registry).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(rx));

        // The first tick fires immediately; give the cycle a moment to land.
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let online = registry
            .gather()
            .into_iter()
            .find(|mf| mf.get_name() == "p2p_userStatistic_online")
            .expect("online family");
        assert_eq!(online.get_metric()[0].get_gauge().get_value(), 1200.0);
    }
}
