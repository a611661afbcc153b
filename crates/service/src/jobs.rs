//! Periodic background jobs: warning expiry, suspicious-content scan and
//! snapshot flushing. Each job runs on its own interval until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use earnguard_common::{time::unix_now, JobsConfig};
use earnguard_engine::IntegrityEngine;
use earnguard_store::MemoryStore;

pub fn spawn_jobs(
    engine: Arc<IntegrityEngine>,
    store: Arc<MemoryStore>,
    snapshot_path: Option<PathBuf>,
    config: &JobsConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    {
        let engine = Arc::clone(&engine);
        let mut shutdown = shutdown.clone();
        let period = Duration::from_secs(config.warning_sweep_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.expire_warnings(unix_now()).await {
                            Ok(report) => debug!(
                                cleared = report.warnings_cleared,
                                restored = report.probations_restored,
                                "warning sweep finished"
                            ),
                            Err(e) => error!(error = %e, "warning sweep failed"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    {
        let engine = Arc::clone(&engine);
        let mut shutdown = shutdown.clone();
        let period = Duration::from_secs(config.suspicious_scan_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.scan_suspicious_content(unix_now()).await {
                            Ok(report) => info!(
                                posts = report.posts_scanned,
                                velocity_flags = report.velocity_flags,
                                diversity_flags = report.diversity_flags,
                                "suspicious content scan finished"
                            ),
                            Err(e) => error!(error = %e, "suspicious content scan failed"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    if let (Some(path), true) = (snapshot_path, config.snapshot_flush_secs > 0) {
        let mut shutdown = shutdown;
        let period = Duration::from_secs(config.snapshot_flush_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick fires immediately; nothing has changed yet
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => flush(&store, &path),
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    handles
}

/// Writes the store snapshot, logging on failure.
pub fn flush(store: &MemoryStore, path: &std::path::Path) {
    if let Err(e) = store.save_snapshot(path) {
        error!(error = %e, path = %path.display(), "snapshot flush failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use earnguard_engine::IntegrityEngineBuilder;

    #[tokio::test]
    async fn test_jobs_stop_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(
            IntegrityEngineBuilder::new(store.clone())
                .build()
                .expect("engine"),
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snapshot.json");
        let config = JobsConfig {
            warning_sweep_secs: 1,
            suspicious_scan_secs: 1,
            snapshot_flush_secs: 1,
        };
        let (tx, rx) = watch::channel(false);
        let handles = spawn_jobs(engine, store.clone(), Some(path.clone()), &config, rx);
        assert_eq!(handles.len(), 3);

        tx.send(true).expect("send shutdown");
        for h in handles {
            tokio::time::timeout(Duration::from_secs(2), h)
                .await
                .expect("job stopped")
                .expect("join");
        }

        flush(&store, &path);
        assert!(path.exists());
    }
}
