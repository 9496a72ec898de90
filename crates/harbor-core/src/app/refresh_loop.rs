//! RefreshLoop - 定期的な収束（desired → actual）
//!
//! # フロー
//! 1. interval ごとに `AppRegistry::refresh()` を実行
//! 2. 失敗はログに残して次の tick へ
//! 3. shutdown が来たら実行中の refresh を終えてから抜ける

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::AppRegistry;

/// Refresh loop handle.
/// - `request_shutdown()` で次の tick を待たずに止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct RefreshLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RefreshLoop {
    /// # Panics
    /// If `interval` is zero.
    pub fn spawn(registry: AppRegistry, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "refresh interval must be non-zero");
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            refresh_loop(registry, interval, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn refresh_loop(
    registry: AppRegistry,
    interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis() as u64, "refresh loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match registry.refresh().await {
            Ok(report) => debug!(
                started = report.started.len(),
                stopped = report.stopped.len(),
                collected = report.collected.len(),
                "refresh tick"
            ),
            Err(e) => warn!(error = %e, "refresh failed"),
        }
    }
    info!("refresh loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SandboxStatus;
    use crate::testkit;

    #[tokio::test(start_paused = true)]
    async fn loop_converges_and_stops() {
        let kit = testkit::platform();
        let app = kit.create_app("notes", testkit::notes_metadata()).await;
        kit.registry().start("notes").await.unwrap();

        let refresh = RefreshLoop::spawn(kit.registry().clone(), Duration::from_secs(10));
        while app.actual_status().await.unwrap() != SandboxStatus::Running {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        refresh.shutdown_and_join().await;
        kit.registry().stop("notes").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        // nothing converges once the loop is gone
        assert_eq!(app.actual_status().await.unwrap(), SandboxStatus::Running);
    }
}
