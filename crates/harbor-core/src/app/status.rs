//! Status - プラットフォーム全体のサマリ

use serde::Serialize;

use crate::domain::{AppRecord, AppStatus, DesiredStatus};
use crate::engine::TaskCounts;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppCounts {
    pub total: usize,
    pub desired_running: usize,
    pub desired_stopped: usize,
    pub failed: usize,
}

impl AppCounts {
    pub(crate) fn from_records(records: &[AppRecord]) -> Self {
        let mut counts = AppCounts {
            total: records.len(),
            ..AppCounts::default()
        };
        for r in records {
            match r.desired_status {
                DesiredStatus::Running => counts.desired_running += 1,
                DesiredStatus::Stopped => counts.desired_stopped += 1,
            }
            if r.status == AppStatus::Failed {
                counts.failed += 1;
            }
        }
        counts
    }
}

/// What `Platform::status()` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformStatus {
    pub instance: String,
    pub apps: AppCounts,
    pub tasks: TaskCounts,
}

#[cfg(test)]
mod tests {
    use crate::domain::DesiredStatus;
    use crate::testkit;
    use crate::workflows::CreateAppRequest;

    #[tokio::test]
    async fn status_summarizes_apps_and_tasks() {
        let kit = testkit::platform();
        kit.create_app("notes", testkit::notes_metadata()).await;
        kit.create_app("wiki", testkit::notes_metadata()).await;
        kit.registry().start("wiki").await.unwrap();

        kit.app_store.fail_download_for("bad:1").await;
        let req = CreateAppRequest::new("inst-bad", "1.0", "bad")
            .with_metadata(crate::domain::InstallerMetadata::new("bad:1"));
        let _ = kit.registry().create_async(req).await.wait().await;

        let status = kit.platform.status().await.unwrap();
        assert_eq!(status.instance, "local");
        assert_eq!(status.apps.total, 3);
        assert_eq!(status.apps.desired_running, 1);
        assert_eq!(status.apps.failed, 1);
        // create + download child
        assert_eq!(status.tasks.failed, 2);
        assert_eq!(status.tasks.active(), 0);

        let app = kit.registry().get("wiki").await.unwrap();
        assert_eq!(app.desired_status().await, DesiredStatus::Running);
    }
}
