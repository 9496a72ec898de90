//! CreateApp - 行の作成からイメージ取得、sandbox 作成、（任意で）起動まで
//!
//! 各ステップは順番に実行され、どこで失敗してもそれまでのステップは巻き戻さない。
//! 行ができた後の失敗は App を Failed にする。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::{AppStatus, HarborError, InstallerMetadata};
use crate::engine::{TaskContext, Workflow};
use crate::registry::{App, AppRegistry};

use super::app_action::StartAppWorkflow;
use super::download_image::DownloadImageWorkflow;

#[derive(Debug, Clone, Default)]
pub struct CreateAppRequest {
    pub installer_id: String,
    pub version: String,
    pub name: String,
    pub params: BTreeMap<String, String>,
    /// Inline installer metadata, honored in dev mode only.
    pub metadata: Option<InstallerMetadata>,
    /// Start the app once its sandbox exists.
    pub start: bool,
}

impl CreateAppRequest {
    pub fn new(
        installer_id: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            installer_id: installer_id.into(),
            version: version.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_metadata(mut self, metadata: InstallerMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn and_start(mut self) -> Self {
        self.start = true;
        self
    }
}

pub struct CreateAppWorkflow {
    registry: AppRegistry,
    req: CreateAppRequest,
}

impl CreateAppWorkflow {
    pub fn new(registry: AppRegistry, req: CreateAppRequest) -> Self {
        Self { registry, req }
    }

    fn validate(&self) -> Result<(), HarborError> {
        let req = &self.req;
        for (field, value) in [
            ("installer id", &req.installer_id),
            ("version", &req.version),
            ("name", &req.name),
        ] {
            if value.trim().is_empty() {
                return Err(HarborError::InvalidArgument(format!("{field} is required")));
            }
        }
        Ok(())
    }

    async fn resolve_metadata(&self) -> Result<InstallerMetadata, HarborError> {
        if let Some(metadata) = &self.req.metadata {
            if self.registry.dev_mode() {
                return Ok(metadata.clone());
            }
            warn!(app = %self.req.name, "inline installer metadata ignored outside dev mode");
        }
        self.registry
            .app_store()
            .get_metadata(&self.req.installer_id, &self.req.version)
            .await
    }

    /// Steps after the row exists.
    async fn provision(
        &self,
        ctx: &TaskContext,
        app: &Arc<App>,
        metadata: &InstallerMetadata,
    ) -> Result<(), HarborError> {
        let app_store = self.registry.app_store();
        if app_store.has_image(&metadata.image).await? {
            ctx.progress(50, "image found locally").await;
        } else {
            ctx.run_child(DownloadImageWorkflow::new(app_store, &metadata.image))
                .await?;
            ctx.progress(50, "image found").await;
        }

        ctx.checkpoint()?;
        app.create_sandbox().await?;
        ctx.progress(70, "sandbox created").await;

        if self.req.start {
            ctx.run_child(StartAppWorkflow::new(app.clone())).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Workflow for CreateAppWorkflow {
    fn name(&self) -> String {
        format!("create app {}", self.req.name)
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
        self.validate()?;
        let req = &self.req;

        let metadata = self.resolve_metadata().await?;
        let app = self
            .registry
            .create(
                &req.installer_id,
                &req.version,
                &req.name,
                req.params.clone(),
                &metadata,
            )
            .await?;
        app.add_task(ctx.task_id()).await;
        ctx.own_app(app.id()).await;
        ctx.progress(10, "Created application").await;

        match self.provision(ctx, &app, &metadata).await {
            Ok(()) => {
                let status = if req.start {
                    AppStatus::Running
                } else {
                    AppStatus::Stopped
                };
                app.set_status(status).await;
                info!(app = %app.id(), name = %req.name, ?status, "app provisioned");
                Ok(())
            }
            Err(e) => {
                app.set_status(AppStatus::Failed).await;
                error!(app = %app.id(), name = %req.name, error = %e, "app creation failed");
                Err(e.context(format!("create app {}", req.name)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainEvent, ErrorKind, TaskStatus, TaskView};
    use crate::ports::SandboxStatus;
    use crate::testkit;
    use tokio::sync::broadcast;

    /// Progress updates published for one task, in order.
    fn progress_of(
        rx: &mut broadcast::Receiver<DomainEvent>,
        task: crate::domain::TaskId,
    ) -> Vec<(u8, String)> {
        let mut steps: Vec<(u8, String)> = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::TaskUpdated(TaskView { id, progress, .. }) = event {
                let step = (progress.percentage, progress.state);
                if id == task && steps.last() != Some(&step) {
                    steps.push(step);
                }
            }
        }
        steps
    }

    #[tokio::test]
    async fn local_image_skips_download() {
        let kit = testkit::platform();
        let mut rx = kit.publisher.subscribe();

        let task = kit
            .registry()
            .create_async(testkit::notes_request("notes"))
            .await;
        task.wait().await.unwrap();

        let steps = progress_of(&mut rx, task.id());
        let pcts: Vec<u8> = steps.iter().map(|(p, _)| *p).collect();
        assert_eq!(pcts, vec![0, 10, 50, 70, 100]);
        assert_eq!(steps[2].1, "image found locally");
        assert_eq!(steps[1].1, "Created application");

        // no child task
        assert_eq!(kit.engine().get_all().await.len(), 1);
        assert!(kit.app_store.downloads().await.is_empty());

        let app = kit.registry().get("notes").await.unwrap();
        assert_eq!(app.status().await, AppStatus::Stopped);
        assert_eq!(app.snapshot().await.tasks, vec![task.id()]);
        assert_eq!(task.copy().await.apps, vec![app.id()]);
    }

    #[tokio::test]
    async fn missing_image_is_downloaded_in_child_task() {
        let kit = testkit::platform();
        let req = CreateAppRequest::new("inst-wiki", "2.0", "wiki")
            .with_metadata(InstallerMetadata::new("wiki:2.0"));

        let task = kit.registry().create_async(req).await;
        task.wait().await.unwrap();

        assert_eq!(kit.app_store.downloads().await, vec!["wiki:2.0"]);
        let names: Vec<_> = kit
            .engine()
            .get_all()
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert!(names.contains(&"download image wiki:2.0".to_string()));
        assert_eq!(task.copy().await.progress.state, "sandbox created");
    }

    #[tokio::test]
    async fn child_failure_fails_parent_and_marks_app_failed() {
        let kit = testkit::platform();
        kit.app_store.fail_download_for("wiki:2.0").await;
        let req = CreateAppRequest::new("inst-wiki", "2.0", "wiki")
            .with_metadata(InstallerMetadata::new("wiki:2.0"));

        let task = kit.registry().create_async(req).await;
        let err = task.wait().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Downstream);
        assert_eq!(task.status().await, TaskStatus::Failed);
        let app = kit.registry().get("wiki").await.unwrap();
        assert_eq!(app.status().await, AppStatus::Failed);
        // no rollback: the row stays
        assert_eq!(kit.registry().get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sandbox_failure_marks_app_failed() {
        let kit = testkit::platform();
        kit.runtime.fail_create_for("notes").await;

        let task = kit
            .registry()
            .create_async(testkit::notes_request("notes"))
            .await;
        let err = task.wait().await.unwrap_err();

        assert!(err.to_string().starts_with("create app notes: "));
        let app = kit.registry().get("notes").await.unwrap();
        assert_eq!(app.status().await, AppStatus::Failed);
    }

    #[tokio::test]
    async fn create_and_start() {
        let kit = testkit::platform();
        let task = kit
            .registry()
            .create_async(testkit::notes_request("notes").and_start())
            .await;
        task.wait().await.unwrap();

        let app = kit.registry().get("notes").await.unwrap();
        assert_eq!(app.status().await, AppStatus::Running);
        assert_eq!(app.actual_status().await.unwrap(), SandboxStatus::Running);
        assert_eq!(kit.engine().get_all().await.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_name_fails_task_without_touching_first_app() {
        let kit = testkit::platform();
        let first = kit.create_app("notes", testkit::notes_metadata()).await;
        let before = first.snapshot().await;

        let task = kit
            .registry()
            .create_async(testkit::notes_request("notes"))
            .await;
        let err = task.wait().await.unwrap_err();

        assert!(matches!(err, HarborError::DuplicateName(_)));
        assert_eq!(first.snapshot().await, before);
    }

    #[tokio::test]
    async fn metadata_comes_from_app_store_outside_dev_mode() {
        let mut config = testkit::config();
        config.dev_mode = false;
        let kit = testkit::platform_with(config);
        kit.app_store
            .add_installer("inst-notes", "1.0", testkit::notes_metadata().with_persistence())
            .await;

        // inline metadata is ignored
        let req = testkit::notes_request("notes");
        kit.registry().create_async(req).await.wait().await.unwrap();
        let app = kit.registry().get("notes").await.unwrap();
        assert!(app.snapshot().await.persistence);

        let req = CreateAppRequest::new("unknown", "1.0", "other");
        let err = kit.registry().create_async(req).await.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn missing_version_is_a_task_error_not_a_panic() {
        let kit = testkit::platform();
        let req = CreateAppRequest::new("inst-notes", "", "notes");
        let err = kit.registry().create_async(req).await.wait().await.unwrap_err();
        assert!(matches!(err, HarborError::InvalidArgument(_)));
    }
}
