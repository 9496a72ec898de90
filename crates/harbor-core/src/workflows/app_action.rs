//! StartApp / StopApp - desired status を宣言してから sandbox を操作する

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AppStatus, DesiredStatus, HarborError};
use crate::engine::{TaskContext, Workflow};
use crate::registry::App;

pub struct StartAppWorkflow {
    app: Arc<App>,
}

impl StartAppWorkflow {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl Workflow for StartAppWorkflow {
    fn name(&self) -> String {
        format!("start app {}", self.app.id())
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
        self.app.add_task(ctx.task_id()).await;
        ctx.own_app(self.app.id()).await;
        ctx.progress(50, "starting app").await;

        self.app.set_desired_status(DesiredStatus::Running).await;
        self.app.start().await?;
        self.app.set_status(AppStatus::Running).await;
        Ok(())
    }
}

pub struct StopAppWorkflow {
    app: Arc<App>,
}

impl StopAppWorkflow {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl Workflow for StopAppWorkflow {
    fn name(&self) -> String {
        format!("stop app {}", self.app.id())
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
        self.app.add_task(ctx.task_id()).await;
        ctx.own_app(self.app.id()).await;
        ctx.progress(50, "stopping app").await;

        self.app.set_desired_status(DesiredStatus::Stopped).await;
        self.app.stop().await?;
        self.app.set_status(AppStatus::Stopped).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, TaskStatus};
    use crate::ports::SandboxStatus;
    use crate::testkit;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn start_then_stop() {
        let kit = testkit::platform();
        let app = kit.create_app("notes", testkit::notes_metadata()).await;

        let start = kit.engine().submit(StartAppWorkflow::new(app.clone())).await;
        start.wait().await.unwrap();
        assert_eq!(app.actual_status().await.unwrap(), SandboxStatus::Running);
        assert_eq!(app.status().await, AppStatus::Running);

        let stop = kit.engine().submit(StopAppWorkflow::new(app.clone())).await;
        stop.wait().await.unwrap();
        assert!(app.sandbox().await.unwrap().is_none());
        assert_eq!(app.desired_status().await, DesiredStatus::Stopped);

        let record = app.snapshot().await;
        assert_eq!(record.tasks, vec![start.id(), stop.id()]);
        assert_eq!(stop.copy().await.apps, vec![app.id()]);
    }

    #[tokio::test]
    async fn start_failure_keeps_desired_running() {
        let kit = testkit::platform();
        let app = kit.create_app("notes", testkit::notes_metadata()).await;
        kit.runtime.fail_start_for(&app.id().to_string()).await;

        let task = kit.engine().submit(StartAppWorkflow::new(app.clone())).await;
        assert!(task.wait().await.is_err());
        assert_eq!(task.status().await, TaskStatus::Failed);
        // refresh will retry
        assert_eq!(app.desired_status().await, DesiredStatus::Running);
    }

    #[tokio::test]
    async fn unpersistable_app_update_is_fatal_not_a_task_failure() {
        let kit = testkit::platform();
        let app = kit.create_app("notes", testkit::notes_metadata()).await;
        kit.store.fail_writes_to("apps");

        let task = kit.engine().submit(StartAppWorkflow::new(app.clone())).await;
        let err = timeout(Duration::from_secs(2), task.wait())
            .await
            .expect("wait must not hang")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(!matches!(err, HarborError::WorkflowPanicked(_)));
        let fatal = timeout(Duration::from_secs(2), kit.engine().persistence_failure())
            .await
            .expect("failure is reported");
        assert!(fatal.to_string().contains(&app.id().to_string()));
    }
}
