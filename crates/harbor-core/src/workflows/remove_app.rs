//! RemoveApp - sandbox を片付けてから行を削除する

use async_trait::async_trait;
use tracing::info;

use crate::domain::{AppId, DesiredStatus, HarborError};
use crate::engine::{TaskContext, Workflow};
use crate::registry::AppRegistry;

pub struct RemoveAppWorkflow {
    registry: AppRegistry,
    app: AppId,
}

impl RemoveAppWorkflow {
    pub fn new(registry: AppRegistry, app: AppId) -> Self {
        Self { registry, app }
    }
}

#[async_trait]
impl Workflow for RemoveAppWorkflow {
    fn name(&self) -> String {
        format!("remove app {}", self.app)
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
        ctx.own_app(self.app).await;
        ctx.progress(50, "removing app").await;

        let app = self.registry.get_by_id(self.app).await?;
        if app.desired_status().await == DesiredStatus::Stopped {
            app.stop().await?;
        }
        self.registry.remove(self.app).await?;
        info!(task = %ctx.task_id(), app = %self.app, "app removed");
        Ok(())
    }
}
