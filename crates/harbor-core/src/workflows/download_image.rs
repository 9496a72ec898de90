//! DownloadImage - sandbox イメージの取得（kill 可能）

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::HarborError;
use crate::engine::{TaskContext, Workflow};
use crate::ports::AppStore;

pub struct DownloadImageWorkflow {
    app_store: Arc<dyn AppStore>,
    image: String,
}

impl DownloadImageWorkflow {
    pub fn new(app_store: Arc<dyn AppStore>, image: impl Into<String>) -> Self {
        Self {
            app_store,
            image: image.into(),
        }
    }
}

#[async_trait]
impl Workflow for DownloadImageWorkflow {
    fn name(&self) -> String {
        format!("download image {}", self.image)
    }

    fn killable(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
        ctx.progress(0, format!("downloading {}", self.image)).await;

        tokio::select! {
            result = self.app_store.download_image(&self.image) => result?,
            _ = ctx.dying() => {
                info!(task = %ctx.task_id(), image = %self.image, "download abandoned");
                return Err(HarborError::TaskKilled(ctx.task_id().to_string()));
            }
        }

        ctx.progress(100, "image downloaded").await;
        Ok(())
    }
}
