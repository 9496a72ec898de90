//! Workflow - タスクとして実行される処理
//!
//! ワークフローは `TaskContext` 経由で進捗を報告し、kill 要求を観測し、
//! 子タスクを起動する。子タスクは親のキャンセルを継承する。

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::WaitForCancellationFuture;

use crate::domain::{AppId, HarborError, TaskId};

use super::task::Task;
use super::task_engine::TaskEngine;

#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Human-readable task name ("create app notes").
    fn name(&self) -> String;

    /// Whether the task accepts kill requests from the start.
    fn killable(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError>;
}

/// What a running workflow sees of its task.
pub struct TaskContext {
    task: Arc<Task>,
    engine: TaskEngine,
}

impl TaskContext {
    pub(crate) fn new(task: Arc<Task>, engine: TaskEngine) -> Self {
        Self { task, engine }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub async fn progress(&self, percentage: u8, state: impl Into<String>) {
        self.task.set_progress(percentage, state).await;
    }

    pub async fn set_killable(&self) {
        self.task.set_killable().await;
    }

    pub fn dying(&self) -> WaitForCancellationFuture<'_> {
        self.task.dying()
    }

    /// Err once a kill was requested; call between steps.
    pub fn checkpoint(&self) -> Result<(), HarborError> {
        if self.task.is_dying() {
            return Err(HarborError::TaskKilled(self.task.id().to_string()));
        }
        Ok(())
    }

    pub async fn own_app(&self, app: AppId) {
        self.task.own_app(app).await;
    }

    /// Submit a child task that is killed along with this one.
    pub async fn spawn_child<W: Workflow>(&self, workflow: W) -> Arc<Task> {
        self.engine
            .submit_with_token(workflow, self.task.child_token())
            .await
    }

    /// Run a child task to completion; its failure becomes ours.
    pub async fn run_child<W: Workflow>(&self, workflow: W) -> Result<(), HarborError> {
        let child = self.spawn_child(workflow).await;
        child
            .wait()
            .await
            .map_err(|e| e.context(format!("task {} ({})", child.id(), child.name())))
    }
}
