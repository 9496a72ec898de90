//! Task - 実行中（または終了済み）のワークフローのハンドル
//!
//! # 状態遷移
//! - Requested -> InProgress -> Finished / Failed / Killed
//! - 終端状態は最終（`TaskRecord::finish` が二度目以降を無視する）
//!
//! # 実装詳細
//! - レコードの変更はロックを握ったまま保存・publish する
//! - 終端結果は watch チャネルにキャッシュし、`wait()` は何度呼んでも同じ結果を返す
//! - kill は CancellationToken を立てるだけ。終了はワークフロー側の協調に任せる

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, info};

use crate::domain::{AppId, DomainEvent, HarborError, TaskId, TaskRecord, TaskStatus, TaskView};
use crate::ports::store::{PersistenceFailure, write_row};
use crate::ports::{Clock, Store, UpdatePublisher};

pub(crate) const TASKS_DATASET: &str = "tasks";

type Outcome = Option<Result<(), HarborError>>;

/// Sole writer of the "tasks" dataset.
pub(crate) struct TaskLedger {
    pub(crate) store: Arc<dyn Store>,
    publisher: Arc<dyn UpdatePublisher>,
    clock: Arc<dyn Clock>,
}

impl TaskLedger {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn UpdatePublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
        }
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// # Panics
    /// With a [`PersistenceFailure`] payload if the store rejects the write.
    pub(crate) async fn save(&self, record: &TaskRecord, created: bool) {
        let id = record.id.to_string();
        if let Err(error) = write_row(&*self.store, TASKS_DATASET, &id, record).await {
            error!(task = %id, name = %record.name, %error, "failed to persist task");
            PersistenceFailure {
                dataset: TASKS_DATASET,
                id,
                error,
            }
            .raise();
        }

        let view = TaskView::from(record);
        self.publisher.publish(if created {
            DomainEvent::TaskCreated(view)
        } else {
            DomainEvent::TaskUpdated(view)
        });
    }
}

pub struct Task {
    id: TaskId,
    name: String,
    record: Mutex<TaskRecord>,
    done: watch::Sender<Outcome>,
    cancel: CancellationToken,
    ledger: Arc<TaskLedger>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub(crate) fn new(record: TaskRecord, cancel: CancellationToken, ledger: Arc<TaskLedger>) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            id: record.id,
            name: record.name.clone(),
            record: Mutex::new(record),
            done,
            cancel,
            ledger,
        }
    }

    /// A task loaded from the store. Must already be terminal.
    pub(crate) fn restored(record: TaskRecord, ledger: Arc<TaskLedger>) -> Self {
        let outcome = match record.status {
            TaskStatus::Finished => Ok(()),
            TaskStatus::Killed => Err(HarborError::TaskKilled(record.id.to_string())),
            _ => Err(HarborError::PriorFailure(
                record.error.clone().unwrap_or_else(|| "failed".to_string()),
            )),
        };
        let task = Self::new(record, CancellationToken::new(), ledger);
        task.done.send_replace(Some(outcome));
        task
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot safe to hand out.
    pub async fn copy(&self) -> TaskView {
        TaskView::from(&*self.record.lock().await)
    }

    pub async fn status(&self) -> TaskStatus {
        self.record.lock().await.status
    }

    /// Block until the task is terminal. Every call returns the same result.
    pub async fn wait(&self) -> Result<(), HarborError> {
        let mut rx = self.done.subscribe();
        let outcome = rx.wait_for(Option::is_some).await.map(|o| (*o).clone());
        match outcome {
            Ok(Some(result)) => result,
            // sender lives in `self`; never closed while we hold it
            _ => Err(HarborError::TaskNotFound(self.id.to_string())),
        }
    }

    async fn update(&self, f: impl FnOnce(&mut TaskRecord)) {
        let mut record = self.record.lock().await;
        if record.status.is_terminal() {
            return;
        }
        f(&mut record);
        self.ledger.save(&record, false).await;
    }

    pub async fn set_percentage(&self, percentage: u8) {
        self.update(|r| r.progress.set_percentage(percentage)).await;
    }

    pub async fn set_state(&self, state: impl Into<String>) {
        let state = state.into();
        self.update(|r| r.progress.state = state).await;
    }

    pub async fn set_progress(&self, percentage: u8, state: impl Into<String>) {
        let state = state.into();
        debug!(task = %self.id, percentage, %state, "progress");
        self.update(|r| {
            r.progress.set_percentage(percentage);
            r.progress.state = state;
        })
        .await;
    }

    pub async fn set_killable(&self) {
        self.update(|r| r.killable = true).await;
    }

    /// Request cooperative cancellation.
    pub async fn kill(&self) -> Result<(), HarborError> {
        let record = self.record.lock().await;
        if record.status.is_terminal() {
            return Err(HarborError::TaskAlreadyTerminal(self.id.to_string()));
        }
        if !record.killable {
            return Err(HarborError::TaskNotKillable(self.id.to_string()));
        }
        info!(task = %self.id, name = %self.name, "kill requested");
        self.cancel.cancel();
        Ok(())
    }

    /// Resolves once a kill was requested (for this task or its parent).
    pub fn dying(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_dying(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub async fn own_app(&self, app: AppId) {
        self.update(|r| r.add_app(app)).await;
    }

    pub(crate) async fn mark_in_progress(&self) {
        self.update(|r| r.mark_in_progress()).await;
        debug!(task = %self.id, name = %self.name, "task started");
    }

    /// Record the terminal result and wake every waiter.
    pub(crate) async fn finish(&self, result: Result<(), HarborError>) {
        let result = match result {
            Err(_) if self.cancel.is_cancelled() => {
                Err(HarborError::TaskKilled(self.id.to_string()))
            }
            other => other,
        };
        let (status, error) = match &result {
            Ok(()) => (TaskStatus::Finished, None),
            Err(e @ HarborError::TaskKilled(_)) => (TaskStatus::Killed, Some(e.to_string())),
            Err(e) => (TaskStatus::Failed, Some(e.to_string())),
        };

        {
            let mut record = self.record.lock().await;
            if !record.status.is_terminal() {
                record.finish(status, error.clone(), self.ledger.now());
                self.ledger.save(&record, false).await;
            }
        }

        match &error {
            None => info!(task = %self.id, name = %self.name, "task finished"),
            Some(e) => info!(task = %self.id, name = %self.name, ?status, error = %e, "task ended"),
        }
        self.done.send_replace(Some(result));
    }

    /// Wake every waiter with `error` without touching the store.
    ///
    /// Used when the task's own bookkeeping can't be persisted. No-op if a
    /// terminal result was already delivered.
    pub(crate) fn abandon(&self, error: HarborError) {
        self.done.send_if_modified(|outcome| {
            if outcome.is_some() {
                return false;
            }
            *outcome = Some(Err(error));
            true
        });
    }
}
