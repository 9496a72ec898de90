//! TaskEngine - ワークフローをタスクとして実行・追跡する
//!
//! # フロー
//! 1. submit: REQUESTED で保存・publish し、テーブルに登録
//! 2. 外側の監督タスクが IN_PROGRESS にして本体を別タスクで起動
//! 3. 本体の結果（panic を含む）で終端状態を確定
//!
//! 本体の panic は JoinError として監督タスクが受け取り、FAILED として記録する。
//! エンジン自体は巻き込まれない。
//!
//! 例外は永続化の失敗（`PersistenceFailure` payload の panic）。
//! これはタスク単位の失敗ではなくプラットフォーム全体の致命的エラーとして扱う:
//! - 待機中の `wait()` は `store` エラーで起こす（行は INPROGRESS のまま残りうる）
//! - `TaskEngine::persistence_failure()` が解決し、呼び出し側がプロセスを落とせる

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{HarborError, TaskId, TaskRecord, TaskStatus, TaskView};
use crate::ports::store::{PersistenceFailure, decode_row};
use crate::ports::{Clock, IdGenerator, Store, UpdatePublisher};

use super::task::{TASKS_DATASET, Task, TaskLedger};
use super::workflow::{TaskContext, Workflow};

/// Tasks by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub requested: usize,
    pub in_progress: usize,
    pub finished: usize,
    pub failed: usize,
    pub killed: usize,
}

impl TaskCounts {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Requested => self.requested += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Finished => self.finished += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Killed => self.killed += 1,
        }
    }

    pub fn active(&self) -> usize {
        self.requested + self.in_progress
    }
}

#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    /// Keyed by ULID, so iteration order is creation order.
    tasks: Mutex<BTreeMap<TaskId, Arc<Task>>>,
    ledger: Arc<TaskLedger>,
    ids: Arc<dyn IdGenerator>,
    history_limit: usize,
    /// First persistence failure seen by a task worker.
    fatal: watch::Sender<Option<HarborError>>,
}

impl TaskEngine {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn UpdatePublisher>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        history_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                tasks: Mutex::new(BTreeMap::new()),
                ledger: Arc::new(TaskLedger::new(store, publisher, clock)),
                ids,
                history_limit,
                fatal: watch::channel(None).0,
            }),
        }
    }

    /// Start a workflow as a new task.
    ///
    /// # Panics
    /// If the task row can't be persisted.
    pub async fn submit<W: Workflow>(&self, workflow: W) -> Arc<Task> {
        self.submit_with_token(workflow, CancellationToken::new())
            .await
    }

    pub(crate) async fn submit_with_token<W: Workflow>(
        &self,
        workflow: W,
        cancel: CancellationToken,
    ) -> Arc<Task> {
        let ledger = &self.inner.ledger;
        let mut record = TaskRecord::new(
            self.inner.ids.generate_task_id(),
            workflow.name(),
            ledger.now(),
        );
        record.killable = workflow.killable();
        ledger.save(&record, true).await;

        let task = Arc::new(Task::new(record, cancel, ledger.clone()));
        self.inner
            .tasks
            .lock()
            .await
            .insert(task.id(), task.clone());
        info!(task = %task.id(), name = %task.name(), "task submitted");

        self.dispatch(task.clone(), workflow);
        task
    }

    /// Three layers: the supervisor owns the lifecycle task, which owns the
    /// workflow body. A body panic fails the task; a persistence failure at
    /// any layer reaches the supervisor.
    fn dispatch<W: Workflow>(&self, task: Arc<Task>, workflow: W) {
        let ctx = TaskContext::new(task.clone(), self.clone());
        let engine = self.clone();
        tokio::spawn(async move {
            let lifecycle = tokio::spawn(run_task(task.clone(), workflow, ctx));
            let Err(join) = lifecycle.await else {
                return;
            };
            let error = match join.try_into_panic() {
                Ok(payload) => match payload.downcast::<PersistenceFailure>() {
                    Ok(failure) => HarborError::Store(failure.to_string()),
                    Err(other) => HarborError::WorkflowPanicked(panic_message(&*other)),
                },
                Err(join) => HarborError::WorkflowPanicked(join.to_string()),
            };
            error!(task = %task.id(), name = %task.name(), %error, "task worker died");
            if matches!(error, HarborError::Store(_)) {
                engine.inner.fatal.send_if_modified(|fatal| {
                    if fatal.is_some() {
                        return false;
                    }
                    *fatal = Some(error.clone());
                    true
                });
            }
            task.abandon(error);
        });
    }

    /// Resolves with the first persistence failure hit by a task worker.
    ///
    /// The platform's state may have diverged from the store once this
    /// fires; callers are expected to shut down.
    pub async fn persistence_failure(&self) -> HarborError {
        let mut rx = self.inner.fatal.subscribe();
        let failure = rx
            .wait_for(Option::is_some)
            .await
            .map(|fatal| (*fatal).clone())
            .ok()
            .flatten();
        match failure {
            Some(error) => error,
            // sender lives in `self`
            None => std::future::pending().await,
        }
    }

    pub async fn get(&self, id: TaskId) -> Result<Arc<Task>, HarborError> {
        self.inner
            .tasks
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| HarborError::TaskNotFound(id.to_string()))
    }

    pub async fn kill(&self, id: TaskId) -> Result<(), HarborError> {
        self.get(id).await?.kill().await
    }

    /// Newest first.
    async fn handles(&self) -> Vec<Arc<Task>> {
        self.inner.tasks.lock().await.values().rev().cloned().collect()
    }

    /// Every task, newest first.
    pub async fn get_all(&self) -> Vec<TaskView> {
        let mut views = Vec::new();
        for task in self.handles().await {
            views.push(task.copy().await);
        }
        views
    }

    /// The given tasks, newest first. Unknown ids are skipped.
    pub async fn get_ids(&self, ids: &[TaskId]) -> Vec<TaskView> {
        let mut found: Vec<Arc<Task>> = {
            let tasks = self.inner.tasks.lock().await;
            ids.iter().filter_map(|id| tasks.get(id).cloned()).collect()
        };
        found.sort_by_key(|task| std::cmp::Reverse(task.id()));
        found.dedup_by_key(|task| task.id());

        let mut views = Vec::with_capacity(found.len());
        for task in found {
            views.push(task.copy().await);
        }
        views
    }

    /// The most recent tasks, capped at the history limit.
    pub async fn get_last(&self) -> Vec<TaskView> {
        let mut views = Vec::new();
        for task in self
            .handles()
            .await
            .into_iter()
            .take(self.inner.history_limit)
        {
            views.push(task.copy().await);
        }
        views
    }

    pub async fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for task in self.handles().await {
            counts.add(task.status().await);
        }
        counts
    }

    /// Load persisted tasks. Tasks that were still running when the process
    /// stopped are marked FAILED; their workflows are not resumed.
    pub async fn restore(&self) -> Result<usize, HarborError> {
        let ledger = &self.inner.ledger;
        let rows = ledger.store.read_all(TASKS_DATASET).await?;

        let mut restored = 0;
        let mut tasks = self.inner.tasks.lock().await;
        for (key, row) in rows {
            let mut record: TaskRecord = match decode_row(TASKS_DATASET, &key, row) {
                Ok(record) => record,
                Err(e) => {
                    warn!(task = %key, error = %e, "skipping undecodable task row");
                    continue;
                }
            };
            if tasks.contains_key(&record.id) {
                continue;
            }
            if !record.status.is_terminal() {
                warn!(task = %record.id, name = %record.name, "task interrupted by restart");
                record.finish(
                    TaskStatus::Failed,
                    Some("interrupted by restart".to_string()),
                    ledger.now(),
                );
                ledger.save(&record, false).await;
            }
            tasks.insert(record.id, Arc::new(Task::restored(record, ledger.clone())));
            restored += 1;
        }
        if restored > 0 {
            info!(restored, "tasks restored");
        }
        Ok(restored)
    }
}

/// Mark in progress, run the body on its own task, record the result.
async fn run_task<W: Workflow>(task: Arc<Task>, workflow: W, ctx: TaskContext) {
    task.mark_in_progress().await;
    let body = tokio::spawn(async move { workflow.run(&ctx).await });
    let result = match body.await {
        Ok(result) => result,
        Err(join) => match join.try_into_panic() {
            Ok(payload) if payload.is::<PersistenceFailure>() => {
                std::panic::resume_unwind(payload)
            }
            Ok(payload) => {
                let message = panic_message(&*payload);
                error!(task = %task.id(), name = %task.name(), panic = %message, "workflow panicked");
                Err(HarborError::WorkflowPanicked(message))
            }
            Err(join) => Err(HarborError::WorkflowPanicked(join.to_string())),
        },
    };
    task.finish(result).await;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::testkit;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Succeed;

    #[async_trait]
    impl Workflow for Succeed {
        fn name(&self) -> String {
            "succeed".into()
        }

        async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
            ctx.progress(40, "halfway").await;
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl Workflow for Fail {
        fn name(&self) -> String {
            "fail".into()
        }

        async fn run(&self, _ctx: &TaskContext) -> Result<(), HarborError> {
            Err(HarborError::Runtime("boom".into()))
        }
    }

    struct Panic;

    #[async_trait]
    impl Workflow for Panic {
        fn name(&self) -> String {
            "panic".into()
        }

        async fn run(&self, _ctx: &TaskContext) -> Result<(), HarborError> {
            panic!("workflow bug");
        }
    }

    /// Sleeps for `nap` unless killed first.
    struct Sleeper {
        killable: bool,
        nap: Duration,
    }

    impl Sleeper {
        fn forever(killable: bool) -> Self {
            Self {
                killable,
                nap: Duration::from_secs(3600),
            }
        }
    }

    #[async_trait]
    impl Workflow for Sleeper {
        fn name(&self) -> String {
            "sleeper".into()
        }

        fn killable(&self) -> bool {
            self.killable
        }

        async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
            tokio::select! {
                _ = ctx.dying() => Err(HarborError::TaskKilled(ctx.task_id().to_string())),
                _ = tokio::time::sleep(self.nap) => Ok(()),
            }
        }
    }

    /// Runs a killable sleeper as its child.
    struct Parent;

    #[async_trait]
    impl Workflow for Parent {
        fn name(&self) -> String {
            "parent".into()
        }

        fn killable(&self) -> bool {
            true
        }

        async fn run(&self, ctx: &TaskContext) -> Result<(), HarborError> {
            ctx.run_child(Sleeper::forever(true)).await
        }
    }

    fn engine() -> (TaskEngine, testkit::TestPlatform) {
        let kit = testkit::platform();
        (kit.engine().clone(), kit)
    }

    #[tokio::test]
    async fn successful_workflow_finishes_at_full_progress() {
        let (engine, _kit) = engine();
        let task = engine.submit(Succeed).await;

        task.wait().await.unwrap();
        let view = task.copy().await;
        assert_eq!(view.status, TaskStatus::Finished);
        assert_eq!(view.progress.percentage, 100);
        assert_eq!(view.progress.state, "halfway");
        assert!(view.finished_at.is_some());
    }

    #[tokio::test]
    async fn failure_is_cached_for_every_waiter() {
        let (engine, _kit) = engine();
        let task = engine.submit(Fail).await;

        let first = task.wait().await.unwrap_err();
        let second = task.wait().await.unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(task.status().await, TaskStatus::Failed);
        assert_eq!(task.copy().await.error.as_deref(), Some("runtime: boom"));
    }

    #[tokio::test]
    async fn panicking_workflow_fails_task_not_engine() {
        let (engine, _kit) = engine();
        let task = engine.submit(Panic).await;

        let err = task.wait().await.unwrap_err();
        assert!(matches!(err, HarborError::WorkflowPanicked(_)));
        assert_eq!(task.status().await, TaskStatus::Failed);

        // engine still works
        engine.submit(Succeed).await.wait().await.unwrap();
    }

    #[tokio::test]
    async fn non_killable_task_rejects_kill() {
        let (engine, _kit) = engine();
        let task = engine.submit(Sleeper::forever(false)).await;

        let err = engine.kill(task.id()).await.unwrap_err();
        assert!(matches!(err, HarborError::TaskNotKillable(_)));

        task.set_killable().await;
        engine.kill(task.id()).await.unwrap();
        assert!(matches!(
            task.wait().await.unwrap_err(),
            HarborError::TaskKilled(_)
        ));
        assert_eq!(task.status().await, TaskStatus::Killed);
    }

    #[tokio::test]
    async fn rejected_kill_lets_task_finish_naturally() {
        let (engine, _kit) = engine();
        let task = engine
            .submit(Sleeper {
                killable: false,
                nap: Duration::from_millis(20),
            })
            .await;

        assert!(task.kill().await.is_err());
        assert!(!task.is_dying());
        task.wait().await.unwrap();
        assert_eq!(task.status().await, TaskStatus::Finished);
    }

    #[tokio::test]
    async fn killing_terminal_task_is_rejected() {
        let (engine, _kit) = engine();
        let task = engine.submit(Succeed).await;
        task.wait().await.unwrap();

        let err = task.kill().await.unwrap_err();
        assert!(matches!(err, HarborError::TaskAlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn child_inherits_parent_kill() {
        let (engine, _kit) = engine();
        let parent = engine.submit(Parent).await;

        // wait for the child to show up
        let child = loop {
            let all = engine.get_all().await;
            if let Some(child) = all.iter().find(|t| t.name == "sleeper") {
                break engine.get(child.id).await.unwrap();
            }
            tokio::task::yield_now().await;
        };

        parent.kill().await.unwrap();
        assert!(parent.wait().await.is_err());
        assert!(child.wait().await.is_err());
        assert_eq!(parent.status().await, TaskStatus::Killed);
        assert_eq!(child.status().await, TaskStatus::Killed);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (engine, kit) = engine();
        let id = kit.ids.generate_task_id();
        assert!(matches!(
            engine.get(id).await.err(),
            Some(HarborError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn views_are_newest_first_and_capped() {
        let mut config = testkit::config();
        config.tasks.history_limit = 3;
        let kit = testkit::platform_with(config);
        let engine = kit.engine();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let task = engine.submit(Succeed).await;
            task.wait().await.unwrap();
            ids.push(task.id());
        }

        let all = engine.get_all().await;
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, ids[4]);

        let last = engine.get_last().await;
        let last_ids: Vec<_> = last.iter().map(|t| t.id).collect();
        assert_eq!(last_ids, vec![ids[4], ids[3], ids[2]]);

        let unknown = kit.ids.generate_task_id();
        let some = engine.get_ids(&[ids[0], unknown, ids[2], ids[0]]).await;
        let some_ids: Vec<_> = some.iter().map(|t| t.id).collect();
        assert_eq!(some_ids, vec![ids[2], ids[0]]);

        assert_eq!(engine.counts().await.finished, 5);
    }

    #[tokio::test]
    async fn burst_of_tasks_is_listed_newest_first() {
        let (engine, _kit) = engine();
        let mut submitted = Vec::new();
        for _ in 0..40 {
            submitted.push(engine.submit(Succeed).await.id());
        }

        let listed: Vec<_> = engine.get_all().await.iter().map(|t| t.id).collect();
        submitted.reverse();
        assert_eq!(listed, submitted);
    }

    #[tokio::test]
    async fn unpersistable_task_wakes_waiters_and_reports_failure() {
        let (engine, kit) = engine();
        let task = engine.submit(Succeed).await;
        kit.store.set_fail_writes(true);

        let err = tokio::time::timeout(Duration::from_secs(2), task.wait())
            .await
            .expect("wait must not hang")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        // every waiter sees the same result
        assert!(task.wait().await.is_err());

        let fatal = tokio::time::timeout(Duration::from_secs(2), engine.persistence_failure())
            .await
            .expect("failure is reported");
        assert!(fatal.to_string().contains(&task.id().to_string()));
    }

    #[tokio::test]
    async fn tasks_are_persisted() {
        let (engine, kit) = engine();
        let task = engine.submit(Succeed).await;
        task.wait().await.unwrap();

        let row = kit
            .store
            .read(TASKS_DATASET, &task.id().to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["status"], "FINISHED");
    }

    #[tokio::test]
    async fn restore_marks_interrupted_tasks_failed() {
        let kit = testkit::platform();
        let now = chrono::Utc::now();

        let mut running = TaskRecord::new(kit.ids.generate_task_id(), "create app x", now);
        running.mark_in_progress();
        let mut done = TaskRecord::new(kit.ids.generate_task_id(), "stop app y", now);
        done.finish(TaskStatus::Finished, None, now);
        for r in [&running, &done] {
            kit.store
                .write(
                    TASKS_DATASET,
                    &r.id.to_string(),
                    serde_json::to_value(r).unwrap(),
                )
                .await
                .unwrap();
        }

        let engine = kit.engine();
        assert_eq!(engine.restore().await.unwrap(), 2);

        let interrupted = engine.get(running.id).await.unwrap();
        assert_eq!(interrupted.status().await, TaskStatus::Failed);
        let err = interrupted.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "interrupted by restart");
        engine.get(done.id).await.unwrap().wait().await.unwrap();

        // the FAILED transition is persisted too
        let row = kit
            .store
            .read(TASKS_DATASET, &running.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["status"], "FAILED");

        // idempotent
        assert_eq!(engine.restore().await.unwrap(), 0);
    }
}
