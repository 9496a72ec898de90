//! App - 1 アプリのライブハンドル
//!
//! # 設計原則
//! - registry のアリーナに 1 ID につき 1 つだけ存在する
//! - 行の変更はすべてハンドルのロックを握ったまま保存する（保存順 = 変更順）
//! - sandbox の実際の状態は保存せず、必要なときに runtime に問い合わせる
//! - 行を削除したハンドルは `removed` になり、以後の変更は保存しない（削除済みの行を蘇らせない）
//! - registry への逆参照は持たない。必要なコラボレータは `AppDeps` で共有する

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::domain::{AppId, AppRecord, AppStatus, AppView, DesiredStatus, HarborError, TaskId};
use crate::ports::{
    CapabilityManager, Resource, ResourceManager, RuntimePlatform, SandboxInfo, SandboxSpec,
    SandboxStatus,
};

use super::ledger::AppLedger;

/// Collaborators shared by the registry and every app handle.
pub(crate) struct AppDeps {
    pub(crate) ledger: AppLedger,
    pub(crate) runtime: Arc<dyn RuntimePlatform>,
    pub(crate) capabilities: Arc<dyn CapabilityManager>,
    pub(crate) resources: Arc<dyn ResourceManager>,
}

pub struct App {
    id: AppId,
    record: Mutex<AppRecord>,
    deps: Arc<AppDeps>,
    /// Push channel to the app's sandbox, if one is connected.
    msgq: Mutex<Option<mpsc::Sender<serde_json::Value>>>,
    /// Set under the record lock once the row is deleted.
    removed: AtomicBool,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").field("id", &self.id).finish_non_exhaustive()
    }
}

impl App {
    pub(crate) fn new(record: AppRecord, deps: Arc<AppDeps>) -> Self {
        Self {
            id: record.id,
            record: Mutex::new(record),
            deps,
            msgq: Mutex::new(None),
            removed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> AppId {
        self.id
    }

    pub async fn snapshot(&self) -> AppRecord {
        self.record.lock().await.clone()
    }

    pub async fn view(&self) -> AppView {
        AppView::from(&*self.record.lock().await)
    }

    pub async fn name(&self) -> String {
        self.record.lock().await.name.clone()
    }

    pub async fn desired_status(&self) -> DesiredStatus {
        self.record.lock().await.desired_status
    }

    pub async fn status(&self) -> AppStatus {
        self.record.lock().await.status
    }

    /// Has this app's row been deleted?
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    async fn mutate(&self, f: impl FnOnce(&mut AppRecord)) {
        let mut record = self.record.lock().await;
        if self.is_removed() {
            warn!(app = %self.id, "app was removed, dropping late update");
            return;
        }
        f(&mut record);
        self.deps.ledger.save(&record).await;
    }

    pub async fn set_status(&self, status: AppStatus) {
        self.mutate(|r| r.status = status).await;
        debug!(app = %self.id, ?status, "app status updated");
    }

    pub async fn set_desired_status(&self, desired: DesiredStatus) {
        self.mutate(|r| r.desired_status = desired).await;
        info!(app = %self.id, %desired, "desired status updated");
    }

    /// Record a task that acted on this app.
    ///
    /// # Panics
    /// If the row can't be persisted.
    pub async fn add_task(&self, task: TaskId) {
        self.mutate(|r| {
            if !r.tasks.contains(&task) {
                r.tasks.push(task);
            }
        })
        .await;
    }

    pub async fn sandbox(&self) -> Result<Option<SandboxInfo>, HarborError> {
        self.deps
            .runtime
            .get_sandbox(&self.id.to_string())
            .await
            .map_err(|e| e.context(format!("app {}", self.id)))
    }

    /// Observed sandbox state. An app without a sandbox is stopped.
    pub async fn actual_status(&self) -> Result<SandboxStatus, HarborError> {
        Ok(self
            .sandbox()
            .await?
            .map(|s| s.status)
            .unwrap_or(SandboxStatus::Stopped))
    }

    /// Materialize the sandbox: volume, image, then the sandbox itself.
    pub async fn create_sandbox(&self) -> Result<SandboxInfo, HarborError> {
        let record = self.snapshot().await;
        let runtime = &self.deps.runtime;
        let ctx = |e: HarborError| e.context(format!("app {}", record.name));

        let volume_id = if record.persistence {
            Some(
                runtime
                    .get_or_create_volume(&record.sandbox_id())
                    .await
                    .map_err(ctx)?,
            )
        } else {
            None
        };

        let image = &record.installer.image;
        if !runtime.has_image(image).await.map_err(ctx)? {
            info!(app = %self.id, %image, "pulling image");
            runtime.pull_image(image).await.map_err(ctx)?;
        }

        let spec = SandboxSpec {
            id: record.sandbox_id(),
            app_name: record.name.clone(),
            image: image.clone(),
            ip: record.ip,
            volume_id: volume_id.clone(),
            env: record.installer_params.clone(),
            public_ports: record.public_ports.clone(),
        };
        let info = runtime.create_sandbox(spec).await.map_err(ctx)?;

        let ip = info.ip;
        let volume = info.volume_id.clone().or(volume_id);
        self.mutate(|r| {
            if ip.is_some() {
                r.ip = ip;
            }
            r.volume_id = volume;
        })
        .await;
        info!(app = %self.id, name = %record.name, sandbox = %info.id, "sandbox created");
        Ok(info)
    }

    /// Bring the sandbox up, creating it first if needed.
    pub async fn start(&self) -> Result<(), HarborError> {
        let sandbox = match self.sandbox().await? {
            Some(sandbox) => sandbox,
            None => self.create_sandbox().await?,
        };
        if sandbox.status == SandboxStatus::Running {
            debug!(app = %self.id, "sandbox already running");
            return Ok(());
        }
        self.deps
            .runtime
            .start_sandbox(&sandbox.id)
            .await
            .map_err(|e| e.context(format!("app {}", self.id)))?;
        info!(app = %self.id, "sandbox started");
        Ok(())
    }

    /// Stop and remove the sandbox. No sandbox is not an error.
    pub async fn stop(&self) -> Result<(), HarborError> {
        let Some(sandbox) = self.sandbox().await? else {
            info!(app = %self.id, "no sandbox, nothing to stop");
            return Ok(());
        };
        let runtime = &self.deps.runtime;
        let ctx = |e: HarborError| e.context(format!("app {}", self.id));
        if sandbox.status == SandboxStatus::Running {
            runtime.stop_sandbox(&sandbox.id).await.map_err(ctx)?;
        }
        runtime.remove_sandbox(&sandbox.id).await.map_err(ctx)?;
        info!(app = %self.id, "sandbox stopped and removed");
        Ok(())
    }

    /// Ok if any granted capability satisfies `capability`.
    pub async fn validate_capability(&self, capability: &str) -> Result<(), HarborError> {
        let record = self.record.lock().await;
        let caps = &self.deps.capabilities;
        if record
            .capabilities
            .iter()
            .any(|granted| caps.validate(capability, granted))
        {
            return Ok(());
        }
        Err(HarborError::CapabilityNotSatisfied {
            app: record.name.clone(),
            capability: capability.to_string(),
        })
    }

    /// Create a resource owned by this app. Needs `resource.<type>`.
    pub async fn create_resource(
        &self,
        resource_type: &str,
        value: serde_json::Value,
    ) -> Result<Resource, HarborError> {
        self.validate_capability(&format!("resource.{resource_type}"))
            .await?;
        let resource = self
            .deps
            .resources
            .create(self.id, resource_type, value)
            .await?;
        let id = resource.id.clone();
        self.mutate(|r| r.resources.push(id)).await;
        info!(app = %self.id, resource = %resource.id, %resource_type, "resource created");
        Ok(resource)
    }

    /// Resources this app still references.
    pub async fn resources(&self) -> Result<Vec<Resource>, HarborError> {
        let owned = self.record.lock().await.resources.clone();
        let all = self.deps.resources.select(self.id).await?;
        Ok(all.into_iter().filter(|r| owned.contains(&r.id)).collect())
    }

    /// Attach the push channel, replacing any previous one.
    pub async fn set_msgq(&self, tx: mpsc::Sender<serde_json::Value>) {
        *self.msgq.lock().await = Some(tx);
        debug!(app = %self.id, "message channel attached");
    }

    pub async fn close_msgq(&self) {
        if self.msgq.lock().await.take().is_some() {
            debug!(app = %self.id, "message channel closed");
        }
    }

    /// Best-effort push. A full channel drops the message.
    pub async fn send_msg(&self, msg: serde_json::Value) -> Result<(), HarborError> {
        let mut guard = self.msgq.lock().await;
        let Some(tx) = guard.as_ref() else {
            return Err(HarborError::MsgQueueClosed(self.id.to_string()));
        };
        match tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(app = %self.id, "message channel full, dropping message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *guard = None;
                Err(HarborError::MsgQueueClosed(self.id.to_string()))
            }
        }
    }

    /// Delete the row, holding the record lock so the desired status can't
    /// change between the check and the delete.
    pub(crate) async fn delete_row(&self) -> Result<(), HarborError> {
        let record = self.record.lock().await;
        if record.desired_status != DesiredStatus::Stopped {
            return Err(HarborError::AppNotStopped {
                id: self.id.to_string(),
                desired: record.desired_status.to_string(),
            });
        }
        self.deps.ledger.delete(self.id).await?;
        self.removed.store(true, Ordering::Release);
        Ok(())
    }
}
