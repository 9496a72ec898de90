//! AppRegistry - App 集合の正本
//!
//! # 設計原則
//! - App の行は registry（`AppLedger`）だけが書く
//! - 読み取りのたびにストアを読み直し、ライブハンドルのアリーナと突き合わせる
//!   - 新しい行はハンドルを作る
//!   - 消えた行のハンドルは捨てる
//!   - 既存のハンドルは行で上書きしない（ハンドル側が常に最新）
//! - 名前の一意性チェックと IP 割り当ては create ロックの内側で行う

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{HarborConfig, InstanceConfig, InstanceRole};
use crate::domain::{
    AppId, AppRecord, AppStatus, AppView, DesiredStatus, HarborError, InstallerMetadata,
};
use crate::engine::{Task, TaskEngine};
use crate::ports::{AppStore, Clock, IdGenerator, Ports, SandboxStatus};
use crate::workflows::{
    CreateAppRequest, CreateAppWorkflow, RemoveAppWorkflow, StartAppWorkflow, StopAppWorkflow,
};

use super::app::{App, AppDeps};
use super::ip;
use super::ledger::AppLedger;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub started: Vec<AppId>,
    pub stopped: Vec<AppId>,
    /// Orphan sandboxes removed.
    pub collected: Vec<String>,
    pub failures: Vec<RefreshFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshFailure {
    /// App id or sandbox id.
    pub target: String,
    pub error: String,
}

impl RefreshReport {
    fn fail(&mut self, target: impl Into<String>, error: &HarborError) {
        self.failures.push(RefreshFailure {
            target: target.into(),
            error: error.to_string(),
        });
    }
}

#[derive(Clone)]
pub struct AppRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    instance: InstanceConfig,
    dev_mode: bool,
    deps: Arc<AppDeps>,
    app_store: Arc<dyn AppStore>,
    engine: TaskEngine,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    live: Mutex<HashMap<AppId, Arc<App>>>,
    create_lock: Mutex<()>,
    refresh_lock: Mutex<()>,
}

impl AppRegistry {
    pub(crate) fn new(config: &HarborConfig, ports: &Ports, engine: TaskEngine) -> Self {
        let deps = AppDeps {
            ledger: AppLedger::new(ports.store.clone(), ports.publisher.clone()),
            runtime: ports.runtime.clone(),
            capabilities: ports.capabilities.clone(),
            resources: ports.resources.clone(),
        };
        Self {
            inner: Arc::new(RegistryInner {
                instance: config.instance.clone(),
                dev_mode: config.dev_mode,
                deps: Arc::new(deps),
                app_store: ports.app_store.clone(),
                engine,
                ids: ports.ids.clone(),
                clock: ports.clock.clone(),
                live: Mutex::new(HashMap::new()),
                create_lock: Mutex::new(()),
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    pub fn engine(&self) -> &TaskEngine {
        &self.inner.engine
    }

    pub fn instance_name(&self) -> &str {
        &self.inner.instance.name
    }

    pub(crate) fn app_store(&self) -> Arc<dyn AppStore> {
        self.inner.app_store.clone()
    }

    pub(crate) fn dev_mode(&self) -> bool {
        self.inner.dev_mode
    }

    /// Re-read the dataset and reconcile it with the arena.
    async fn load_all(&self) -> Result<Vec<Arc<App>>, HarborError> {
        let rows = self.inner.deps.ledger.rows().await?;
        let mut live = self.inner.live.lock().await;
        live.retain(|id, _| rows.contains_key(id));

        let apps = rows
            .into_iter()
            .map(|(id, record)| {
                live.entry(id)
                    .or_insert_with(|| Arc::new(App::new(record, self.inner.deps.clone())))
                    .clone()
            })
            .collect();
        Ok(apps)
    }

    /// Create and persist a new app row.
    ///
    /// Name uniqueness and IP allocation happen under one lock, so concurrent
    /// creates never share a name or an address.
    pub async fn create(
        &self,
        installer_id: &str,
        version: &str,
        name: &str,
        params: BTreeMap<String, String>,
        metadata: &InstallerMetadata,
    ) -> Result<Arc<App>, HarborError> {
        if name.trim().is_empty() {
            return Err(HarborError::InvalidArgument("app name is required".into()));
        }
        if installer_id.trim().is_empty() {
            return Err(HarborError::InvalidArgument(
                "installer id is required".into(),
            ));
        }

        let _guard = self.inner.create_lock.lock().await;
        let apps = self.load_all().await?;

        let mut used_ips = Vec::with_capacity(apps.len());
        for app in &apps {
            let record = app.snapshot().await;
            if record.name == name {
                return Err(HarborError::DuplicateName(name.to_string()));
            }
            used_ips.extend(record.ip);
        }
        let ip = ip::allocate(&self.inner.instance.network, used_ips)?;

        let capabilities = metadata
            .capabilities
            .iter()
            .filter(|c| {
                let known = self.inner.deps.capabilities.resolve(c.as_str()).is_some();
                if !known {
                    warn!(app = %name, capability = %c, "unknown capability requested, not granted");
                }
                known
            })
            .cloned()
            .collect();

        let record = AppRecord {
            id: self.inner.ids.generate_app_id(),
            name: name.to_string(),
            installer_ref: installer_id.to_string(),
            version: version.to_string(),
            instance_name: self.inner.instance.name.clone(),
            ip: Some(ip),
            desired_status: DesiredStatus::Stopped,
            status: AppStatus::Creating,
            capabilities,
            resources: Vec::new(),
            tasks: Vec::new(),
            public_ports: metadata.public_ports.clone(),
            installer_params: params,
            persistence: metadata.persistence,
            volume_id: None,
            installer: metadata.clone(),
            created_at: self.inner.clock.now(),
        };
        self.inner
            .deps
            .ledger
            .insert(&record)
            .await
            .map_err(|e| e.context(format!("app {name}")))?;

        let app = Arc::new(App::new(record, self.inner.deps.clone()));
        self.inner.live.lock().await.insert(app.id(), app.clone());
        info!(app = %app.id(), %name, %ip, installer = %installer_id, %version, "app created");
        Ok(app)
    }

    /// Submit a CreateApp task.
    ///
    /// # Panics
    /// If the installer id or name is empty.
    pub async fn create_async(&self, req: CreateAppRequest) -> Arc<Task> {
        assert!(!req.installer_id.trim().is_empty(), "installer id is required");
        assert!(!req.name.trim().is_empty(), "app name is required");
        self.inner
            .engine
            .submit(CreateAppWorkflow::new(self.clone(), req))
            .await
    }

    pub async fn start_async(&self, id: AppId) -> Result<Arc<Task>, HarborError> {
        let app = self.get_by_id(id).await?;
        Ok(self.inner.engine.submit(StartAppWorkflow::new(app)).await)
    }

    pub async fn stop_async(&self, id: AppId) -> Result<Arc<Task>, HarborError> {
        let app = self.get_by_id(id).await?;
        Ok(self.inner.engine.submit(StopAppWorkflow::new(app)).await)
    }

    pub async fn remove_async(&self, id: AppId) -> Result<Arc<Task>, HarborError> {
        let app = self.get_by_id(id).await?;
        Ok(self
            .inner
            .engine
            .submit(RemoveAppWorkflow::new(self.clone(), app.id()))
            .await)
    }

    pub async fn read(&self, id: AppId) -> Result<AppView, HarborError> {
        Ok(self.get_by_id(id).await?.view().await)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<App>, HarborError> {
        for app in self.load_all().await? {
            if app.name().await == name {
                return Ok(app);
            }
        }
        Err(HarborError::AppNotFound(name.to_string()))
    }

    pub async fn get_by_id(&self, id: AppId) -> Result<Arc<App>, HarborError> {
        self.load_all()
            .await?
            .into_iter()
            .find(|app| app.id() == id)
            .ok_or_else(|| HarborError::AppNotFound(id.to_string()))
    }

    /// Snapshots of every app row.
    pub async fn get_all(&self) -> Result<Vec<AppRecord>, HarborError> {
        let mut records = Vec::new();
        for app in self.load_all().await? {
            records.push(app.snapshot().await);
        }
        Ok(records)
    }

    /// Views of every app, safe to serialize.
    pub async fn copy_all(&self) -> Result<Vec<AppView>, HarborError> {
        let mut views = Vec::new();
        for app in self.load_all().await? {
            views.push(app.view().await);
        }
        Ok(views)
    }

    pub async fn select(
        &self,
        pred: impl Fn(&AppRecord) -> bool,
    ) -> Result<Vec<AppRecord>, HarborError> {
        Ok(self.get_all().await?.into_iter().filter(|r| pred(r)).collect())
    }

    /// Declare the app should run. The next refresh converges it.
    pub async fn start(&self, name: &str) -> Result<(), HarborError> {
        self.get(name)
            .await?
            .set_desired_status(DesiredStatus::Running)
            .await;
        Ok(())
    }

    /// Declare the app should be stopped.
    pub async fn stop(&self, name: &str) -> Result<(), HarborError> {
        self.get(name)
            .await?
            .set_desired_status(DesiredStatus::Stopped)
            .await;
        Ok(())
    }

    /// Delete the app row. The app must be declared stopped.
    pub async fn remove(&self, id: AppId) -> Result<(), HarborError> {
        let app = self.get_by_id(id).await?;
        app.delete_row().await?;
        app.close_msgq().await;
        self.inner.live.lock().await.remove(&id);
        info!(app = %id, "app removed");
        Ok(())
    }

    /// Converge actual sandbox state toward desired state, then remove
    /// sandboxes that no app row accounts for.
    ///
    /// Per-app failures are logged and reported; the pass keeps going.
    pub async fn refresh(&self) -> Result<RefreshReport, HarborError> {
        let mut report = RefreshReport::default();
        if self.inner.instance.role != InstanceRole::Hosting {
            debug!(role = ?self.inner.instance.role, "not a hosting instance, skipping refresh");
            return Ok(report);
        }

        let _guard = self.inner.refresh_lock.lock().await;
        let apps = self.load_all().await?;
        let mut known = HashSet::with_capacity(apps.len());

        for app in &apps {
            let record = app.snapshot().await;
            known.insert(record.sandbox_id());
            if record.instance_name != self.inner.instance.name {
                continue;
            }

            let actual = match app.actual_status().await {
                Ok(actual) => actual,
                Err(e) => {
                    warn!(app = %record.id, error = %e, "failed to read sandbox state");
                    report.fail(record.id.to_string(), &e);
                    continue;
                }
            };

            match (record.desired_status, actual) {
                (DesiredStatus::Running, SandboxStatus::Stopped) => match app.start().await {
                    Ok(()) => report.started.push(record.id),
                    Err(e) => {
                        warn!(app = %record.id, name = %record.name, error = %e, "failed to start app");
                        report.fail(record.id.to_string(), &e);
                    }
                },
                (DesiredStatus::Stopped, SandboxStatus::Running) => match app.stop().await {
                    Ok(()) => report.stopped.push(record.id),
                    Err(e) => {
                        warn!(app = %record.id, name = %record.name, error = %e, "failed to stop app");
                        report.fail(record.id.to_string(), &e);
                    }
                },
                _ => {}
            }
        }

        self.collect_orphans(&known, &mut report).await;

        if !report.started.is_empty()
            || !report.stopped.is_empty()
            || !report.collected.is_empty()
            || !report.failures.is_empty()
        {
            info!(
                started = report.started.len(),
                stopped = report.stopped.len(),
                collected = report.collected.len(),
                failures = report.failures.len(),
                "refresh done"
            );
        }
        Ok(report)
    }

    async fn collect_orphans(&self, known: &HashSet<String>, report: &mut RefreshReport) {
        let runtime = &self.inner.deps.runtime;
        let sandboxes = match runtime.list_sandboxes().await {
            Ok(sandboxes) => sandboxes,
            Err(e) => {
                warn!(error = %e, "failed to list sandboxes");
                report.fail("sandboxes", &e);
                return;
            }
        };

        for sandbox in sandboxes {
            if known.contains(&sandbox.id) {
                continue;
            }
            warn!(sandbox = %sandbox.id, "removing orphan sandbox");
            if sandbox.status == SandboxStatus::Running {
                if let Err(e) = runtime.stop_sandbox(&sandbox.id).await {
                    warn!(sandbox = %sandbox.id, error = %e, "failed to stop orphan sandbox");
                    report.fail(sandbox.id, &e);
                    continue;
                }
            }
            match runtime.remove_sandbox(&sandbox.id).await {
                Ok(()) => report.collected.push(sandbox.id),
                Err(e) => {
                    warn!(sandbox = %sandbox.id, error = %e, "failed to remove orphan sandbox");
                    report.fail(sandbox.id, &e);
                }
            }
        }
    }
}
