//! MemoryRuntime - 開発・テスト用の sandbox ランタイム
//!
//! # 実装詳細
//! - sandbox / image / volume を tokio Mutex の内側で管理
//! - 失敗注入: `fail_create_for` / `fail_start_for` / `fail_pull_for`
//! - `calls()` で呼び出し履歴（"start app-..." など）を確認できる

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::HarborError;
use crate::ports::{RuntimePlatform, SandboxInfo, SandboxSpec, SandboxStatus};

#[derive(Default)]
struct RuntimeState {
    sandboxes: BTreeMap<String, SandboxInfo>,
    images: HashSet<String>,
    volumes: BTreeMap<String, String>,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    fail_pull: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct MemoryRuntime {
    state: Mutex<RuntimeState>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.state.get_mut().images.insert(image.to_string());
        self
    }

    /// Mark an image as locally available.
    pub async fn add_image(&self, image: &str) {
        self.state.lock().await.images.insert(image.to_string());
    }

    /// Register a sandbox directly (e.g. one left behind by a removed app).
    pub async fn insert_sandbox(&self, info: SandboxInfo) {
        self.state
            .lock()
            .await
            .sandboxes
            .insert(info.id.clone(), info);
    }

    /// Sandbox creation fails for this app name.
    pub async fn fail_create_for(&self, app_name: &str) {
        self.state
            .lock()
            .await
            .fail_create
            .insert(app_name.to_string());
    }

    /// Starting this sandbox id fails.
    pub async fn fail_start_for(&self, id: &str) {
        self.state.lock().await.fail_start.insert(id.to_string());
    }

    pub async fn fail_pull_for(&self, image: &str) {
        self.state.lock().await.fail_pull.insert(image.to_string());
    }

    pub async fn sandbox(&self, id: &str) -> Option<SandboxInfo> {
        self.state.lock().await.sandboxes.get(id).cloned()
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl RuntimePlatform for MemoryRuntime {
    async fn get_sandbox(&self, id: &str) -> Result<Option<SandboxInfo>, HarborError> {
        Ok(self.state.lock().await.sandboxes.get(id).cloned())
    }

    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>, HarborError> {
        Ok(self.state.lock().await.sandboxes.values().cloned().collect())
    }

    async fn create_sandbox(&self, spec: SandboxSpec) -> Result<SandboxInfo, HarborError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("create {}", spec.id));
        if state.fail_create.contains(&spec.app_name) {
            return Err(HarborError::Runtime(format!(
                "create sandbox for {} failed",
                spec.app_name
            )));
        }
        if state.sandboxes.contains_key(&spec.id) {
            return Err(HarborError::Runtime(format!(
                "sandbox {} already exists",
                spec.id
            )));
        }
        if !state.images.contains(&spec.image) {
            return Err(HarborError::Runtime(format!(
                "image {} not available",
                spec.image
            )));
        }
        let info = SandboxInfo {
            id: spec.id.clone(),
            status: SandboxStatus::Stopped,
            ip: spec.ip,
            volume_id: spec.volume_id,
        };
        state.sandboxes.insert(spec.id, info.clone());
        Ok(info)
    }

    async fn start_sandbox(&self, id: &str) -> Result<(), HarborError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("start {id}"));
        if state.fail_start.contains(id) {
            return Err(HarborError::Runtime(format!("start {id} failed")));
        }
        let sandbox = state
            .sandboxes
            .get_mut(id)
            .ok_or_else(|| HarborError::Runtime(format!("sandbox {id} not found")))?;
        sandbox.status = SandboxStatus::Running;
        Ok(())
    }

    async fn stop_sandbox(&self, id: &str) -> Result<(), HarborError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("stop {id}"));
        let sandbox = state
            .sandboxes
            .get_mut(id)
            .ok_or_else(|| HarborError::Runtime(format!("sandbox {id} not found")))?;
        sandbox.status = SandboxStatus::Stopped;
        Ok(())
    }

    async fn remove_sandbox(&self, id: &str) -> Result<(), HarborError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("remove {id}"));
        state
            .sandboxes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| HarborError::Runtime(format!("sandbox {id} not found")))
    }

    async fn has_image(&self, image: &str) -> Result<bool, HarborError> {
        Ok(self.state.lock().await.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), HarborError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("pull {image}"));
        if state.fail_pull.contains(image) {
            return Err(HarborError::Runtime(format!("pull {image} failed")));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn get_or_create_volume(&self, name: &str) -> Result<String, HarborError> {
        let mut state = self.state.lock().await;
        let volume = state
            .volumes
            .entry(name.to_string())
            .or_insert_with(|| format!("vol-{name}"))
            .clone();
        Ok(volume)
    }
}
