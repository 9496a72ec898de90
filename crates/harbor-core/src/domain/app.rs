//! App record - 永続化される App の行
//!
//! # 設計原則
//! - `AppRecord` は registry だけが書き込む正本の行
//! - 実際の状態（sandbox の状態）はここには保存しない。必要なときに runtime に問い合わせる
//! - 外部へ渡すのは `AppView`（フィールド単位のコピー）

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AppId, TaskId};
use super::installer::{InstallerMetadata, PublicPort};

/// User/operator-declared target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredStatus {
    Running,
    Stopped,
}

impl fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesiredStatus::Running => f.write_str("running"),
            DesiredStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// Lifecycle status reported by workflows (CreateApp marks Running/Failed).
///
/// Not the actual sandbox state; see `App::actual_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Creating,
    Running,
    Stopped,
    Failed,
}

/// One persisted app row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: AppId,
    pub name: String,
    pub installer_ref: String,
    pub version: String,
    /// Instance hosting this app.
    pub instance_name: String,
    pub ip: Option<Ipv4Addr>,
    pub desired_status: DesiredStatus,
    pub status: AppStatus,
    /// Granted capability names.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Owned resource IDs (weak references into the resource manager).
    #[serde(default)]
    pub resources: Vec<String>,
    /// Task IDs kept for UI correlation only.
    #[serde(default)]
    pub tasks: Vec<TaskId>,
    #[serde(default)]
    pub public_ports: Vec<PublicPort>,
    #[serde(default)]
    pub installer_params: BTreeMap<String, String>,
    #[serde(default)]
    pub persistence: bool,
    #[serde(default)]
    pub volume_id: Option<String>,
    /// Metadata the app was created from; used to materialize its sandbox.
    pub installer: InstallerMetadata,
    pub created_at: DateTime<Utc>,
}

impl AppRecord {
    /// Sandbox ids are the app id's display form.
    pub fn sandbox_id(&self) -> String {
        self.id.to_string()
    }

    /// Does this app declare providing the given resource type?
    pub fn provides(&self, resource_type: &str) -> bool {
        self.installer.provides.iter().any(|t| t == resource_type)
    }
}

/// Immutable projection of an app for the API / WS relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppView {
    pub id: AppId,
    pub name: String,
    pub installer_ref: String,
    pub version: String,
    pub instance_name: String,
    pub ip: Option<Ipv4Addr>,
    pub desired_status: DesiredStatus,
    pub status: AppStatus,
    pub capabilities: Vec<String>,
    pub resources: Vec<String>,
    pub tasks: Vec<TaskId>,
    pub public_ports: Vec<PublicPort>,
    pub persistence: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&AppRecord> for AppView {
    fn from(r: &AppRecord) -> Self {
        AppView {
            id: r.id,
            name: r.name.clone(),
            installer_ref: r.installer_ref.clone(),
            version: r.version.clone(),
            instance_name: r.instance_name.clone(),
            ip: r.ip,
            desired_status: r.desired_status,
            status: r.status,
            capabilities: r.capabilities.clone(),
            resources: r.resources.clone(),
            tasks: r.tasks.clone(),
            public_ports: r.public_ports.clone(),
            persistence: r.persistence,
            created_at: r.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn record() -> AppRecord {
        AppRecord {
            id: AppId::from_ulid(Ulid::new()),
            name: "notes".into(),
            installer_ref: "inst-notes".into(),
            version: "1.0".into(),
            instance_name: "local".into(),
            ip: Some(Ipv4Addr::new(10, 100, 0, 4)),
            desired_status: DesiredStatus::Stopped,
            status: AppStatus::Creating,
            capabilities: vec![],
            resources: vec![],
            tasks: vec![],
            public_ports: vec![],
            installer_params: BTreeMap::from([("secret".into(), "hunter2".into())]),
            persistence: false,
            volume_id: None,
            installer: InstallerMetadata::new("notes:1.0").providing("dns"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&DesiredStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(serde_json::to_string(&AppStatus::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn view_does_not_carry_installer_params() {
        let view = AppView::from(&record());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("installer_params").is_none());
        assert_eq!(json["name"], "notes");
    }

    #[test]
    fn provides_checks_installer_metadata() {
        let r = record();
        assert!(r.provides("dns"));
        assert!(!r.provides("certificate"));
    }
}
