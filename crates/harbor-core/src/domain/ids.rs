//! Domain identifiers (strongly-typed IDs).
//!
//! App と Task の ID は ULID ベースで、Phantom type で型を分けています。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: Task 履歴の「新しい順」ビューはこの順序に依存する
//! - **分散生成可能**: 調整なしで生成できる
//!
//! Display は `app-01H...` / `task-01H...` の形式で、ストアの row id にもこの文字列を使います。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

use super::errors::HarborError;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "app-", "task-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `AppId` と `TaskId` は異なる型なので混同できない。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// `app-01H...` 形式（プレフィックス省略も可）をパース
impl<T: IdMarker> FromStr for Id<T> {
    type Err = HarborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|e| HarborError::InvalidArgument(format!("malformed id '{s}': {e}")))
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// App のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum App {}

impl IdMarker for App {
    fn prefix() -> &'static str {
        "app-"
    }
}

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Identifier of an App (one application instance on this platform).
pub type AppId = Id<App>;

/// Identifier of a Task (one asynchronous workflow execution).
pub type TaskId = Id<Task>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_type_prefix() {
        let app = AppId::from_ulid(Ulid::new());
        let task = TaskId::from_ulid(Ulid::new());

        assert!(app.to_string().starts_with("app-"));
        assert!(task.to_string().starts_with("task-"));
    }

    #[test]
    fn parses_back_from_display_form() {
        let id = TaskId::from_ulid(Ulid::new());
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        // プレフィックスなしでも受け付ける
        let bare: TaskId = id.as_ulid().to_string().parse().unwrap();
        assert_eq!(bare, id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "app-not-a-ulid".parse::<AppId>().unwrap_err();
        assert!(matches!(err, HarborError::InvalidArgument(_)));
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn serializes_as_plain_ulid_string() {
        let id = AppId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));

        let back: AppId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
