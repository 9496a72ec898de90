//! Store port - 永続化（dataset 名 + row id で行を読み書き）
//!
//! # 設計原則
//! - 行は `serde_json::Value` で受け渡す（エンコードはストア実装の関心事）
//! - registry と engine がそれぞれ自分の dataset の唯一の書き手

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::HarborError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, dataset: &str, id: &str) -> Result<Option<serde_json::Value>, HarborError>;

    /// All rows of a dataset keyed by row id.
    async fn read_all(
        &self,
        dataset: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, HarborError>;

    async fn write(&self, dataset: &str, id: &str, row: serde_json::Value)
    -> Result<(), HarborError>;

    async fn delete(&self, dataset: &str, id: &str) -> Result<(), HarborError>;
}

/// Encode a typed row.
pub fn encode_row<T: Serialize>(row: &T) -> Result<serde_json::Value, HarborError> {
    serde_json::to_value(row).map_err(|e| HarborError::Store(format!("encode row: {e}")))
}

/// Decode a typed row, naming the row in the error.
pub fn decode_row<T: DeserializeOwned>(
    dataset: &str,
    id: &str,
    row: serde_json::Value,
) -> Result<T, HarborError> {
    serde_json::from_value(row)
        .map_err(|e| HarborError::Store(format!("decode {dataset}/{id}: {e}")))
}

/// Panic payload raised when a required row write fails.
///
/// The engine recognizes it and treats the failure as fatal for the whole
/// platform instead of failing one task.
#[derive(Debug, Clone)]
pub struct PersistenceFailure {
    pub dataset: &'static str,
    pub id: String,
    pub error: HarborError,
}

impl PersistenceFailure {
    pub fn raise(self) -> ! {
        std::panic::panic_any(self)
    }
}

impl fmt::Display for PersistenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to persist {}/{}: {}", self.dataset, self.id, self.error)
    }
}

/// Encode and write one typed row.
pub async fn write_row<T: Serialize + Sync>(
    store: &dyn Store,
    dataset: &str,
    id: &str,
    row: &T,
) -> Result<(), HarborError> {
    store.write(dataset, id, encode_row(row)?).await
}
