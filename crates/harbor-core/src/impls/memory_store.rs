//! MemoryStore - 開発・テスト用のストア
//!
//! dataset ごとに `BTreeMap<row_id, Value>` を持つ。
//! `set_fail_writes`（全体）/ `fail_writes_to`（dataset 単位）で書き込み失敗を注入できる。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::HarborError;
use crate::ports::Store;

#[derive(Default)]
pub struct MemoryStore {
    datasets: RwLock<HashMap<String, BTreeMap<String, serde_json::Value>>>,
    fail_writes: AtomicBool,
    failing_datasets: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write/delete fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write/delete to one dataset fail.
    pub fn fail_writes_to(&self, dataset: &str) {
        self.failing_datasets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dataset.to_string());
    }

    /// Number of rows in a dataset.
    pub async fn len(&self, dataset: &str) -> usize {
        self.datasets
            .read()
            .await
            .get(dataset)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn check_writable(&self, dataset: &str) -> Result<(), HarborError> {
        let dataset_failing = self
            .failing_datasets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(dataset);
        if dataset_failing || self.fail_writes.load(Ordering::SeqCst) {
            return Err(HarborError::Store(format!("write to {dataset} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, dataset: &str, id: &str) -> Result<Option<serde_json::Value>, HarborError> {
        let datasets = self.datasets.read().await;
        Ok(datasets.get(dataset).and_then(|rows| rows.get(id)).cloned())
    }

    async fn read_all(
        &self,
        dataset: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, HarborError> {
        let datasets = self.datasets.read().await;
        Ok(datasets.get(dataset).cloned().unwrap_or_default())
    }

    async fn write(
        &self,
        dataset: &str,
        id: &str,
        row: serde_json::Value,
    ) -> Result<(), HarborError> {
        self.check_writable(dataset)?;
        let mut datasets = self.datasets.write().await;
        datasets
            .entry(dataset.to_string())
            .or_default()
            .insert(id.to_string(), row);
        Ok(())
    }

    async fn delete(&self, dataset: &str, id: &str) -> Result<(), HarborError> {
        self.check_writable(dataset)?;
        let mut datasets = self.datasets.write().await;
        if let Some(rows) = datasets.get_mut(dataset) {
            rows.remove(id);
        }
        Ok(())
    }
}
