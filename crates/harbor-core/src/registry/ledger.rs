//! AppLedger - "apps" dataset の唯一の書き手
//!
//! 書き込みのたびに UpdatePublisher へイベントを流す。
//! 既存行の保存に失敗した場合はプロセス状態が壊れているとみなして panic する。

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::error;

use crate::domain::{AppId, AppRecord, AppView, DomainEvent, HarborError};
use crate::ports::store::{PersistenceFailure, decode_row, write_row};
use crate::ports::{Store, UpdatePublisher};

pub(crate) const APPS_DATASET: &str = "apps";

pub(crate) struct AppLedger {
    store: Arc<dyn Store>,
    publisher: Arc<dyn UpdatePublisher>,
}

impl AppLedger {
    pub(crate) fn new(store: Arc<dyn Store>, publisher: Arc<dyn UpdatePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Every persisted row, keyed (and therefore ordered) by app id.
    pub(crate) async fn rows(&self) -> Result<BTreeMap<AppId, AppRecord>, HarborError> {
        let rows = self.store.read_all(APPS_DATASET).await?;
        rows.into_iter()
            .map(|(key, row)| {
                let record: AppRecord = decode_row(APPS_DATASET, &key, row)?;
                Ok((record.id, record))
            })
            .collect()
    }

    /// Persist a brand new row.
    pub(crate) async fn insert(&self, record: &AppRecord) -> Result<(), HarborError> {
        write_row(&*self.store, APPS_DATASET, &record.id.to_string(), record).await?;
        self.publisher
            .publish(DomainEvent::AppCreated(AppView::from(record)));
        Ok(())
    }

    /// Persist a mutation of an existing row.
    ///
    /// # Panics
    /// With a [`PersistenceFailure`] payload if the store rejects the write.
    pub(crate) async fn save(&self, record: &AppRecord) {
        let id = record.id.to_string();
        if let Err(error) = write_row(&*self.store, APPS_DATASET, &id, record).await {
            error!(app = %id, name = %record.name, %error, "failed to persist app");
            PersistenceFailure {
                dataset: APPS_DATASET,
                id,
                error,
            }
            .raise();
        }
        self.publisher
            .publish(DomainEvent::AppUpdated(AppView::from(record)));
    }

    pub(crate) async fn delete(&self, id: AppId) -> Result<(), HarborError> {
        self.store.delete(APPS_DATASET, &id.to_string()).await?;
        self.publisher.publish(DomainEvent::AppRemoved(id));
        Ok(())
    }
}
