//! Notification delivery.

use std::sync::Arc;

use async_trait::async_trait;
use slam_core::NewNotification;
use slam_inventory::{InventoryStore, StoreError};

use crate::retry::RetryPolicy;

/// Receives notifications raised by reconciliation passes.
///
/// Delivery failures are the sink's concern; `emit` never fails the pass.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, notification: NewNotification);
}

/// Persists notifications into the inventory store.
pub struct StoreSink {
    store: Arc<dyn InventoryStore>,
    retry: RetryPolicy,
}

impl StoreSink {
    pub fn new(store: Arc<dyn InventoryStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }
}

#[async_trait]
impl NotificationSink for StoreSink {
    async fn emit(&self, notification: NewNotification) {
        let store = &self.store;
        let pending = &notification;
        let stored = self
            .retry
            .run("insert_notification", move || store.insert_notification(pending))
            .await;
        match stored {
            Ok(id) => tracing::info!(
                id,
                network = %notification.network,
                ip = %notification.ip,
                service = %notification.service,
                message = %notification.message,
                "Notification raised"
            ),
            Err(e) => tracing::error!(
                network = %notification.network,
                ip = %notification.ip,
                error = %e,
                "Dropping notification"
            ),
        }
    }
}

/// Flag every unread notification read, waiting out a locked store.
pub async fn mark_all_read(
    store: &dyn InventoryStore,
    retry: &RetryPolicy,
) -> Result<u64, StoreError> {
    retry.run("mark_all_read", move || store.mark_all_read()).await
}

/// Delete every notification, waiting out a locked store.
pub async fn clear_all(store: &dyn InventoryStore, retry: &RetryPolicy) -> Result<u64, StoreError> {
    retry
        .run("delete_all_notifications", move || store.delete_all_notifications())
        .await
}
