use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::purchase_order::PurchaseOrderId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderConfirmed,
    OrderRejected,
    OrderShipped,
    OrderDelivered,
    DeliveryCostSent,
    PaymentSlipUploaded,
    PaymentSlipRejected,
    PaymentConfirmed,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderConfirmed => "order_confirmed",
            Self::OrderRejected => "order_rejected",
            Self::OrderShipped => "order_shipped",
            Self::OrderDelivered => "order_delivered",
            Self::DeliveryCostSent => "delivery_cost_sent",
            Self::PaymentSlipUploaded => "payment_slip_uploaded",
            Self::PaymentSlipRejected => "payment_slip_rejected",
            Self::PaymentConfirmed => "payment_confirmed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub purchase_order_id: PurchaseOrderId,
    pub recipient_id: String,
    pub payload: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        event: NotificationEvent,
        purchase_order_id: PurchaseOrderId,
        recipient_id: impl Into<String>,
    ) -> Self {
        Self {
            event,
            purchase_order_id,
            recipient_id: recipient_id.into(),
            payload: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Counterparty messaging channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_for(&self, purchase_order_id: &PurchaseOrderId) -> Vec<NotificationEvent> {
        self.sent()
            .into_iter()
            .filter(|notification| &notification.purchase_order_id == purchase_order_id)
            .map(|notification| notification.event)
            .collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Sends a notification, logging and discarding any failure.
pub async fn dispatch<N>(notifier: &N, notification: Notification)
where
    N: Notifier + ?Sized,
{
    let event = notification.event;
    let purchase_order_id = notification.purchase_order_id.clone();
    if let Err(error) = notifier.notify(notification).await {
        warn!(
            event_name = "workflow.notification.failed",
            notification = event.as_str(),
            purchase_order_id = %purchase_order_id,
            error = %error,
            "counterparty notification failed; transition already committed"
        );
    }
}
