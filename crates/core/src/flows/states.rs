use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notify::NotificationEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationRequestStatus {
    Pending,
    ReceivedQuotes,
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Pending,
    Confirmed,
    InProgress,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    SubmittedForReview,
    Paid,
    Refunded,
}

impl QuotationRequestStatus {
    pub const ALL: &'static [Self] =
        &[Self::Pending, Self::ReceivedQuotes, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ReceivedQuotes => "received_quotes",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Open requests still accept quotations and flip to `received_quotes`.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::ReceivedQuotes)
    }
}

impl QuotationStatus {
    pub const ALL: &'static [Self] =
        &[Self::Pending, Self::Accepted, Self::Rejected, Self::Expired];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl PurchaseOrderStatus {
    pub const ALL: &'static [Self] = &[
        Self::Pending,
        Self::Confirmed,
        Self::InProgress,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl PaymentStatus {
    pub const ALL: &'static [Self] =
        &[Self::Pending, Self::SubmittedForReview, Self::Paid, Self::Refunded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SubmittedForReview => "submitted_for_review",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
        }
    }
}

macro_rules! status_value {
    ($($status:ty),+) => {
        $(
            impl From<$status> for Value {
                fn from(status: $status) -> Self {
                    Value::String(status.as_str().to_owned())
                }
            }

            impl std::fmt::Display for $status {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

status_value!(QuotationRequestStatus, QuotationStatus, PurchaseOrderStatus, PaymentStatus);

/// Follow-up work a purchase-order transition requires besides the status write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RecordCompletion,
    NotifyBuyer(NotificationEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn requires_completion(&self) -> bool {
        self.actions.contains(&FlowAction::RecordCompletion)
    }

    pub fn notifications(&self) -> impl Iterator<Item = NotificationEvent> + '_ {
        self.actions.iter().filter_map(|action| match action {
            FlowAction::NotifyBuyer(event) => Some(*event),
            FlowAction::RecordCompletion => None,
        })
    }
}
