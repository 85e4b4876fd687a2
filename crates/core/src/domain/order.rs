use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::purchase_order::{PurchaseOrder, PurchaseOrderId};
use crate::errors::WorkflowError;
use crate::store::Document;
use crate::timestamp;

super::record_id!(OrderId);

impl OrderId {
    /// Completed orders are keyed by their purchase order, one per purchase order.
    pub fn for_purchase_order(purchase_order_id: &PurchaseOrderId) -> Self {
        Self(format!("ord-{}", purchase_order_id.0))
    }
}

/// Immutable history record of a fulfilled purchase order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub purchase_order_id: PurchaseOrderId,
    pub buyer_id: String,
    pub vendor_id: String,
    pub total_amount: Decimal,
    pub currency: String,
    #[serde(with = "timestamp::flexible")]
    pub completed_date: DateTime<Utc>,
    #[serde(default, with = "timestamp::flexible_option")]
    pub delivered_date: Option<DateTime<Utc>>,
    pub rating: Option<u8>,
    pub review: Option<String>,
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";
    type Id = OrderId;
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionDetails {
    pub buyer_id: String,
    pub vendor_id: String,
    pub total_amount: Decimal,
    pub currency: String,
}

impl CompletionDetails {
    /// Rejects details that disagree with the purchase order they complete.
    pub fn verify_against(&self, purchase_order: &PurchaseOrder) -> Result<(), WorkflowError> {
        let mut mismatched = Vec::new();
        if self.buyer_id != purchase_order.buyer_id {
            mismatched.push("buyer_id");
        }
        if self.vendor_id != purchase_order.vendor_id {
            mismatched.push("vendor_id");
        }
        if self.total_amount != purchase_order.total_amount {
            mismatched.push("total_amount");
        }
        if !self.currency.eq_ignore_ascii_case(&purchase_order.currency) {
            mismatched.push("currency");
        }
        if mismatched.is_empty() {
            return Ok(());
        }
        Err(WorkflowError::Validation(format!(
            "completion details disagree with the purchase order: {}",
            mismatched.join(", ")
        )))
    }
}

impl From<&PurchaseOrder> for CompletionDetails {
    fn from(purchase_order: &PurchaseOrder) -> Self {
        Self {
            buyer_id: purchase_order.buyer_id.clone(),
            vendor_id: purchase_order.vendor_id.clone(),
            total_amount: purchase_order.total_amount,
            currency: purchase_order.currency.clone(),
        }
    }
}
