use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quotation::{QuotationId, QuotationLine};
use crate::domain::request::QuotationRequestId;
use crate::domain::require_non_blank;
use crate::errors::WorkflowError;
use crate::flows::{PaymentStatus, PurchaseOrderStatus};
use crate::store::Document;
use crate::timestamp;

super::record_id!(PurchaseOrderId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    ArrangeDelivery,
    CollectFromShop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashAtShop,
    BankTransfer,
    PayOnline,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub district: String,
    pub zip_code: String,
    pub country: String,
}

impl DeliveryAddress {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("street", &self.street),
            ("city", &self.city),
            ("district", &self.district),
            ("zip_code", &self.zip_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Resolves the address to store for an order. A complete address is required
/// for `arrange_delivery`; shop collection stores a blank placeholder.
pub fn resolve_delivery_address(
    method: DeliveryMethod,
    address: Option<DeliveryAddress>,
) -> Result<DeliveryAddress, WorkflowError> {
    match method {
        DeliveryMethod::CollectFromShop => Ok(DeliveryAddress::default()),
        DeliveryMethod::ArrangeDelivery => {
            let address = address.ok_or_else(|| {
                WorkflowError::Validation(
                    "delivery_address is required for arrange_delivery".to_owned(),
                )
            })?;
            let missing = address.missing_fields();
            if !missing.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "delivery_address is incomplete: missing {}",
                    missing.join(", ")
                )));
            }
            Ok(address)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Display label only; `PurchaseOrderId` is the key.
    pub order_number: String,
    pub quotation_id: QuotationId,
    pub quotation_request_id: QuotationRequestId,
    pub buyer_id: String,
    pub vendor_id: String,
    pub products: Vec<QuotationLine>,
    pub total_amount: Decimal,
    pub currency: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    pub delivery_address: DeliveryAddress,
    #[serde(with = "timestamp::flexible")]
    pub expected_delivery_date: DateTime<Utc>,
    pub delivery_cost: Option<Decimal>,
    pub delivery_cost_notes: Option<String>,
    #[serde(default)]
    pub delivery_cost_requested: bool,
    pub payment_slip_url: Option<String>,
    pub rejection_reason: Option<String>,
    pub vendor_message: Option<String>,
    pub tracking_number: Option<String>,
    pub status: PurchaseOrderStatus,
    pub payment_status: PaymentStatus,
}

impl Document for PurchaseOrder {
    const COLLECTION: &'static str = "purchase_orders";
    type Id = PurchaseOrderId;
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewPurchaseOrder {
    pub quotation_id: QuotationId,
    pub buyer_id: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    pub delivery_address: Option<DeliveryAddress>,
}

impl NewPurchaseOrder {
    pub fn validate(&self) -> Result<DeliveryAddress, WorkflowError> {
        require_non_blank("quotation_id", &self.quotation_id.0)?;
        require_non_blank("buyer_id", &self.buyer_id)?;
        resolve_delivery_address(self.delivery_method, self.delivery_address.clone())
    }
}

/// Optional data carried by a status update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusUpdateExtra {
    pub rejection_reason: Option<String>,
    pub vendor_message: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
}

/// `PO-<yyyymmdd>-<hhmmss>-<request fragment>`. Not guaranteed unique.
pub fn order_number(
    prefix: &str,
    now: DateTime<Utc>,
    request_id: &QuotationRequestId,
) -> String {
    let fragment: String = request_id
        .0
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(6)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("{prefix}-{}-{fragment}", now.format("%Y%m%d-%H%M%S"))
}
