use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::require_non_blank;
use crate::errors::WorkflowError;
use crate::flows::QuotationRequestStatus;
use crate::store::Document;
use crate::timestamp;

super::record_id!(QuotationRequestId);

/// Vehicle the requested part has to fit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDetails {
    pub make: String,
    pub model: String,
    pub year: Option<u16>,
    pub variant: Option<String>,
}

/// Buyer identity captured at request time; later profile edits do not change it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerSnapshot {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotationRequest {
    pub buyer_id: String,
    pub buyer: BuyerSnapshot,
    pub vehicle: VehicleDetails,
    pub part_name: String,
    pub part_number: Option<String>,
    pub target_vendor_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub budget: Option<Decimal>,
    #[serde(default, with = "timestamp::flexible_option")]
    pub needed_by: Option<DateTime<Utc>>,
    pub status: QuotationRequestStatus,
    #[serde(default)]
    pub quotations_received: u32,
}

impl Document for QuotationRequest {
    const COLLECTION: &'static str = "quotation_requests";
    type Id = QuotationRequestId;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewQuotationRequest {
    pub buyer_id: String,
    pub buyer: BuyerSnapshot,
    pub vehicle: VehicleDetails,
    pub part_name: String,
    pub part_number: Option<String>,
    pub target_vendor_id: Option<String>,
    pub description: String,
    pub image_urls: Vec<String>,
    pub budget: Option<Decimal>,
    pub needed_by: Option<DateTime<Utc>>,
}

impl NewQuotationRequest {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        require_non_blank("buyer_id", &self.buyer_id)?;
        require_non_blank("part_name", &self.part_name)?;
        if let Some(budget) = self.budget {
            if budget.is_sign_negative() {
                return Err(WorkflowError::Validation("budget must not be negative".to_owned()));
            }
        }
        Ok(())
    }

    pub fn into_request(self) -> QuotationRequest {
        QuotationRequest {
            buyer_id: self.buyer_id,
            buyer: self.buyer,
            vehicle: self.vehicle,
            part_name: self.part_name,
            part_number: self.part_number,
            target_vendor_id: self.target_vendor_id,
            description: self.description,
            image_urls: self.image_urls,
            budget: self.budget,
            needed_by: self.needed_by,
            status: QuotationRequestStatus::Pending,
            quotations_received: 0,
        }
    }
}
