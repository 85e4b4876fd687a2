use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::QuotationRequestId;
use crate::domain::require_non_blank;
use crate::errors::WorkflowError;
use crate::flows::QuotationStatus;
use crate::store::Document;
use crate::timestamp;

super::record_id!(QuotationId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartCondition {
    New,
    Used,
    Reconditioned,
}

/// One priced line of a quotation. `total_price` is always `quantity * unit_price`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotationLine {
    pub part_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub condition: Option<PartCondition>,
    pub warranty: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuotationLineInput {
    pub part_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub condition: Option<PartCondition>,
    pub warranty: Option<String>,
}

impl QuotationLineInput {
    pub fn new(part_name: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self { part_name: part_name.into(), quantity, unit_price, condition: None, warranty: None }
    }

    fn line_price(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    fn priced(self, index: usize) -> Result<QuotationLine, WorkflowError> {
        let total_price = self.line_price().ok_or_else(|| out_of_range(index))?;
        Ok(QuotationLine {
            total_price,
            part_name: self.part_name,
            quantity: self.quantity,
            unit_price: self.unit_price,
            condition: self.condition,
            warranty: self.warranty,
        })
    }
}

fn out_of_range(index: usize) -> WorkflowError {
    WorkflowError::Validation(format!("products[{index}] puts the quotation total out of range"))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub quotation_request_id: QuotationRequestId,
    pub vendor_id: String,
    pub buyer_id: String,
    pub products: Vec<QuotationLine>,
    pub total_amount: Decimal,
    pub currency: String,
    #[serde(default, with = "timestamp::flexible_option")]
    pub valid_until: Option<DateTime<Utc>>,
    pub delivery_timeframe: String,
    pub terms: String,
    pub notes: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub status: QuotationStatus,
}

impl Quotation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|valid_until| valid_until < now)
    }

    /// Sum of the stored line totals; `None` if it does not fit a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.products
            .iter()
            .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.total_price))
    }
}

impl Document for Quotation {
    const COLLECTION: &'static str = "quotations";
    type Id = QuotationId;
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewQuotation {
    pub quotation_request_id: QuotationRequestId,
    pub vendor_id: String,
    pub buyer_id: String,
    pub products: Vec<QuotationLineInput>,
    pub currency: String,
    pub valid_until: Option<DateTime<Utc>>,
    pub delivery_timeframe: String,
    pub terms: String,
    pub notes: String,
    pub image_urls: Vec<String>,
}

impl NewQuotation {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        require_non_blank("quotation_request_id", &self.quotation_request_id.0)?;
        require_non_blank("vendor_id", &self.vendor_id)?;
        require_non_blank("buyer_id", &self.buyer_id)?;
        require_non_blank("currency", &self.currency)?;

        if self.products.is_empty() {
            return Err(WorkflowError::Validation(
                "a quotation needs at least one line item".to_owned(),
            ));
        }
        for (index, line) in self.products.iter().enumerate() {
            require_non_blank(&format!("products[{index}].part_name"), &line.part_name)?;
            if line.quantity == 0 {
                return Err(WorkflowError::Validation(format!(
                    "products[{index}].quantity must be greater than zero"
                )));
            }
            if line.unit_price.is_sign_negative() && !line.unit_price.is_zero() {
                return Err(WorkflowError::Validation(format!(
                    "products[{index}].unit_price must not be negative"
                )));
            }
        }
        self.priced_total().map(|_| ())
    }

    fn priced_total(&self) -> Result<Decimal, WorkflowError> {
        self.products.iter().enumerate().try_fold(Decimal::ZERO, |total, (index, line)| {
            line.line_price()
                .and_then(|price| total.checked_add(price))
                .ok_or_else(|| out_of_range(index))
        })
    }

    /// Prices every line and derives `total_amount` from the line totals.
    pub fn into_quotation(self) -> Result<Quotation, WorkflowError> {
        let total_amount = self.priced_total()?;
        let products = self
            .products
            .into_iter()
            .enumerate()
            .map(|(index, line)| line.priced(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Quotation {
            quotation_request_id: self.quotation_request_id,
            vendor_id: self.vendor_id,
            buyer_id: self.buyer_id,
            products,
            total_amount,
            currency: self.currency.trim().to_ascii_uppercase(),
            valid_until: self.valid_until,
            delivery_timeframe: self.delivery_timeframe,
            terms: self.terms,
            notes: self.notes,
            image_urls: self.image_urls,
            status: QuotationStatus::Pending,
        })
    }
}
