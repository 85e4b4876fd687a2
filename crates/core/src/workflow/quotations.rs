use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::quotation::{NewQuotation, Quotation, QuotationId};
use crate::domain::request::{QuotationRequest, QuotationRequestId};
use crate::errors::WorkflowError;
use crate::flows::{QuotationStatus, StatusMachine};
use crate::store::{
    Document, DocumentId, DocumentStore, FilterOp, Patch, Query, RecordStore, Stored, WriteOp,
};
use crate::timestamp;
use crate::workflow::requests::QuotationRequestTracker;
use crate::workflow::{load, status_is, FIELD_STATUS};

/// What happened to the request counter after a quotation was stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestUpdate {
    Counted { quotations_received: u32 },
    /// The counter moved but the new total could not be read back.
    CountedWithoutTotal,
    RequestMissing,
    Failed { reason: String },
}

impl RequestUpdate {
    pub fn is_counted(&self) -> bool {
        matches!(self, Self::Counted { .. } | Self::CountedWithoutTotal)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotationCreated {
    pub quotation_id: QuotationId,
    pub total_amount: Decimal,
    pub request_update: RequestUpdate,
}

/// Vendor-side pricing of quotation requests.
pub struct QuotationEngine<S: ?Sized> {
    store: Arc<S>,
    requests: QuotationRequestTracker<S>,
}

impl<S: ?Sized> Clone for QuotationEngine<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), requests: self.requests.clone() }
    }
}

impl<S> QuotationEngine<S>
where
    S: RecordStore + ?Sized,
{
    pub fn new(store: Arc<S>, requests: QuotationRequestTracker<S>) -> Self {
        Self { store, requests }
    }

    /// Stores a priced quotation, then counts it against its request.
    ///
    /// The quotation is kept even when the request update fails; the outcome
    /// reports the counter step separately.
    pub async fn create_quotation(
        &self,
        input: NewQuotation,
    ) -> Result<QuotationCreated, WorkflowError> {
        input.validate()?;
        let mut quotation = input.into_quotation()?;

        match self.store.fetch_document::<QuotationRequest>(&quotation.quotation_request_id).await
        {
            Ok(Some(request)) => quotation.buyer_id = request.data.buyer_id,
            Ok(None) => {}
            Err(error) => debug!(
                event_name = "workflow.quotation.buyer_lookup_failed",
                quotation_request_id = %quotation.quotation_request_id,
                error = %error,
                "using caller-supplied buyer id"
            ),
        }

        let quotation_id = self.store.insert_document(&quotation).await?;
        info!(
            event_name = "workflow.quotation.created",
            quotation_id = %quotation_id,
            quotation_request_id = %quotation.quotation_request_id,
            vendor_id = %quotation.vendor_id,
            total_amount = %quotation.total_amount,
            "quotation created"
        );

        let request_update = self.count_against_request(&quotation.quotation_request_id).await;
        Ok(QuotationCreated {
            quotation_id,
            total_amount: quotation.total_amount,
            request_update,
        })
    }

    async fn count_against_request(&self, request_id: &QuotationRequestId) -> RequestUpdate {
        match self.requests.increment_received_count(request_id).await {
            Ok(Some(quotations_received)) => RequestUpdate::Counted { quotations_received },
            Ok(None) => RequestUpdate::CountedWithoutTotal,
            Err(WorkflowError::NotFound { .. }) => {
                warn!(
                    event_name = "workflow.quotation.request_missing",
                    quotation_request_id = %request_id,
                    "quotation stored for a request that does not exist"
                );
                RequestUpdate::RequestMissing
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.quotation.request_update_failed",
                    quotation_request_id = %request_id,
                    error = %error,
                    "quotation stored but request counter was not updated"
                );
                RequestUpdate::Failed { reason: error.to_string() }
            }
        }
    }

    pub async fn get_quotation(
        &self,
        id: &QuotationId,
    ) -> Result<Stored<Quotation>, WorkflowError> {
        load(&*self.store, id).await
    }

    pub async fn list_by_buyer(
        &self,
        buyer_id: &str,
    ) -> Result<Vec<Stored<Quotation>>, WorkflowError> {
        self.list(Query::new().filter_eq("buyer_id", buyer_id)).await
    }

    pub async fn list_by_vendor(
        &self,
        vendor_id: &str,
    ) -> Result<Vec<Stored<Quotation>>, WorkflowError> {
        self.list(Query::new().filter_eq("vendor_id", vendor_id)).await
    }

    pub async fn list_by_request(
        &self,
        request_id: &QuotationRequestId,
    ) -> Result<Vec<Stored<Quotation>>, WorkflowError> {
        self.list(Query::new().filter_eq("quotation_request_id", request_id.0.as_str())).await
    }

    async fn list(&self, query: Query) -> Result<Vec<Stored<Quotation>>, WorkflowError> {
        Ok(self.store.find_documents::<Quotation>(query.newest_first()).await?)
    }

    /// Buyer declines a pending quotation.
    pub async fn reject_quotation(&self, id: &QuotationId) -> Result<(), WorkflowError> {
        let quotation = load::<Quotation, _>(&*self.store, id).await?;
        let current = quotation.data.status;
        let next = current.transition_to(QuotationStatus::Rejected)?;

        let write = WriteOp::update(
            Quotation::COLLECTION,
            id.record_id(),
            Patch::new().set(FIELD_STATUS, next),
        )
        .guarded(status_is(FIELD_STATUS, current));
        self.store.batch_write(vec![write]).await?;

        info!(
            event_name = "workflow.quotation.rejected",
            quotation_id = %id,
            vendor_id = %quotation.data.vendor_id,
            "quotation rejected by buyer"
        );
        Ok(())
    }

    /// Marks every pending quotation whose `valid_until` lies before `now` as
    /// expired. Quotations accepted or rejected in the meantime are skipped.
    pub async fn expire_stale(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<QuotationId>, WorkflowError> {
        let query = Query::new()
            .filter_eq(FIELD_STATUS, QuotationStatus::Pending)
            .filter("valid_until", FilterOp::Lt, timestamp::to_value(now));
        let stale = self.store.find_documents::<Quotation>(query).await?;

        let mut expired = Vec::with_capacity(stale.len());
        for quotation in stale.into_iter().filter(|quotation| quotation.data.is_expired_at(now)) {
            let write = WriteOp::update(
                Quotation::COLLECTION,
                quotation.id.record_id(),
                Patch::new().set(FIELD_STATUS, QuotationStatus::Expired),
            )
            .guarded(status_is(FIELD_STATUS, QuotationStatus::Pending));

            match self.store.batch_write(vec![write]).await.map_err(WorkflowError::from) {
                Ok(()) => expired.push(quotation.id),
                Err(WorkflowError::Conflict(reason)) => debug!(
                    event_name = "workflow.quotation.expiry_skipped",
                    quotation_id = %quotation.id,
                    reason = %reason,
                    "quotation left pending state before expiry"
                ),
                Err(error) => return Err(error),
            }
        }

        if !expired.is_empty() {
            info!(
                event_name = "workflow.quotation.expired",
                count = expired.len(),
                "stale quotations expired"
            );
        }
        Ok(expired)
    }
}
