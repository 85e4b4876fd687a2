use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::request::{NewQuotationRequest, QuotationRequest, QuotationRequestId};
use crate::errors::WorkflowError;
use crate::flows::{QuotationRequestStatus, StatusMachine};
use crate::store::{
    Document, DocumentId, DocumentStore, Patch, Precondition, Query, RecordStore, StoreError,
    Stored, WriteOp,
};
use crate::workflow::{load, status_is, FIELD_STATUS};

const FIELD_QUOTATIONS_RECEIVED: &str = "quotations_received";

/// Buyer-side lifecycle of quotation requests.
pub struct QuotationRequestTracker<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for QuotationRequestTracker<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S> QuotationRequestTracker<S>
where
    S: RecordStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create_request(
        &self,
        input: NewQuotationRequest,
    ) -> Result<QuotationRequestId, WorkflowError> {
        input.validate()?;
        let request = input.into_request();
        let id = self.store.insert_document(&request).await?;

        info!(
            event_name = "workflow.quotation_request.created",
            quotation_request_id = %id,
            buyer_id = %request.buyer_id,
            "quotation request created"
        );
        Ok(id)
    }

    /// Counts one more received quotation and returns the new count.
    ///
    /// Open requests move to `received_quotes` in the same write; closed
    /// requests keep their status but still count the quotation. The count is
    /// `None` when the increment committed but the request could not be read
    /// back afterwards.
    pub async fn increment_received_count(
        &self,
        id: &QuotationRequestId,
    ) -> Result<Option<u32>, WorkflowError> {
        let record_id = id.record_id();
        let open_statuses =
            QuotationRequestStatus::ALL.iter().copied().filter(QuotationRequestStatus::is_open);

        let counted_and_flipped = WriteOp::update(
            QuotationRequest::COLLECTION,
            record_id.clone(),
            Patch::new()
                .increment(FIELD_QUOTATIONS_RECEIVED, 1)
                .set(FIELD_STATUS, QuotationRequestStatus::ReceivedQuotes),
        )
        .guarded(Precondition::field_in(FIELD_STATUS, open_statuses));

        match self.store.batch_write(vec![counted_and_flipped]).await {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed { actual, .. }) => {
                debug!(
                    event_name = "workflow.quotation_request.count_on_closed",
                    quotation_request_id = %id,
                    status = %actual,
                    "request is closed; counting without status change"
                );
                self.store
                    .update(
                        QuotationRequest::COLLECTION,
                        &record_id,
                        Patch::new().increment(FIELD_QUOTATIONS_RECEIVED, 1),
                    )
                    .await?;
            }
            Err(error) => return Err(error.into()),
        }

        let request = match load::<QuotationRequest, _>(&*self.store, id).await {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    event_name = "workflow.quotation_request.count_unread",
                    quotation_request_id = %id,
                    error = %error,
                    "quotation counted but request could not be reloaded"
                );
                return Ok(None);
            }
        };
        info!(
            event_name = "workflow.quotation_request.counted",
            quotation_request_id = %id,
            quotations_received = request.data.quotations_received,
            status = %request.data.status,
            "quotation counted against request"
        );
        Ok(Some(request.data.quotations_received))
    }

    pub async fn get_request(
        &self,
        id: &QuotationRequestId,
    ) -> Result<Stored<QuotationRequest>, WorkflowError> {
        load(&*self.store, id).await
    }

    pub async fn list_by_buyer(
        &self,
        buyer_id: &str,
    ) -> Result<Vec<Stored<QuotationRequest>>, WorkflowError> {
        let query = Query::new().filter_eq("buyer_id", buyer_id).newest_first();
        Ok(self.store.find_documents::<QuotationRequest>(query).await?)
    }

    pub async fn cancel_request(&self, id: &QuotationRequestId) -> Result<(), WorkflowError> {
        let request = load::<QuotationRequest, _>(&*self.store, id).await?;
        let current = request.data.status;
        let next = current.transition_to(QuotationRequestStatus::Cancelled)?;

        let write = WriteOp::update(
            QuotationRequest::COLLECTION,
            id.record_id(),
            Patch::new().set(FIELD_STATUS, next),
        )
        .guarded(status_is(FIELD_STATUS, current));
        self.store.batch_write(vec![write]).await?;

        info!(
            event_name = "workflow.quotation_request.cancelled",
            quotation_request_id = %id,
            from = %current,
            "quotation request cancelled"
        );
        Ok(())
    }
}
