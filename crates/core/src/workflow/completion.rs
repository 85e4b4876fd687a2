use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::order::{CompletionDetails, Order, OrderId};
use crate::domain::purchase_order::{PurchaseOrder, PurchaseOrderId};
use crate::errors::WorkflowError;
use crate::flows::{PurchaseOrderStatus, StatusMachine};
use crate::store::{
    encode, Document, DocumentId, DocumentStore, Patch, Query, RecordStore, StoreError, Stored,
    WriteOp,
};
use crate::workflow::{load, status_is, FIELD_STATUS};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    Recorded(OrderId),
    AlreadyRecorded(OrderId),
}

impl CompletionOutcome {
    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::Recorded(id) | Self::AlreadyRecorded(id) => id,
        }
    }
}

/// Writes the immutable order history record when a purchase order is delivered.
pub struct OrderCompletionRecorder<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for OrderCompletionRecorder<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S> OrderCompletionRecorder<S>
where
    S: RecordStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records the order and flips the purchase order to `delivered` in one
    /// guarded batch. Repeated calls return the existing order untouched.
    pub async fn complete_purchase_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
        details: CompletionDetails,
    ) -> Result<CompletionOutcome, WorkflowError> {
        let purchase_order = load::<PurchaseOrder, _>(&*self.store, purchase_order_id).await?;
        details.verify_against(&purchase_order.data)?;

        let order_id = OrderId::for_purchase_order(purchase_order_id);
        if self.store.get_by_id(Order::COLLECTION, &order_id.record_id()).await?.is_some() {
            info!(
                event_name = "workflow.order.already_recorded",
                purchase_order_id = %purchase_order_id,
                order_id = %order_id,
                "order already recorded for purchase order"
            );
            return Ok(CompletionOutcome::AlreadyRecorded(order_id));
        }

        let current = purchase_order.data.status;
        current.transition_to(PurchaseOrderStatus::Delivered)?;

        let now = Utc::now();
        let order = Order {
            purchase_order_id: purchase_order_id.clone(),
            buyer_id: details.buyer_id,
            vendor_id: details.vendor_id,
            total_amount: details.total_amount,
            currency: purchase_order.data.currency,
            completed_date: now,
            delivered_date: Some(now),
            rating: None,
            review: None,
        };
        let writes = vec![
            WriteOp::create(Order::COLLECTION, order_id.record_id(), encode(&order)?),
            WriteOp::update(
                PurchaseOrder::COLLECTION,
                purchase_order_id.record_id(),
                Patch::new().set(FIELD_STATUS, PurchaseOrderStatus::Delivered),
            )
            .guarded(status_is(FIELD_STATUS, current)),
        ];

        match self.store.batch_write(writes).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                info!(
                    event_name = "workflow.order.already_recorded",
                    purchase_order_id = %purchase_order_id,
                    order_id = %order_id,
                    "concurrent completion recorded the order first"
                );
                return Ok(CompletionOutcome::AlreadyRecorded(order_id));
            }
            Err(error) => return Err(error.into()),
        }

        info!(
            event_name = "workflow.order.recorded",
            purchase_order_id = %purchase_order_id,
            order_id = %order_id,
            from = %current,
            total_amount = %order.total_amount,
            "purchase order delivered and order recorded"
        );
        Ok(CompletionOutcome::Recorded(order_id))
    }

    pub async fn get_order_for_purchase_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Option<Stored<Order>>, WorkflowError> {
        let order_id = OrderId::for_purchase_order(purchase_order_id);
        Ok(self.store.fetch_document::<Order>(&order_id).await?)
    }

    pub async fn list_by_buyer(&self, buyer_id: &str) -> Result<Vec<Stored<Order>>, WorkflowError> {
        let query = Query::new().filter_eq("buyer_id", buyer_id).newest_first();
        Ok(self.store.find_documents::<Order>(query).await?)
    }

    pub async fn list_by_vendor(
        &self,
        vendor_id: &str,
    ) -> Result<Vec<Stored<Order>>, WorkflowError> {
        let query = Query::new().filter_eq("vendor_id", vendor_id).newest_first();
        Ok(self.store.find_documents::<Order>(query).await?)
    }
}
