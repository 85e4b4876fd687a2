//! The four marketplace workflow components and a facade that wires them to a
//! shared store handle.

pub mod completion;
pub mod purchase_orders;
pub mod quotations;
pub mod requests;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::errors::WorkflowError;
use crate::notify::Notifier;
use crate::store::{Document, DocumentId, DocumentStore, Precondition, RecordStore, Stored};

pub use completion::{CompletionOutcome, OrderCompletionRecorder};
pub use purchase_orders::{PurchaseOrderCreated, PurchaseOrderWorkflow};
pub use quotations::{QuotationCreated, QuotationEngine, RequestUpdate};
pub use requests::QuotationRequestTracker;

pub(crate) const FIELD_STATUS: &str = "status";
pub(crate) const FIELD_PAYMENT_STATUS: &str = "payment_status";

/// Loads a document, turning absence into [`WorkflowError::NotFound`].
pub(crate) async fn load<T, S>(store: &S, id: &T::Id) -> Result<Stored<T>, WorkflowError>
where
    T: Document,
    S: RecordStore + ?Sized,
{
    store
        .fetch_document::<T>(id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(T::COLLECTION, id.record_id()))
}

pub(crate) fn json_value<T: Serialize>(value: &T) -> Result<Value, WorkflowError> {
    serde_json::to_value(value).map_err(|error| WorkflowError::DataIntegrity(error.to_string()))
}

pub(crate) fn status_is<V: Into<Value>>(field: &str, current: V) -> Precondition {
    Precondition::field_equals(field, current)
}

/// All workflow components over one store and notifier.
pub struct Marketplace<S: ?Sized, N: ?Sized> {
    pub requests: QuotationRequestTracker<S>,
    pub quotations: QuotationEngine<S>,
    pub purchase_orders: PurchaseOrderWorkflow<S, N>,
    pub completion: OrderCompletionRecorder<S>,
}

impl<S, N> Marketplace<S, N>
where
    S: RecordStore + ?Sized,
    N: Notifier + ?Sized,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, settings: WorkflowConfig) -> Self {
        let requests = QuotationRequestTracker::new(store.clone());
        let completion = OrderCompletionRecorder::new(store.clone());
        Self {
            quotations: QuotationEngine::new(store.clone(), requests.clone()),
            purchase_orders: PurchaseOrderWorkflow::new(
                store,
                notifier,
                completion.clone(),
                settings,
            ),
            requests,
            completion,
        }
    }
}

impl<S: ?Sized, N: ?Sized> Clone for Marketplace<S, N> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            quotations: self.quotations.clone(),
            purchase_orders: self.purchase_orders.clone(),
            completion: self.completion.clone(),
        }
    }
}
