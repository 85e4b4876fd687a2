use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

use crate::config::WorkflowConfig;
use crate::domain::order::CompletionDetails;
use crate::domain::purchase_order::{
    order_number, NewPurchaseOrder, PurchaseOrder, PurchaseOrderId, StatusUpdateExtra,
};
use crate::domain::quotation::Quotation;
use crate::domain::require_non_blank;
use crate::errors::WorkflowError;
use crate::flows::{
    plan_purchase_order_transition, PaymentStatus, PurchaseOrderStatus, QuotationStatus,
    StatusMachine, TransitionOutcome,
};
use crate::notify::{dispatch, Notification, NotificationEvent, Notifier};
use crate::store::{
    encode, Document, DocumentId, DocumentStore, Patch, Query, Record, RecordId, RecordStore,
    Stored, WriteOp,
};
use crate::timestamp;
use crate::workflow::completion::{CompletionOutcome, OrderCompletionRecorder};
use crate::workflow::{json_value, load, status_is, FIELD_PAYMENT_STATUS, FIELD_STATUS};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseOrderCreated {
    pub purchase_order_id: PurchaseOrderId,
    pub order_number: String,
}

/// Purchase-order lifecycle from acceptance of a quotation to delivery.
pub struct PurchaseOrderWorkflow<S: ?Sized, N: ?Sized> {
    store: Arc<S>,
    notifier: Arc<N>,
    completion: OrderCompletionRecorder<S>,
    settings: WorkflowConfig,
}

impl<S: ?Sized, N: ?Sized> Clone for PurchaseOrderWorkflow<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            completion: self.completion.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S, N> PurchaseOrderWorkflow<S, N>
where
    S: RecordStore + ?Sized,
    N: Notifier + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        completion: OrderCompletionRecorder<S>,
        settings: WorkflowConfig,
    ) -> Self {
        Self { store, notifier, completion, settings }
    }

    /// Turns a pending quotation into a purchase order.
    ///
    /// The order and the quotation's flip to `accepted` are written together,
    /// guarded on the quotation still being `pending`; a lost race yields
    /// [`WorkflowError::Conflict`] and writes nothing.
    pub async fn create_purchase_order(
        &self,
        input: NewPurchaseOrder,
    ) -> Result<PurchaseOrderCreated, WorkflowError> {
        let delivery_address = input.validate()?;
        let quotation = load::<Quotation, _>(&*self.store, &input.quotation_id).await?;

        if quotation.data.buyer_id != input.buyer_id {
            return Err(WorkflowError::Validation(format!(
                "quotation `{}` was not issued to buyer `{}`",
                quotation.id, input.buyer_id
            )));
        }
        quotation.data.status.transition_to(QuotationStatus::Accepted)?;

        let now = Utc::now();
        if quotation.data.is_expired_at(now) {
            return Err(WorkflowError::Validation(format!(
                "quotation `{}` expired and can no longer be ordered",
                quotation.id
            )));
        }

        let quotation_data = quotation.data;
        let purchase_order = PurchaseOrder {
            order_number: order_number(
                &self.settings.order_number_prefix,
                now,
                &quotation_data.quotation_request_id,
            ),
            quotation_id: quotation.id.clone(),
            quotation_request_id: quotation_data.quotation_request_id,
            buyer_id: input.buyer_id,
            vendor_id: quotation_data.vendor_id,
            products: quotation_data.products,
            total_amount: quotation_data.total_amount,
            currency: quotation_data.currency,
            delivery_method: input.delivery_method,
            payment_method: input.payment_method,
            delivery_address,
            expected_delivery_date: quotation_data.valid_until.unwrap_or(now),
            delivery_cost: None,
            delivery_cost_notes: None,
            delivery_cost_requested: false,
            payment_slip_url: None,
            rejection_reason: None,
            vendor_message: None,
            tracking_number: None,
            status: PurchaseOrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
        };

        let purchase_order_id = PurchaseOrderId::from(RecordId::generate());
        let writes = vec![
            WriteOp::create(
                PurchaseOrder::COLLECTION,
                purchase_order_id.record_id(),
                encode(&purchase_order)?,
            ),
            WriteOp::update(
                Quotation::COLLECTION,
                quotation.id.record_id(),
                Patch::new().set(FIELD_STATUS, QuotationStatus::Accepted),
            )
            .guarded(status_is(FIELD_STATUS, QuotationStatus::Pending)),
        ];
        self.store.batch_write(writes).await?;

        info!(
            event_name = "workflow.purchase_order.created",
            purchase_order_id = %purchase_order_id,
            order_number = %purchase_order.order_number,
            quotation_id = %quotation.id,
            buyer_id = %purchase_order.buyer_id,
            vendor_id = %purchase_order.vendor_id,
            "purchase order created from quotation"
        );

        Ok(PurchaseOrderCreated {
            purchase_order_id,
            order_number: purchase_order.order_number,
        })
    }

    /// Moves a purchase order along its transition table.
    ///
    /// `delivered` is recorded through the completion recorder so that the
    /// order record and the status flip land together. Notifications are built
    /// from the loaded order with the update applied, so nothing is read back
    /// after the write commits. A delivery that a concurrent caller already
    /// recorded returns the outcome without notifying again.
    pub async fn update_purchase_order_status(
        &self,
        id: &PurchaseOrderId,
        target: PurchaseOrderStatus,
        extra: StatusUpdateExtra,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let purchase_order = load::<PurchaseOrder, _>(&*self.store, id).await?;
        let outcome = plan_purchase_order_transition(purchase_order.data.status, target)?;
        let patch = status_patch(&outcome, extra);
        let updated = patched(&purchase_order, &patch)?;

        if outcome.requires_completion() {
            let completion = self
                .completion
                .complete_purchase_order(id, CompletionDetails::from(&purchase_order.data))
                .await?;
            if let CompletionOutcome::AlreadyRecorded(order_id) = completion {
                info!(
                    event_name = "workflow.purchase_order.delivery_already_recorded",
                    purchase_order_id = %id,
                    order_id = %order_id,
                    "delivery already recorded, no notifications sent"
                );
                return Ok(outcome);
            }
        } else {
            let write = WriteOp::update(PurchaseOrder::COLLECTION, id.record_id(), patch)
                .guarded(status_is(FIELD_STATUS, outcome.from));
            self.store.batch_write(vec![write]).await?;
        }

        info!(
            event_name = "workflow.purchase_order.status_changed",
            purchase_order_id = %id,
            from = %outcome.from,
            to = %outcome.to,
            "purchase order status changed"
        );

        for event in outcome.notifications() {
            let notification = status_notification(event, id, &updated);
            dispatch(&*self.notifier, notification).await;
        }
        Ok(outcome)
    }

    /// Quotes the delivery cost to the buyer. Allowed in any status.
    pub async fn send_delivery_cost(
        &self,
        id: &PurchaseOrderId,
        cost: Decimal,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        if cost.is_sign_negative() && !cost.is_zero() {
            return Err(WorkflowError::Validation("delivery_cost must not be negative".to_owned()));
        }
        let purchase_order = load::<PurchaseOrder, _>(&*self.store, id).await?;

        let patch = Patch::new()
            .set("delivery_cost", json_value(&cost)?)
            .set("delivery_cost_notes", json_value(&notes)?)
            .set("delivery_cost_requested", true);
        self.store.update(PurchaseOrder::COLLECTION, &id.record_id(), patch).await?;

        info!(
            event_name = "workflow.purchase_order.delivery_cost_sent",
            purchase_order_id = %id,
            delivery_cost = %cost,
            "delivery cost sent to buyer"
        );

        let mut notification = Notification::new(
            NotificationEvent::DeliveryCostSent,
            id.clone(),
            purchase_order.data.buyer_id,
        )
        .with_payload("delivery_cost", cost.to_string())
        .with_payload("currency", purchase_order.data.currency);
        if let Some(notes) = notes {
            notification = notification.with_payload("delivery_cost_notes", notes);
        }
        dispatch(&*self.notifier, notification).await;
        Ok(())
    }

    /// Attaches the buyer's payment slip and moves payment to review, or
    /// straight to `paid` when slips are trusted.
    pub async fn upload_payment_slip(
        &self,
        id: &PurchaseOrderId,
        slip_url: &str,
    ) -> Result<PaymentStatus, WorkflowError> {
        require_non_blank("payment_slip_url", slip_url)?;
        let purchase_order = load::<PurchaseOrder, _>(&*self.store, id).await?;
        if purchase_order.data.status == PurchaseOrderStatus::Cancelled {
            return Err(WorkflowError::Validation(format!(
                "purchase order `{id}` is cancelled and takes no payment"
            )));
        }

        let current = purchase_order.data.payment_status;
        let next = if self.settings.trust_payment_slips {
            PaymentStatus::Paid
        } else {
            PaymentStatus::SubmittedForReview
        };
        // A replacement slip while under review keeps the review state.
        if !(current == next && current == PaymentStatus::SubmittedForReview) {
            current.transition_to(next)?;
        }

        let patch = Patch::new()
            .set("payment_slip_url", slip_url)
            .set(FIELD_PAYMENT_STATUS, next);
        self.write_payment(id, current, patch).await?;

        info!(
            event_name = "workflow.purchase_order.payment_slip_uploaded",
            purchase_order_id = %id,
            payment_status = %next,
            "payment slip uploaded"
        );
        dispatch(
            &*self.notifier,
            Notification::new(
                NotificationEvent::PaymentSlipUploaded,
                id.clone(),
                purchase_order.data.vendor_id,
            )
            .with_payload("payment_slip_url", slip_url)
            .with_payload("payment_status", next.as_str()),
        )
        .await;
        Ok(next)
    }

    /// Vendor accepts the payment (a reviewed slip or cash at the shop).
    pub async fn confirm_payment(&self, id: &PurchaseOrderId) -> Result<(), WorkflowError> {
        let purchase_order = load::<PurchaseOrder, _>(&*self.store, id).await?;
        let current = purchase_order.data.payment_status;
        let next = current.transition_to(PaymentStatus::Paid)?;
        self.write_payment(id, current, Patch::new().set(FIELD_PAYMENT_STATUS, next)).await?;

        info!(
            event_name = "workflow.purchase_order.payment_confirmed",
            purchase_order_id = %id,
            from = %current,
            "payment confirmed"
        );
        dispatch(
            &*self.notifier,
            Notification::new(
                NotificationEvent::PaymentConfirmed,
                id.clone(),
                purchase_order.data.buyer_id,
            )
            .with_payload("total_amount", purchase_order.data.total_amount.to_string()),
        )
        .await;
        Ok(())
    }

    /// Vendor turns down a slip under review; the buyer has to upload again.
    pub async fn reject_payment_slip(
        &self,
        id: &PurchaseOrderId,
        reason: &str,
    ) -> Result<(), WorkflowError> {
        require_non_blank("reason", reason)?;
        let purchase_order = load::<PurchaseOrder, _>(&*self.store, id).await?;
        let current = purchase_order.data.payment_status;
        if current != PaymentStatus::SubmittedForReview {
            return Err(WorkflowError::Validation(format!(
                "payment of `{id}` is {current}, not under review"
            )));
        }
        let next = current.transition_to(PaymentStatus::Pending)?;
        let patch = Patch::new()
            .set(FIELD_PAYMENT_STATUS, next)
            .set("payment_slip_url", Value::Null);
        self.write_payment(id, current, patch).await?;

        info!(
            event_name = "workflow.purchase_order.payment_slip_rejected",
            purchase_order_id = %id,
            "payment slip rejected"
        );
        dispatch(
            &*self.notifier,
            Notification::new(
                NotificationEvent::PaymentSlipRejected,
                id.clone(),
                purchase_order.data.buyer_id,
            )
            .with_payload("reason", reason),
        )
        .await;
        Ok(())
    }

    pub async fn refund_payment(&self, id: &PurchaseOrderId) -> Result<(), WorkflowError> {
        let purchase_order = load::<PurchaseOrder, _>(&*self.store, id).await?;
        let current = purchase_order.data.payment_status;
        let next = current.transition_to(PaymentStatus::Refunded)?;
        self.write_payment(id, current, Patch::new().set(FIELD_PAYMENT_STATUS, next)).await?;

        info!(
            event_name = "workflow.purchase_order.payment_refunded",
            purchase_order_id = %id,
            total_amount = %purchase_order.data.total_amount,
            "payment refunded"
        );
        Ok(())
    }

    async fn write_payment(
        &self,
        id: &PurchaseOrderId,
        current: PaymentStatus,
        patch: Patch,
    ) -> Result<(), WorkflowError> {
        let write = WriteOp::update(PurchaseOrder::COLLECTION, id.record_id(), patch)
            .guarded(status_is(FIELD_PAYMENT_STATUS, current));
        Ok(self.store.batch_write(vec![write]).await?)
    }

    pub async fn get_purchase_order(
        &self,
        id: &PurchaseOrderId,
    ) -> Result<Stored<PurchaseOrder>, WorkflowError> {
        load(&*self.store, id).await
    }

    pub async fn list_by_buyer(
        &self,
        buyer_id: &str,
    ) -> Result<Vec<Stored<PurchaseOrder>>, WorkflowError> {
        let query = Query::new().filter_eq("buyer_id", buyer_id).newest_first();
        Ok(self.store.find_documents::<PurchaseOrder>(query).await?)
    }

    pub async fn list_by_vendor(
        &self,
        vendor_id: &str,
    ) -> Result<Vec<Stored<PurchaseOrder>>, WorkflowError> {
        let query = Query::new().filter_eq("vendor_id", vendor_id).newest_first();
        Ok(self.store.find_documents::<PurchaseOrder>(query).await?)
    }
}

fn status_patch(outcome: &TransitionOutcome, extra: StatusUpdateExtra) -> Patch {
    let mut patch = Patch::new().set(FIELD_STATUS, outcome.to);
    match outcome.to {
        PurchaseOrderStatus::Cancelled => {
            if let Some(reason) = extra.rejection_reason {
                patch = patch.set("rejection_reason", reason);
            }
        }
        PurchaseOrderStatus::Confirmed => {
            if let Some(message) = extra.vendor_message {
                patch = patch.set("vendor_message", message);
            }
            if let Some(estimated) = extra.estimated_delivery {
                patch = patch.set("expected_delivery_date", timestamp::to_value(estimated));
            }
        }
        PurchaseOrderStatus::Shipped => {
            if let Some(tracking_number) = extra.tracking_number {
                patch = patch.set("tracking_number", tracking_number);
            }
        }
        PurchaseOrderStatus::Pending
        | PurchaseOrderStatus::InProgress
        | PurchaseOrderStatus::Delivered => {}
    }
    patch
}

/// The document as it reads once `patch` has landed on it.
fn patched(
    purchase_order: &Stored<PurchaseOrder>,
    patch: &Patch,
) -> Result<PurchaseOrder, WorkflowError> {
    let mut record = Record::new(
        purchase_order.id.record_id(),
        encode(&purchase_order.data)?,
        purchase_order.updated_at,
    );
    patch.apply_to(&mut record)?;
    Ok(record.decode::<PurchaseOrder>()?.data)
}

fn status_notification(
    event: NotificationEvent,
    id: &PurchaseOrderId,
    purchase_order: &PurchaseOrder,
) -> Notification {
    let mut notification = Notification::new(event, id.clone(), purchase_order.buyer_id.clone())
        .with_payload("order_number", purchase_order.order_number.clone())
        .with_payload("status", purchase_order.status.as_str());
    let details = [
        ("rejection_reason", &purchase_order.rejection_reason),
        ("vendor_message", &purchase_order.vendor_message),
        ("tracking_number", &purchase_order.tracking_number),
    ];
    for (key, value) in details {
        if let Some(value) = value {
            notification = notification.with_payload(key, value.clone());
        }
    }
    notification
}
