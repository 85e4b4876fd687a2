use std::fmt::Debug;

use thiserror::Error;

use crate::flows::states::{
    FlowAction, PaymentStatus, PurchaseOrderStatus, QuotationRequestStatus, QuotationStatus,
    TransitionOutcome,
};
use crate::notify::NotificationEvent;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition { entity: &'static str, from: String, to: String },
}

/// A status field governed by a static successor table.
pub trait StatusMachine: Copy + Eq + Debug + Into<serde_json::Value> + 'static {
    const ENTITY: &'static str;

    fn all() -> &'static [Self];

    fn as_str(&self) -> &'static str;

    fn successors(self) -> &'static [Self];

    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    fn transition_to(self, next: Self) -> Result<Self, FlowTransitionError> {
        if self.can_transition_to(next) {
            return Ok(next);
        }
        Err(FlowTransitionError::InvalidTransition {
            entity: Self::ENTITY,
            from: self.as_str().to_owned(),
            to: next.as_str().to_owned(),
        })
    }

    /// Every status from which `next` is reachable in one step.
    fn predecessors(next: Self) -> Vec<Self> {
        Self::all().iter().copied().filter(|status| status.can_transition_to(next)).collect()
    }
}

impl StatusMachine for PurchaseOrderStatus {
    const ENTITY: &'static str = "purchase order";

    fn all() -> &'static [Self] {
        Self::ALL
    }

    fn as_str(&self) -> &'static str {
        PurchaseOrderStatus::as_str(self)
    }

    fn successors(self) -> &'static [Self] {
        use PurchaseOrderStatus::{Cancelled, Confirmed, Delivered, InProgress, Pending, Shipped};
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[InProgress, Shipped, Delivered, Cancelled],
            InProgress => &[Shipped, Delivered],
            Shipped => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }
}

impl StatusMachine for QuotationStatus {
    const ENTITY: &'static str = "quotation";

    fn all() -> &'static [Self] {
        Self::ALL
    }

    fn as_str(&self) -> &'static str {
        QuotationStatus::as_str(self)
    }

    fn successors(self) -> &'static [Self] {
        use QuotationStatus::{Accepted, Expired, Pending, Rejected};
        match self {
            Pending => &[Accepted, Rejected, Expired],
            Accepted | Rejected | Expired => &[],
        }
    }
}

impl StatusMachine for QuotationRequestStatus {
    const ENTITY: &'static str = "quotation request";

    fn all() -> &'static [Self] {
        Self::ALL
    }

    fn as_str(&self) -> &'static str {
        QuotationRequestStatus::as_str(self)
    }

    fn successors(self) -> &'static [Self] {
        use QuotationRequestStatus::{Cancelled, Completed, Pending, ReceivedQuotes};
        match self {
            Pending => &[ReceivedQuotes, Completed, Cancelled],
            ReceivedQuotes => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

impl StatusMachine for PaymentStatus {
    const ENTITY: &'static str = "payment";

    fn all() -> &'static [Self] {
        Self::ALL
    }

    fn as_str(&self) -> &'static str {
        PaymentStatus::as_str(self)
    }

    fn successors(self) -> &'static [Self] {
        use PaymentStatus::{Paid, Pending, Refunded, SubmittedForReview};
        match self {
            Pending => &[SubmittedForReview, Paid],
            SubmittedForReview => &[Paid, Pending],
            Paid => &[Refunded],
            Refunded => &[],
        }
    }
}

/// Checks a purchase-order status change against the transition table and
/// lists the side effects it carries.
pub fn plan_purchase_order_transition(
    from: PurchaseOrderStatus,
    to: PurchaseOrderStatus,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{NotifyBuyer, RecordCompletion};

    let to = from.transition_to(to)?;
    let actions = match to {
        PurchaseOrderStatus::Confirmed => vec![NotifyBuyer(NotificationEvent::OrderConfirmed)],
        PurchaseOrderStatus::Cancelled => vec![NotifyBuyer(NotificationEvent::OrderRejected)],
        PurchaseOrderStatus::Shipped => vec![NotifyBuyer(NotificationEvent::OrderShipped)],
        PurchaseOrderStatus::Delivered => {
            vec![RecordCompletion, NotifyBuyer(NotificationEvent::OrderDelivered)]
        }
        PurchaseOrderStatus::Pending | PurchaseOrderStatus::InProgress => Vec::new(),
    };

    Ok(TransitionOutcome { from, to, actions })
}
