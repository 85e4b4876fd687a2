pub mod engine;
pub mod states;

pub use engine::{plan_purchase_order_transition, FlowTransitionError, StatusMachine};
pub use states::{
    FlowAction, PaymentStatus, PurchaseOrderStatus, QuotationRequestStatus, QuotationStatus,
    TransitionOutcome,
};
