pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod notify;
pub mod store;
pub mod timestamp;
pub mod workflow;

pub use config::{AppConfig, ConfigError, StoreBackend, WorkflowConfig};
pub use domain::order::{CompletionDetails, Order, OrderId};
pub use domain::purchase_order::{
    DeliveryAddress, DeliveryMethod, NewPurchaseOrder, PaymentMethod, PurchaseOrder,
    PurchaseOrderId, StatusUpdateExtra,
};
pub use domain::quotation::{
    NewQuotation, PartCondition, Quotation, QuotationId, QuotationLine, QuotationLineInput,
};
pub use domain::request::{
    BuyerSnapshot, NewQuotationRequest, QuotationRequest, QuotationRequestId, VehicleDetails,
};
pub use errors::{InterfaceError, WorkflowError};
pub use flows::{
    PaymentStatus, PurchaseOrderStatus, QuotationRequestStatus, QuotationStatus, StatusMachine,
};
pub use notify::{InMemoryNotifier, NoopNotifier, Notification, NotificationEvent, Notifier};
pub use store::{DocumentStore, RecordStore, StoreError, Stored};
pub use workflow::{
    CompletionOutcome, Marketplace, OrderCompletionRecorder, PurchaseOrderCreated,
    PurchaseOrderWorkflow, QuotationCreated, QuotationEngine, QuotationRequestTracker,
    RequestUpdate,
};
