use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tempfile::TempDir;

use partsmart_core::config::{AppConfig, WorkflowConfig};
use partsmart_core::domain::purchase_order::{
    DeliveryAddress, DeliveryMethod, NewPurchaseOrder, PaymentMethod, PurchaseOrderId,
    StatusUpdateExtra,
};
use partsmart_core::domain::order::{Order, OrderId};
use partsmart_core::domain::purchase_order::PurchaseOrder;
use partsmart_core::domain::quotation::{NewQuotation, Quotation, QuotationId, QuotationLineInput};
use partsmart_core::domain::request::{NewQuotationRequest, QuotationRequestId, VehicleDetails};
use partsmart_core::flows::{
    PaymentStatus, PurchaseOrderStatus, QuotationRequestStatus, QuotationStatus, StatusMachine,
};
use partsmart_core::notify::{InMemoryNotifier, NotificationEvent};
use partsmart_core::store::{
    encode, Document, DocumentId, Patch, Query, Record, RecordId, RecordStore, StoreError,
    WriteOp,
};
use partsmart_core::workflow::{CompletionOutcome, Marketplace, RequestUpdate};
use partsmart_core::WorkflowError;
use partsmart_db::{connect_with_settings, migrations, InMemoryRecordStore, SqlRecordStore};

type TestMarketplace = Marketplace<dyn RecordStore, InMemoryNotifier>;

const BUYER: &str = "buyer-1";
const VENDOR_A: &str = "vendor-a";
const VENDOR_B: &str = "vendor-b";

async fn sql_store() -> Arc<dyn RecordStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    Arc::new(SqlRecordStore::new(pool))
}

/// A store on a real database file so that several pooled connections
/// contend for the SQLite write lock. The directory lives as long as the guard.
async fn file_store() -> (Arc<dyn RecordStore>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("partsmart.db").display());
    let pool = connect_with_settings(&url, 5, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    (Arc::new(SqlRecordStore::new(pool)), dir)
}

fn memory_store() -> Arc<dyn RecordStore> {
    Arc::new(InMemoryRecordStore::new())
}

fn marketplace(
    store: Arc<dyn RecordStore>,
    settings: WorkflowConfig,
) -> (TestMarketplace, Arc<InMemoryNotifier>) {
    let notifier = Arc::new(InMemoryNotifier::default());
    (Marketplace::new(store, notifier.clone(), settings), notifier)
}

fn default_settings() -> WorkflowConfig {
    AppConfig::default().workflow
}

fn brake_request() -> NewQuotationRequest {
    NewQuotationRequest {
        buyer_id: BUYER.to_owned(),
        vehicle: VehicleDetails {
            make: "Toyota".to_owned(),
            model: "Axio".to_owned(),
            year: Some(2016),
            variant: None,
        },
        part_name: "Front brake pads".to_owned(),
        description: "OEM or equivalent".to_owned(),
        ..NewQuotationRequest::default()
    }
}

fn quotation_for(
    request_id: &QuotationRequestId,
    vendor_id: &str,
    unit_price: i64,
) -> NewQuotation {
    NewQuotation {
        quotation_request_id: request_id.clone(),
        vendor_id: vendor_id.to_owned(),
        buyer_id: BUYER.to_owned(),
        products: vec![
            QuotationLineInput::new("Brake pad set", 2, Decimal::new(unit_price, 0)),
            QuotationLineInput::new("Fitting kit", 1, Decimal::new(500, 0)),
        ],
        currency: "lkr".to_owned(),
        valid_until: Some(Utc::now() + Duration::days(7)),
        delivery_timeframe: "2 days".to_owned(),
        terms: "Bank transfer".to_owned(),
        notes: String::new(),
        image_urls: Vec::new(),
    }
}

fn purchase_order_for(quotation_id: &QuotationId) -> NewPurchaseOrder {
    NewPurchaseOrder {
        quotation_id: quotation_id.clone(),
        buyer_id: BUYER.to_owned(),
        delivery_method: DeliveryMethod::ArrangeDelivery,
        payment_method: PaymentMethod::BankTransfer,
        delivery_address: Some(DeliveryAddress {
            street: "12 Galle Road".to_owned(),
            city: "Colombo".to_owned(),
            district: "Colombo".to_owned(),
            zip_code: "00300".to_owned(),
            country: "Sri Lanka".to_owned(),
        }),
    }
}

async fn full_lifecycle(store: Arc<dyn RecordStore>) {
    let (market, notifier) = marketplace(store, default_settings());

    let request_id = market.requests.create_request(brake_request()).await.expect("request");
    let first = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
        .await
        .expect("first quotation");
    let second = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_B, 3_500))
        .await
        .expect("second quotation");

    assert_eq!(first.request_update, RequestUpdate::Counted { quotations_received: 1 });
    assert_eq!(second.request_update, RequestUpdate::Counted { quotations_received: 2 });
    assert_eq!(first.total_amount, Decimal::new(8_500, 0));

    let request = market.requests.get_request(&request_id).await.expect("request reload");
    assert_eq!(request.data.status, QuotationRequestStatus::ReceivedQuotes);
    assert_eq!(request.data.quotations_received, 2);

    let quotations = market.quotations.list_by_request(&request_id).await.expect("list");
    assert_eq!(quotations.len(), 2);

    let created = market
        .purchase_orders
        .create_purchase_order(purchase_order_for(&first.quotation_id))
        .await
        .expect("purchase order");
    assert!(created.order_number.starts_with("PO-"), "{}", created.order_number);

    let accepted = market.quotations.get_quotation(&first.quotation_id).await.expect("quotation");
    assert_eq!(accepted.data.status, QuotationStatus::Accepted);

    let duplicate = market
        .purchase_orders
        .create_purchase_order(purchase_order_for(&first.quotation_id))
        .await
        .expect_err("quotation already accepted");
    assert!(matches!(duplicate, WorkflowError::InvalidTransition(_)), "{duplicate:?}");

    let po_id = created.purchase_order_id;
    let purchase_order = market.purchase_orders.get_purchase_order(&po_id).await.expect("po");
    assert_eq!(purchase_order.data.status, PurchaseOrderStatus::Pending);
    assert_eq!(purchase_order.data.payment_status, PaymentStatus::Pending);
    assert_eq!(purchase_order.data.total_amount, first.total_amount);
    assert_eq!(purchase_order.data.vendor_id, VENDOR_A);

    market
        .purchase_orders
        .update_purchase_order_status(
            &po_id,
            PurchaseOrderStatus::Confirmed,
            StatusUpdateExtra {
                vendor_message: Some("Ready in two days".to_owned()),
                ..StatusUpdateExtra::default()
            },
        )
        .await
        .expect("confirm");

    market
        .purchase_orders
        .send_delivery_cost(&po_id, Decimal::new(750, 0), Some("Courier".to_owned()))
        .await
        .expect("delivery cost");

    let payment = market
        .purchase_orders
        .upload_payment_slip(&po_id, "https://files.test/slip-1.png")
        .await
        .expect("slip");
    assert_eq!(payment, PaymentStatus::SubmittedForReview);
    market.purchase_orders.confirm_payment(&po_id).await.expect("payment confirmed");

    let backwards = market
        .purchase_orders
        .update_purchase_order_status(
            &po_id,
            PurchaseOrderStatus::Pending,
            StatusUpdateExtra::default(),
        )
        .await
        .expect_err("confirmed cannot return to pending");
    assert!(matches!(backwards, WorkflowError::InvalidTransition(_)));

    market
        .purchase_orders
        .update_purchase_order_status(
            &po_id,
            PurchaseOrderStatus::Shipped,
            StatusUpdateExtra {
                tracking_number: Some("TRK-001".to_owned()),
                ..StatusUpdateExtra::default()
            },
        )
        .await
        .expect("ship");

    let shipped = market.purchase_orders.get_purchase_order(&po_id).await.expect("po");
    assert_eq!(shipped.data.vendor_message.as_deref(), Some("Ready in two days"));
    assert_eq!(shipped.data.tracking_number.as_deref(), Some("TRK-001"));
    assert_eq!(shipped.data.delivery_cost, Some(Decimal::new(750, 0)));
    assert!(shipped.data.delivery_cost_requested);
    assert_eq!(shipped.data.payment_status, PaymentStatus::Paid);

    let delivered = market
        .purchase_orders
        .update_purchase_order_status(
            &po_id,
            PurchaseOrderStatus::Delivered,
            StatusUpdateExtra::default(),
        )
        .await
        .expect("deliver");
    assert!(delivered.requires_completion());

    let order = market
        .completion
        .get_order_for_purchase_order(&po_id)
        .await
        .expect("order read")
        .expect("order recorded");
    assert_eq!(order.data.buyer_id, BUYER);
    assert_eq!(order.data.total_amount, first.total_amount);
    assert_eq!(order.data.currency, "LKR");

    let again = market
        .completion
        .complete_purchase_order(&po_id, (&shipped.data).into())
        .await
        .expect("second completion");
    assert!(matches!(again, CompletionOutcome::AlreadyRecorded(_)));
    assert_eq!(market.completion.list_by_buyer(BUYER).await.expect("orders").len(), 1);

    let terminal = market
        .purchase_orders
        .update_purchase_order_status(
            &po_id,
            PurchaseOrderStatus::Cancelled,
            StatusUpdateExtra::default(),
        )
        .await
        .expect_err("delivered is terminal");
    assert!(matches!(terminal, WorkflowError::InvalidTransition(_)));

    assert_eq!(
        notifier.events_for(&po_id),
        vec![
            NotificationEvent::OrderConfirmed,
            NotificationEvent::DeliveryCostSent,
            NotificationEvent::PaymentSlipUploaded,
            NotificationEvent::PaymentConfirmed,
            NotificationEvent::OrderShipped,
            NotificationEvent::OrderDelivered,
        ]
    );
}

#[tokio::test]
async fn full_lifecycle_on_memory_store() {
    full_lifecycle(memory_store()).await;
}

#[tokio::test]
async fn full_lifecycle_on_sql_store() {
    full_lifecycle(sql_store().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchase_orders_accept_quotation_once() {
    let (file, _dir) = file_store().await;
    for store in [memory_store(), sql_store().await, file] {
        let (market, _) = marketplace(store, default_settings());
        let request_id = market.requests.create_request(brake_request()).await.expect("request");
        let quotation = market
            .quotations
            .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
            .await
            .expect("quotation");

        let (left, right) = tokio::join!(
            market
                .purchase_orders
                .create_purchase_order(purchase_order_for(&quotation.quotation_id)),
            market
                .purchase_orders
                .create_purchase_order(purchase_order_for(&quotation.quotation_id)),
        );

        let successes = [&left, &right].iter().filter(|result| result.is_ok()).count();
        assert_eq!(successes, 1, "left: {left:?}, right: {right:?}");
        let failure = if left.is_err() { left } else { right };
        assert!(matches!(
            failure,
            Err(WorkflowError::Conflict(_) | WorkflowError::InvalidTransition(_))
        ));
        assert_eq!(market.purchase_orders.list_by_buyer(BUYER).await.expect("list").len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completion_records_one_order() {
    let (file, _dir) = file_store().await;
    for store in [memory_store(), sql_store().await, file] {
        let (market, _) = marketplace(store, default_settings());
        let request_id = market.requests.create_request(brake_request()).await.expect("request");
        let quotation = market
            .quotations
            .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
            .await
            .expect("quotation");
        let created = market
            .purchase_orders
            .create_purchase_order(purchase_order_for(&quotation.quotation_id))
            .await
            .expect("purchase order");
        market
            .purchase_orders
            .update_purchase_order_status(
                &created.purchase_order_id,
                PurchaseOrderStatus::Confirmed,
                StatusUpdateExtra::default(),
            )
            .await
            .expect("confirm");

        let purchase_order = market
            .purchase_orders
            .get_purchase_order(&created.purchase_order_id)
            .await
            .expect("po");
        let (left, right) = tokio::join!(
            market
                .completion
                .complete_purchase_order(&created.purchase_order_id, (&purchase_order.data).into()),
            market
                .completion
                .complete_purchase_order(&created.purchase_order_id, (&purchase_order.data).into()),
        );

        let outcomes = [left.expect("left completion"), right.expect("right completion")];
        let recorded = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, CompletionOutcome::Recorded(_)))
            .count();
        assert_eq!(recorded, 1, "{outcomes:?}");
        assert_eq!(outcomes[0].order_id(), outcomes[1].order_id());
        assert_eq!(market.completion.list_by_vendor(VENDOR_A).await.expect("orders").len(), 1);
    }
}

#[tokio::test]
async fn cancellation_records_reason_and_blocks_payment() {
    let (market, notifier) = marketplace(memory_store(), default_settings());
    let request_id = market.requests.create_request(brake_request()).await.expect("request");
    let quotation = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
        .await
        .expect("quotation");
    let created = market
        .purchase_orders
        .create_purchase_order(purchase_order_for(&quotation.quotation_id))
        .await
        .expect("purchase order");

    market
        .purchase_orders
        .update_purchase_order_status(
            &created.purchase_order_id,
            PurchaseOrderStatus::Cancelled,
            StatusUpdateExtra {
                rejection_reason: Some("Out of stock".to_owned()),
                ..StatusUpdateExtra::default()
            },
        )
        .await
        .expect("cancel");

    let cancelled =
        market.purchase_orders.get_purchase_order(&created.purchase_order_id).await.expect("po");
    assert_eq!(cancelled.data.status, PurchaseOrderStatus::Cancelled);
    assert_eq!(cancelled.data.rejection_reason.as_deref(), Some("Out of stock"));
    assert_eq!(
        notifier.events_for(&created.purchase_order_id),
        vec![NotificationEvent::OrderRejected]
    );

    let error = market
        .purchase_orders
        .upload_payment_slip(&created.purchase_order_id, "https://files.test/slip.png")
        .await
        .expect_err("cancelled order takes no payment");
    assert!(matches!(error, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn trusted_slips_mark_payment_paid() {
    let settings = WorkflowConfig { trust_payment_slips: true, ..default_settings() };
    let (market, _) = marketplace(memory_store(), settings);
    let request_id = market.requests.create_request(brake_request()).await.expect("request");
    let quotation = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
        .await
        .expect("quotation");
    let created = market
        .purchase_orders
        .create_purchase_order(purchase_order_for(&quotation.quotation_id))
        .await
        .expect("purchase order");

    let status = market
        .purchase_orders
        .upload_payment_slip(&created.purchase_order_id, "https://files.test/slip.png")
        .await
        .expect("slip");
    assert_eq!(status, PaymentStatus::Paid);

    let again = market
        .purchase_orders
        .upload_payment_slip(&created.purchase_order_id, "https://files.test/slip-2.png")
        .await
        .expect_err("paid order takes no second slip");
    assert!(matches!(again, WorkflowError::InvalidTransition(_)));

    market.purchase_orders.refund_payment(&created.purchase_order_id).await.expect("refund");
    let refunded =
        market.purchase_orders.get_purchase_order(&created.purchase_order_id).await.expect("po");
    assert_eq!(refunded.data.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn rejected_slip_returns_payment_to_pending() {
    let (market, notifier) = marketplace(sql_store().await, default_settings());
    let request_id = market.requests.create_request(brake_request()).await.expect("request");
    let quotation = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
        .await
        .expect("quotation");
    let created = market
        .purchase_orders
        .create_purchase_order(purchase_order_for(&quotation.quotation_id))
        .await
        .expect("purchase order");
    let id = &created.purchase_order_id;

    market
        .purchase_orders
        .upload_payment_slip(id, "https://files.test/blurry.png")
        .await
        .expect("slip");
    market.purchase_orders.reject_payment_slip(id, "Unreadable").await.expect("reject");

    let reloaded = market.purchase_orders.get_purchase_order(id).await.expect("po");
    assert_eq!(reloaded.data.payment_status, PaymentStatus::Pending);
    assert_eq!(reloaded.data.payment_slip_url, None);
    assert!(notifier.events_for(id).contains(&NotificationEvent::PaymentSlipRejected));

    let error = market
        .purchase_orders
        .reject_payment_slip(id, "Again")
        .await
        .expect_err("nothing to review");
    assert!(matches!(error, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn quotation_for_missing_request_is_kept() {
    let (market, _) = marketplace(memory_store(), default_settings());
    let orphan = QuotationRequestId("req-missing".to_owned());

    let created = market
        .quotations
        .create_quotation(quotation_for(&orphan, VENDOR_A, 1_000))
        .await
        .expect("quotation stored anyway");
    assert_eq!(created.request_update, RequestUpdate::RequestMissing);
    assert!(market.quotations.get_quotation(&created.quotation_id).await.is_ok());
}

#[tokio::test]
async fn closed_request_still_counts_quotations() {
    let (market, _) = marketplace(sql_store().await, default_settings());
    let request_id = market.requests.create_request(brake_request()).await.expect("request");
    market.requests.cancel_request(&request_id).await.expect("cancel");

    let created = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 1_000))
        .await
        .expect("quotation");
    assert_eq!(created.request_update, RequestUpdate::Counted { quotations_received: 1 });

    let request = market.requests.get_request(&request_id).await.expect("request");
    assert_eq!(request.data.status, QuotationRequestStatus::Cancelled);
}

#[tokio::test]
async fn stale_quotations_expire_and_cannot_be_ordered() {
    for store in [memory_store(), sql_store().await] {
        let (market, _) = marketplace(store, default_settings());
        let request_id = market.requests.create_request(brake_request()).await.expect("request");

        let mut stale_input = quotation_for(&request_id, VENDOR_A, 1_000);
        stale_input.valid_until = Some(Utc::now() - Duration::hours(1));
        let stale = market.quotations.create_quotation(stale_input).await.expect("stale");
        let fresh = market
            .quotations
            .create_quotation(quotation_for(&request_id, VENDOR_B, 1_000))
            .await
            .expect("fresh");

        let error = market
            .purchase_orders
            .create_purchase_order(purchase_order_for(&stale.quotation_id))
            .await
            .expect_err("expired quotation");
        assert!(matches!(error, WorkflowError::Validation(_)));

        let expired = market.quotations.expire_stale(Utc::now()).await.expect("expire");
        assert_eq!(expired, vec![stale.quotation_id.clone()]);

        let stale_status = market.quotations.get_quotation(&stale.quotation_id).await.expect("q");
        assert_eq!(stale_status.data.status, QuotationStatus::Expired);
        let fresh_status = market.quotations.get_quotation(&fresh.quotation_id).await.expect("q");
        assert_eq!(fresh_status.data.status, QuotationStatus::Pending);
    }
}

#[tokio::test]
async fn unknown_purchase_order_is_not_found() {
    let (market, _) = marketplace(memory_store(), default_settings());
    let error = market
        .purchase_orders
        .update_purchase_order_status(
            &PurchaseOrderId("po-missing".to_owned()),
            PurchaseOrderStatus::Confirmed,
            StatusUpdateExtra::default(),
        )
        .await
        .expect_err("missing");
    assert!(matches!(error, WorkflowError::NotFound { .. }));
}

/// Passes everything through until armed; after the next successful write,
/// every read fails as if the store went away.
struct ReadsFailAfterWrite {
    inner: Arc<dyn RecordStore>,
    armed: AtomicBool,
    reads_failing: AtomicBool,
}

impl ReadsFailAfterWrite {
    fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self { inner, armed: AtomicBool::new(false), reads_failing: AtomicBool::new(false) }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn heal(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.reads_failing.store(false, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for ReadsFailAfterWrite {
    async fn get_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        self.check_read()?;
        self.inner.get_by_id(collection, id).await
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Record>, StoreError> {
        self.check_read()?;
        self.inner.query(collection, query).await
    }

    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<(), StoreError> {
        self.inner.batch_write(operations).await?;
        if self.armed.load(Ordering::SeqCst) {
            self.reads_failing.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test]
async fn committed_status_change_survives_a_failed_read_back() {
    let flaky = Arc::new(ReadsFailAfterWrite::new(memory_store()));
    let store: Arc<dyn RecordStore> = flaky.clone();
    let (market, notifier) = marketplace(store, default_settings());
    let request_id = market.requests.create_request(brake_request()).await.expect("request");
    let quotation = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
        .await
        .expect("quotation");
    let created = market
        .purchase_orders
        .create_purchase_order(purchase_order_for(&quotation.quotation_id))
        .await
        .expect("purchase order");

    flaky.arm();
    let outcome = market
        .purchase_orders
        .update_purchase_order_status(
            &created.purchase_order_id,
            PurchaseOrderStatus::Confirmed,
            StatusUpdateExtra {
                vendor_message: Some("Ready tomorrow".to_owned()),
                ..StatusUpdateExtra::default()
            },
        )
        .await
        .expect("write committed, so the update succeeds");
    assert_eq!(outcome.to, PurchaseOrderStatus::Confirmed);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1, "{sent:?}");
    assert_eq!(sent[0].event, NotificationEvent::OrderConfirmed);
    assert_eq!(sent[0].recipient_id, BUYER);
    assert_eq!(sent[0].payload["status"], "confirmed");
    assert_eq!(sent[0].payload["vendor_message"], "Ready tomorrow");
    assert_eq!(sent[0].payload["order_number"], created.order_number);

    flaky.heal();
    let stored =
        market.purchase_orders.get_purchase_order(&created.purchase_order_id).await.expect("po");
    assert_eq!(stored.data.status, PurchaseOrderStatus::Confirmed);
}

#[tokio::test]
async fn counted_quotation_survives_a_failed_read_back() {
    let flaky = Arc::new(ReadsFailAfterWrite::new(memory_store()));
    let store: Arc<dyn RecordStore> = flaky.clone();
    let (market, _) = marketplace(store, default_settings());
    let request_id = market.requests.create_request(brake_request()).await.expect("request");

    flaky.arm();
    let created = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
        .await
        .expect("quotation");
    assert_eq!(created.request_update, RequestUpdate::CountedWithoutTotal);
    assert!(created.request_update.is_counted());

    flaky.heal();
    let request = market.requests.get_request(&request_id).await.expect("request");
    assert_eq!(request.data.quotations_received, 1);
    assert_eq!(request.data.status, QuotationRequestStatus::ReceivedQuotes);
}

async fn shipped_order(market: &TestMarketplace) -> PurchaseOrderId {
    let request_id = market.requests.create_request(brake_request()).await.expect("request");
    let quotation = market
        .quotations
        .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
        .await
        .expect("quotation");
    let created = market
        .purchase_orders
        .create_purchase_order(purchase_order_for(&quotation.quotation_id))
        .await
        .expect("purchase order");
    for status in [PurchaseOrderStatus::Confirmed, PurchaseOrderStatus::Shipped] {
        market
            .purchase_orders
            .update_purchase_order_status(
                &created.purchase_order_id,
                status,
                StatusUpdateExtra::default(),
            )
            .await
            .expect("advance");
    }
    created.purchase_order_id
}

#[tokio::test]
async fn delivery_recorded_elsewhere_is_not_announced_twice() {
    for store in [memory_store(), sql_store().await] {
        let (market, notifier) = marketplace(store.clone(), default_settings());
        let po_id = shipped_order(&market).await;

        // Another caller recorded the order after this one read the status.
        let order = Order {
            purchase_order_id: po_id.clone(),
            buyer_id: BUYER.to_owned(),
            vendor_id: VENDOR_A.to_owned(),
            total_amount: Decimal::new(8_500, 0),
            currency: "LKR".to_owned(),
            completed_date: Utc::now(),
            delivered_date: Some(Utc::now()),
            rating: None,
            review: None,
        };
        store
            .create_with_id(
                Order::COLLECTION,
                &OrderId::for_purchase_order(&po_id).record_id(),
                encode(&order).expect("encode"),
            )
            .await
            .expect("order recorded elsewhere");

        let outcome = market
            .purchase_orders
            .update_purchase_order_status(
                &po_id,
                PurchaseOrderStatus::Delivered,
                StatusUpdateExtra::default(),
            )
            .await
            .expect("already recorded is not an error");
        assert_eq!(outcome.to, PurchaseOrderStatus::Delivered);
        assert!(!notifier.events_for(&po_id).contains(&NotificationEvent::OrderDelivered));
        assert_eq!(market.completion.list_by_buyer(BUYER).await.expect("orders").len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_announce_once() {
    let (store, _dir) = file_store().await;
    let (market, notifier) = marketplace(store, default_settings());
    let po_id = shipped_order(&market).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let market = market.clone();
        let po_id = po_id.clone();
        handles.push(tokio::spawn(async move {
            market
                .purchase_orders
                .update_purchase_order_status(
                    &po_id,
                    PurchaseOrderStatus::Delivered,
                    StatusUpdateExtra::default(),
                )
                .await
        }));
    }
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) | Err(WorkflowError::InvalidTransition(_) | WorkflowError::Conflict(_)) => {}
            Err(error) => panic!("unexpected delivery failure: {error:?}"),
        }
    }

    let delivered = notifier
        .events_for(&po_id)
        .into_iter()
        .filter(|event| *event == NotificationEvent::OrderDelivered)
        .count();
    assert_eq!(delivered, 1);
    assert_eq!(market.completion.list_by_buyer(BUYER).await.expect("orders").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_quotations_on_a_file_database_all_land() {
    let (store, _dir) = file_store().await;
    let (market, _) = marketplace(store, default_settings());
    let request_id = market.requests.create_request(brake_request()).await.expect("request");

    let mut handles = Vec::new();
    for index in 0..8_i64 {
        let market = market.clone();
        let request_id = request_id.clone();
        handles.push(tokio::spawn(async move {
            let vendor = format!("vendor-{index}");
            market
                .quotations
                .create_quotation(quotation_for(&request_id, &vendor, 1_000 + index))
                .await
        }));
    }
    for handle in handles {
        let created = handle.await.expect("join").expect("quotation");
        assert!(created.request_update.is_counted(), "{:?}", created.request_update);
    }

    let quotations = market.quotations.list_by_request(&request_id).await.expect("list");
    assert_eq!(quotations.len(), 8);
    let request = market.requests.get_request(&request_id).await.expect("request");
    assert_eq!(request.data.quotations_received, 8);
}

#[tokio::test]
async fn purchase_order_keeps_its_quotation_snapshot() {
    for store in [memory_store(), sql_store().await] {
        let (market, _) = marketplace(store.clone(), default_settings());
        let request_id = market.requests.create_request(brake_request()).await.expect("request");
        let quotation = market
            .quotations
            .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
            .await
            .expect("quotation");
        let created = market
            .purchase_orders
            .create_purchase_order(purchase_order_for(&quotation.quotation_id))
            .await
            .expect("purchase order");
        let po_id = &created.purchase_order_id;
        let before = market.purchase_orders.get_purchase_order(po_id).await.expect("po");

        store
            .update(
                Quotation::COLLECTION,
                &quotation.quotation_id.record_id(),
                Patch::new()
                    .set("total_amount", "1")
                    .set("currency", "USD")
                    .set(
                        "products",
                        json!([{
                            "part_name": "Wiper blade",
                            "quantity": 1,
                            "unit_price": "1",
                            "total_price": "1"
                        }]),
                    ),
            )
            .await
            .expect("quotation edited after ordering");

        let after = market.purchase_orders.get_purchase_order(po_id).await.expect("po");
        assert_eq!(after.data, before.data);
        assert_eq!(after.data.total_amount, Decimal::new(8_500, 0));
        assert_eq!(after.data.currency, "LKR");
        assert_eq!(after.data.products.len(), 2);
    }
}

#[tokio::test]
async fn illegal_status_changes_leave_the_order_untouched() {
    for store in [memory_store(), sql_store().await] {
        let (market, notifier) = marketplace(store.clone(), default_settings());
        let request_id = market.requests.create_request(brake_request()).await.expect("request");
        let quotation = market
            .quotations
            .create_quotation(quotation_for(&request_id, VENDOR_A, 4_000))
            .await
            .expect("quotation");
        let created = market
            .purchase_orders
            .create_purchase_order(purchase_order_for(&quotation.quotation_id))
            .await
            .expect("purchase order");
        let po_id = &created.purchase_order_id;

        for &from in PurchaseOrderStatus::ALL {
            store
                .update(
                    PurchaseOrder::COLLECTION,
                    &po_id.record_id(),
                    Patch::new().set("status", from),
                )
                .await
                .expect("force status");
            for &to in PurchaseOrderStatus::ALL.iter().filter(|to| !from.can_transition_to(**to)) {
                let error = market
                    .purchase_orders
                    .update_purchase_order_status(po_id, to, StatusUpdateExtra::default())
                    .await
                    .expect_err("illegal transition");
                assert!(matches!(error, WorkflowError::InvalidTransition(_)), "{from} -> {to}");
                let stored = market.purchase_orders.get_purchase_order(po_id).await.expect("po");
                assert_eq!(stored.data.status, from, "{from} -> {to}");
            }
        }
        assert!(notifier.events_for(po_id).is_empty());
        let order = market.completion.get_order_for_purchase_order(po_id).await.expect("read");
        assert!(order.is_none());
    }
}

#[tokio::test]
async fn buyer_lookups_keep_leading_zeros() {
    for store in [memory_store(), sql_store().await] {
        let (market, _) = marketplace(store, default_settings());
        let mut input = brake_request();
        input.buyer_id = "0771234567".to_owned();
        market.requests.create_request(input).await.expect("request");

        assert!(market.requests.list_by_buyer("771234567").await.expect("list").is_empty());
        assert_eq!(market.requests.list_by_buyer("0771234567").await.expect("list").len(), 1);
    }
}
