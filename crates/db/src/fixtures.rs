use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use partsmart_core::domain::order::{Order, OrderId};
use partsmart_core::domain::purchase_order::{
    DeliveryAddress, DeliveryMethod, PaymentMethod, PurchaseOrder, PurchaseOrderId,
};
use partsmart_core::domain::quotation::{
    NewQuotation, PartCondition, Quotation, QuotationId, QuotationLineInput,
};
use partsmart_core::domain::request::{
    BuyerSnapshot, NewQuotationRequest, QuotationRequest, QuotationRequestId, VehicleDetails,
};
use partsmart_core::flows::{
    PaymentStatus, PurchaseOrderStatus, QuotationRequestStatus, QuotationStatus,
};
use partsmart_core::store::{encode, Document, RecordId, RecordStore, StoreError, WriteOp};

/// Canonical demo marketplace: one lifecycle stage per flow.
const SEED_FLOWS: &[SeedFlowContract] = &[
    SeedFlowContract {
        flow_type: "open_request",
        request_id: "req-seed-001",
        request_status: QuotationRequestStatus::ReceivedQuotes,
        quotation_ids: &["qt-seed-001", "qt-seed-002"],
        purchase_order: None,
        description: "Brake pads request with two competing vendor quotations",
    },
    SeedFlowContract {
        flow_type: "awaiting_confirmation",
        request_id: "req-seed-002",
        request_status: QuotationRequestStatus::ReceivedQuotes,
        quotation_ids: &["qt-seed-003"],
        purchase_order: Some(("po-seed-001", PurchaseOrderStatus::Pending)),
        description: "Accepted headlight quotation with a pending purchase order",
    },
    SeedFlowContract {
        flow_type: "delivered",
        request_id: "req-seed-003",
        request_status: QuotationRequestStatus::ReceivedQuotes,
        quotation_ids: &["qt-seed-004"],
        purchase_order: Some(("po-seed-002", PurchaseOrderStatus::Delivered)),
        description: "Delivered radiator order with its completion record",
    },
];

const SEED_BUYER_ID: &str = "buyer-seed-001";
const SEED_VENDOR_IDS: &[&str] = &["vendor-seed-001", "vendor-seed-002"];

/// Deterministic demo dataset written straight to a record store.
pub struct MarketplaceSeedDataset;

impl MarketplaceSeedDataset {
    /// Writes every seed record that is not present yet. Safe to re-run.
    pub async fn load<S>(store: &S) -> Result<SeedResult, StoreError>
    where
        S: RecordStore + ?Sized,
    {
        let mut created = 0;
        for write in seed_writes()? {
            let collection = write.collection().to_owned();
            let id = write.id().clone();
            if store.get_by_id(&collection, &id).await?.is_some() {
                continue;
            }
            match store.batch_write(vec![write]).await {
                Ok(()) => created += 1,
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(error) => return Err(error),
            }
        }

        let flows_seeded = SEED_FLOWS
            .iter()
            .map(|flow| SeedFlowInfo {
                flow_type: flow.flow_type,
                request_id: flow.request_id,
                description: flow.description,
            })
            .collect();
        Ok(SeedResult { flows_seeded, records_created: created })
    }

    /// Verifies that seed records exist in the state the contract describes.
    pub async fn verify<S>(store: &S) -> Result<VerificationResult, StoreError>
    where
        S: RecordStore + ?Sized,
    {
        let mut checks = Vec::new();

        for flow in SEED_FLOWS {
            let request = store
                .get_by_id(QuotationRequest::COLLECTION, &RecordId::from(flow.request_id))
                .await?
                .map(|record| record.decode::<QuotationRequest>())
                .transpose()?;
            let request_ok = request.is_some_and(|request| {
                request.data.status == flow.request_status
                    && request.data.quotations_received as usize == flow.quotation_ids.len()
            });
            checks.push((flow.request_id, request_ok));

            for quotation_id in flow.quotation_ids {
                let exists = store
                    .get_by_id(Quotation::COLLECTION, &RecordId::from(*quotation_id))
                    .await?
                    .is_some();
                checks.push((*quotation_id, exists));
            }

            if let Some((purchase_order_id, status)) = flow.purchase_order {
                let purchase_order = store
                    .get_by_id(PurchaseOrder::COLLECTION, &RecordId::from(purchase_order_id))
                    .await?
                    .map(|record| record.decode::<PurchaseOrder>())
                    .transpose()?;
                let in_status = purchase_order
                    .is_some_and(|purchase_order| purchase_order.data.status == status);
                checks.push((purchase_order_id, in_status));

                if status == PurchaseOrderStatus::Delivered {
                    let order_id =
                        OrderId::for_purchase_order(&PurchaseOrderId(purchase_order_id.to_owned()));
                    let order_exists = store
                        .get_by_id(Order::COLLECTION, &RecordId(order_id.0))
                        .await?
                        .is_some();
                    checks.push(("delivered-order-recorded", order_exists));
                }
            }
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes every seed record.
    pub async fn clean<S>(store: &S) -> Result<(), StoreError>
    where
        S: RecordStore + ?Sized,
    {
        let deletes = seed_writes()?
            .iter()
            .map(|write| WriteOp::delete(write.collection(), write.id().clone()))
            .collect();
        store.batch_write(deletes).await
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedFlowContract {
    flow_type: &'static str,
    request_id: &'static str,
    request_status: QuotationRequestStatus,
    quotation_ids: &'static [&'static str],
    purchase_order: Option<(&'static str, PurchaseOrderStatus)>,
    description: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub flows_seeded: Vec<SeedFlowInfo>,
    pub records_created: usize,
}

#[derive(Debug)]
pub struct SeedFlowInfo {
    pub flow_type: &'static str,
    pub request_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

fn seed_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).single().unwrap_or_default()
}

fn seed_request(part_name: &str, vehicle: (&str, &str, u16)) -> QuotationRequest {
    let mut request = NewQuotationRequest {
        buyer_id: SEED_BUYER_ID.to_owned(),
        buyer: BuyerSnapshot {
            name: "Demo Buyer".to_owned(),
            email: "buyer@partsmart.test".to_owned(),
            phone: Some("+94 77 000 0000".to_owned()),
        },
        vehicle: VehicleDetails {
            make: vehicle.0.to_owned(),
            model: vehicle.1.to_owned(),
            year: Some(vehicle.2),
            variant: None,
        },
        part_name: part_name.to_owned(),
        description: format!("{part_name} for a {} {}", vehicle.0, vehicle.1),
        ..NewQuotationRequest::default()
    }
    .into_request();
    request.status = QuotationRequestStatus::ReceivedQuotes;
    request
}

fn seed_quotation(
    request_id: &str,
    vendor_id: &str,
    line: QuotationLineInput,
    status: QuotationStatus,
) -> Result<Quotation, StoreError> {
    let mut quotation = NewQuotation {
        quotation_request_id: QuotationRequestId(request_id.to_owned()),
        vendor_id: vendor_id.to_owned(),
        buyer_id: SEED_BUYER_ID.to_owned(),
        products: vec![line],
        currency: "LKR".to_owned(),
        valid_until: Some(seed_epoch() + Duration::days(3650)),
        delivery_timeframe: "2-3 days".to_owned(),
        terms: "Cash or bank transfer".to_owned(),
        notes: String::new(),
        image_urls: Vec::new(),
    }
    .into_quotation()
    .map_err(|error| StoreError::Decode(format!("seed quotation for `{request_id}`: {error}")))?;
    quotation.status = status;
    Ok(quotation)
}

fn seed_purchase_order(
    order_number: &str,
    quotation_id: &str,
    quotation: &Quotation,
    status: PurchaseOrderStatus,
    payment_status: PaymentStatus,
) -> PurchaseOrder {
    PurchaseOrder {
        order_number: order_number.to_owned(),
        quotation_id: QuotationId(quotation_id.to_owned()),
        quotation_request_id: quotation.quotation_request_id.clone(),
        buyer_id: quotation.buyer_id.clone(),
        vendor_id: quotation.vendor_id.clone(),
        products: quotation.products.clone(),
        total_amount: quotation.total_amount,
        currency: quotation.currency.clone(),
        delivery_method: DeliveryMethod::ArrangeDelivery,
        payment_method: PaymentMethod::BankTransfer,
        delivery_address: DeliveryAddress {
            street: "12 Galle Road".to_owned(),
            city: "Colombo".to_owned(),
            district: "Colombo".to_owned(),
            zip_code: "00300".to_owned(),
            country: "Sri Lanka".to_owned(),
        },
        expected_delivery_date: seed_epoch() + Duration::days(3),
        delivery_cost: Some(Decimal::new(750, 0)),
        delivery_cost_notes: None,
        delivery_cost_requested: true,
        payment_slip_url: None,
        rejection_reason: None,
        vendor_message: None,
        tracking_number: None,
        status,
        payment_status,
    }
}

fn create<T: Document>(id: &str, document: &T) -> Result<WriteOp, StoreError> {
    Ok(WriteOp::create(T::COLLECTION, RecordId::from(id), encode(document)?))
}

fn seed_writes() -> Result<Vec<WriteOp>, StoreError> {
    let mut open_request = seed_request("Front brake pads", ("Toyota", "Axio", 2016));
    open_request.quotations_received = 2;
    let mut headlight_request = seed_request("Left headlight", ("Honda", "Fit", 2014));
    headlight_request.quotations_received = 1;
    let mut radiator_request = seed_request("Radiator", ("Suzuki", "Wagon R", 2018));
    radiator_request.quotations_received = 1;

    let mut brake_line = QuotationLineInput::new("Front brake pad set", 1, Decimal::new(8_500, 0));
    brake_line.condition = Some(PartCondition::New);
    let mut used_brake_line =
        QuotationLineInput::new("Front brake pad set", 1, Decimal::new(5_200, 0));
    used_brake_line.condition = Some(PartCondition::Used);
    let headlight_line = QuotationLineInput::new("Headlight assembly", 1, Decimal::new(24_000, 0));
    let radiator_line = QuotationLineInput::new("Radiator core", 1, Decimal::new(31_500, 0));

    let pending_brakes =
        seed_quotation("req-seed-001", SEED_VENDOR_IDS[0], brake_line, QuotationStatus::Pending)?;
    let pending_used_brakes = seed_quotation(
        "req-seed-001",
        SEED_VENDOR_IDS[1],
        used_brake_line,
        QuotationStatus::Pending,
    )?;
    let accepted_headlight = seed_quotation(
        "req-seed-002",
        SEED_VENDOR_IDS[0],
        headlight_line,
        QuotationStatus::Accepted,
    )?;
    let accepted_radiator = seed_quotation(
        "req-seed-003",
        SEED_VENDOR_IDS[1],
        radiator_line,
        QuotationStatus::Accepted,
    )?;

    let pending_order = seed_purchase_order(
        "PO-20260115-090000-REQSEE",
        "qt-seed-003",
        &accepted_headlight,
        PurchaseOrderStatus::Pending,
        PaymentStatus::Pending,
    );
    let delivered_order = seed_purchase_order(
        "PO-20260115-091500-REQSEE",
        "qt-seed-004",
        &accepted_radiator,
        PurchaseOrderStatus::Delivered,
        PaymentStatus::Paid,
    );
    let completed = Order {
        purchase_order_id: PurchaseOrderId("po-seed-002".to_owned()),
        buyer_id: delivered_order.buyer_id.clone(),
        vendor_id: delivered_order.vendor_id.clone(),
        total_amount: delivered_order.total_amount,
        currency: delivered_order.currency.clone(),
        completed_date: seed_epoch() + Duration::days(2),
        delivered_date: Some(seed_epoch() + Duration::days(2)),
        rating: None,
        review: None,
    };
    let completed_id = OrderId::for_purchase_order(&completed.purchase_order_id);

    Ok(vec![
        create("req-seed-001", &open_request)?,
        create("req-seed-002", &headlight_request)?,
        create("req-seed-003", &radiator_request)?,
        create("qt-seed-001", &pending_brakes)?,
        create("qt-seed-002", &pending_used_brakes)?,
        create("qt-seed-003", &accepted_headlight)?,
        create("qt-seed-004", &accepted_radiator)?,
        create("po-seed-001", &pending_order)?,
        create("po-seed-002", &delivered_order)?,
        create(&completed_id.0, &completed)?,
    ])
}
