use std::sync::Arc;
use std::time::Instant;

use crate::commands::CommandResult;
use partsmart_core::config::{AppConfig, LoadOptions};
use partsmart_core::domain::order::CompletionDetails;
use partsmart_core::domain::purchase_order::{
    DeliveryMethod, NewPurchaseOrder, PaymentMethod, StatusUpdateExtra,
};
use partsmart_core::domain::quotation::{NewQuotation, QuotationId, QuotationLineInput};
use partsmart_core::domain::request::{NewQuotationRequest, QuotationRequestId, VehicleDetails};
use partsmart_core::flows::{PaymentStatus, PurchaseOrderStatus, QuotationRequestStatus};
use partsmart_core::notify::{InMemoryNotifier, NotificationEvent};
use partsmart_core::store::RecordStore;
use partsmart_core::workflow::{CompletionOutcome, Marketplace};
use partsmart_core::WorkflowError;
use partsmart_db::open_store;
use rust_decimal::Decimal;
use serde::Serialize;

const SMOKE_BUYER: &str = "smoke-buyer";
const SMOKE_VENDORS: [&str; 2] = ["smoke-vendor-a", "smoke-vendor-b"];

/// Checks after `store_open`, in execution order.
const SCENARIO_STEPS: &[&str] = &[
    "request_created",
    "quotations_received",
    "purchase_order_created",
    "duplicate_order_rejected",
    "order_confirmed",
    "payment_settled",
    "order_shipped",
    "order_delivered",
    "completion_idempotent",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

type SmokeMarketplace = Marketplace<dyn RecordStore, InMemoryNotifier>;

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            return finalize_report(checks, started);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "store_open",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            return finalize_report(checks, started);
        }
    };

    runtime.block_on(async {
        let store_started = Instant::now();
        let store = match open_store(&config).await {
            Ok(store) => {
                checks.push(SmokeCheck {
                    name: "store_open",
                    status: SmokeStatus::Pass,
                    elapsed_ms: elapsed_ms(store_started),
                    message: format!("opened `{}` store", config.store.backend.as_str()),
                });
                store
            }
            Err(error) => {
                checks.push(SmokeCheck {
                    name: "store_open",
                    status: SmokeStatus::Fail,
                    elapsed_ms: elapsed_ms(store_started),
                    message: error.to_string(),
                });
                return;
            }
        };

        let notifier = Arc::new(InMemoryNotifier::default());
        let market: SmokeMarketplace =
            Marketplace::new(store, notifier.clone(), config.workflow.clone());
        let mut recorder = StepRecorder { checks: &mut checks };
        run_scenario(&market, &notifier, &mut recorder).await;
    });

    finalize_report(checks, started)
}

struct StepRecorder<'a> {
    checks: &'a mut Vec<SmokeCheck>,
}

impl StepRecorder<'_> {
    fn record<T>(
        &mut self,
        name: &'static str,
        started: Instant,
        result: Result<(T, String), String>,
    ) -> Option<T> {
        let elapsed_ms = elapsed_ms(started);
        match result {
            Ok((value, message)) => {
                let status = SmokeStatus::Pass;
                self.checks.push(SmokeCheck { name, status, elapsed_ms, message });
                Some(value)
            }
            Err(message) => {
                let status = SmokeStatus::Fail;
                self.checks.push(SmokeCheck { name, status, elapsed_ms, message });
                None
            }
        }
    }
}

async fn run_scenario(
    market: &SmokeMarketplace,
    notifier: &InMemoryNotifier,
    recorder: &mut StepRecorder<'_>,
) -> Option<()> {
    let started = Instant::now();
    let created = market.requests.create_request(smoke_request()).await;
    let request_id = recorder.record(
        "request_created",
        started,
        created.map(|id| {
            let message = format!("quotation request `{id}` created");
            (id, message)
        })
        .map_err(|error| describe("request_created", error)),
    )?;

    let started = Instant::now();
    let quotations = async {
        let mut ids = Vec::new();
        for (vendor, unit_price) in SMOKE_VENDORS.iter().zip([4_200i64, 3_900]) {
            let created = market
                .quotations
                .create_quotation(smoke_quotation(&request_id, vendor, unit_price))
                .await
                .map_err(|error| describe("quotations_received", error))?;
            ids.push(created.quotation_id);
        }
        let request = market
            .requests
            .get_request(&request_id)
            .await
            .map_err(|error| describe("quotations_received", error))?;
        if request.data.quotations_received != 2
            || request.data.status != QuotationRequestStatus::ReceivedQuotes
        {
            return Err(format!(
                "expected 2 quotations and `received_quotes`, found {} and `{}`",
                request.data.quotations_received, request.data.status
            ));
        }
        Ok::<_, String>((ids, "request counted 2 quotations".to_string()))
    }
    .await;
    let quotation_ids = recorder.record("quotations_received", started, quotations)?;
    let chosen = quotation_ids.first()?.clone();

    let started = Instant::now();
    let order = market
        .purchase_orders
        .create_purchase_order(smoke_purchase_order(&chosen))
        .await
        .map(|created| {
            let message = format!("purchase order `{}` created", created.order_number);
            (created.purchase_order_id, message)
        })
        .map_err(|error| describe("purchase_order_created", error));
    let purchase_order_id = recorder.record("purchase_order_created", started, order)?;

    let started = Instant::now();
    let duplicate = match market
        .purchase_orders
        .create_purchase_order(smoke_purchase_order(&chosen))
        .await
    {
        Ok(created) => Err(format!(
            "accepted quotation produced a second purchase order `{}`",
            created.order_number
        )),
        Err(error) => {
            let interface = error.into_interface("smoke:duplicate_order_rejected");
            Ok(((), format!("rejected as {}: {interface}", interface.error_class())))
        }
    };
    recorder.record("duplicate_order_rejected", started, duplicate)?;

    let started = Instant::now();
    let confirmed = async {
        market
            .purchase_orders
            .update_purchase_order_status(
                &purchase_order_id,
                PurchaseOrderStatus::Confirmed,
                StatusUpdateExtra {
                    vendor_message: Some("smoke confirmation".to_string()),
                    ..StatusUpdateExtra::default()
                },
            )
            .await
            .map_err(|error| describe("order_confirmed", error))?;
        if !notifier.events_for(&purchase_order_id).contains(&NotificationEvent::OrderConfirmed) {
            return Err("buyer was not notified of the confirmation".to_string());
        }
        Ok::<_, String>(((), "confirmed and buyer notified".to_string()))
    }
    .await;
    recorder.record("order_confirmed", started, confirmed)?;

    let started = Instant::now();
    let payment = async {
        let workflow = &market.purchase_orders;
        workflow
            .send_delivery_cost(&purchase_order_id, Decimal::new(650, 0), None)
            .await
            .map_err(|error| describe("payment_settled", error))?;
        let status = workflow
            .upload_payment_slip(&purchase_order_id, "https://files.partsmart.test/smoke-slip.png")
            .await
            .map_err(|error| describe("payment_settled", error))?;
        if status == PaymentStatus::SubmittedForReview {
            workflow
                .confirm_payment(&purchase_order_id)
                .await
                .map_err(|error| describe("payment_settled", error))?;
        }
        let reloaded = workflow
            .get_purchase_order(&purchase_order_id)
            .await
            .map_err(|error| describe("payment_settled", error))?;
        if reloaded.data.payment_status != PaymentStatus::Paid {
            return Err(format!("payment ended in `{}`", reloaded.data.payment_status));
        }
        Ok::<_, String>(((), "delivery cost sent, payment slip accepted".to_string()))
    }
    .await;
    recorder.record("payment_settled", started, payment)?;

    let started = Instant::now();
    let shipped = market
        .purchase_orders
        .update_purchase_order_status(
            &purchase_order_id,
            PurchaseOrderStatus::Shipped,
            StatusUpdateExtra {
                tracking_number: Some("SMOKE-TRK".to_string()),
                ..StatusUpdateExtra::default()
            },
        )
        .await
        .map(|outcome| ((), format!("{} -> {}", outcome.from, outcome.to)))
        .map_err(|error| describe("order_shipped", error));
    recorder.record("order_shipped", started, shipped)?;

    let started = Instant::now();
    let delivered = async {
        market
            .purchase_orders
            .update_purchase_order_status(
                &purchase_order_id,
                PurchaseOrderStatus::Delivered,
                StatusUpdateExtra::default(),
            )
            .await
            .map_err(|error| describe("order_delivered", error))?;
        let order = market
            .completion
            .get_order_for_purchase_order(&purchase_order_id)
            .await
            .map_err(|error| describe("order_delivered", error))?
            .ok_or_else(|| "no order recorded for delivered purchase order".to_string())?;
        Ok::<_, String>((order.data, format!("order `{}` recorded", order.id)))
    }
    .await;
    let order = recorder.record("order_delivered", started, delivered)?;

    let started = Instant::now();
    let details = CompletionDetails {
        buyer_id: order.buyer_id,
        vendor_id: order.vendor_id,
        total_amount: order.total_amount,
        currency: order.currency,
    };
    let repeated = match market
        .completion
        .complete_purchase_order(&purchase_order_id, details)
        .await
    {
        Ok(CompletionOutcome::AlreadyRecorded(order_id)) => {
            Ok(((), format!("repeat completion returned existing order `{order_id}`")))
        }
        Ok(CompletionOutcome::Recorded(order_id)) => {
            Err(format!("repeat completion recorded a second order `{order_id}`"))
        }
        Err(error) => Err(describe("completion_idempotent", error)),
    };
    recorder.record("completion_idempotent", started, repeated)
}

fn smoke_request() -> NewQuotationRequest {
    NewQuotationRequest {
        buyer_id: SMOKE_BUYER.to_string(),
        vehicle: VehicleDetails {
            make: "Nissan".to_string(),
            model: "Leaf".to_string(),
            year: Some(2019),
            variant: None,
        },
        part_name: "Side mirror".to_string(),
        description: "Smoke scenario request".to_string(),
        ..NewQuotationRequest::default()
    }
}

fn smoke_quotation(
    request_id: &QuotationRequestId,
    vendor_id: &str,
    unit_price: i64,
) -> NewQuotation {
    NewQuotation {
        quotation_request_id: request_id.clone(),
        vendor_id: vendor_id.to_string(),
        buyer_id: SMOKE_BUYER.to_string(),
        products: vec![QuotationLineInput::new(
            "Side mirror assembly",
            1,
            Decimal::new(unit_price, 0),
        )],
        currency: "LKR".to_string(),
        valid_until: None,
        delivery_timeframe: "1 day".to_string(),
        terms: String::new(),
        notes: String::new(),
        image_urls: Vec::new(),
    }
}

fn smoke_purchase_order(quotation_id: &QuotationId) -> NewPurchaseOrder {
    NewPurchaseOrder {
        quotation_id: quotation_id.clone(),
        buyer_id: SMOKE_BUYER.to_string(),
        delivery_method: DeliveryMethod::CollectFromShop,
        payment_method: PaymentMethod::BankTransfer,
        delivery_address: None,
    }
}

/// Renders a failed step the way callers outside the workflow would see it.
fn describe(check: &'static str, error: WorkflowError) -> String {
    let interface = error.into_interface(format!("smoke:{check}"));
    format!(
        "{interface} [{}; correlation_id={}] {}",
        interface.error_class(),
        interface.correlation_id(),
        interface.user_message()
    )
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_ms(started), value)),
        Err(error) => Err((elapsed_ms(started), error)),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(mut checks: Vec<SmokeCheck>, started: Instant) -> CommandResult {
    let expected = ["config_validation", "store_open"].iter().chain(SCENARIO_STEPS);
    for name in expected {
        if !checks.iter().any(|check| check.name == *name) {
            checks.push(skipped(name));
        }
    }

    let total_elapsed_ms = elapsed_ms(started);
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
