use partsmart_core::config::{AppConfig, LoadOptions, StoreBackend};
use partsmart_core::store::RecordId;
use partsmart_db::{connect_with_config, migrations, open_store, DbPool};
use serde::Serialize;

const PROBE_COLLECTION: &str = "quotation_requests";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_workflow_settings(&config));
            checks.extend(check_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["workflow_settings", "database_connectivity", "store_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_workflow_settings(config: &AppConfig) -> DoctorCheck {
    let review = if config.workflow.trust_payment_slips {
        "payment slips are trusted and mark orders paid on upload"
    } else {
        "payment slips wait for vendor review"
    };
    DoctorCheck {
        name: "workflow_settings",
        status: CheckStatus::Pass,
        details: format!(
            "order numbers use prefix `{}`; {review}",
            config.workflow.order_number_prefix
        ),
    }
}

fn check_store(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                DoctorCheck {
                    name: "store_readiness",
                    status: CheckStatus::Skipped,
                    details: "skipped because the runtime did not start".to_string(),
                },
            ];
        }
    };

    runtime.block_on(async {
        let connectivity = match config.store.backend {
            StoreBackend::Memory => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: "memory backend does not use a database".to_string(),
            },
            StoreBackend::Sqlite => match connect_with_config(&config.database).await {
                Ok(pool) => {
                    let pending = pending_migrations(&pool).await;
                    pool.close().await;
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Pass,
                        details: format!(
                            "connected using `{}`; {pending}",
                            config.database.url
                        ),
                    }
                }
                Err(error) => DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                },
            },
        };

        if connectivity.status == CheckStatus::Fail {
            return vec![
                connectivity,
                DoctorCheck {
                    name: "store_readiness",
                    status: CheckStatus::Skipped,
                    details: "skipped because the database is unreachable".to_string(),
                },
            ];
        }

        let readiness = match open_store(config).await {
            Ok(store) => match store
                .get_by_id(PROBE_COLLECTION, &RecordId::from("doctor-probe"))
                .await
            {
                Ok(_) => DoctorCheck {
                    name: "store_readiness",
                    status: CheckStatus::Pass,
                    details: format!(
                        "`{}` store answered a probe read",
                        config.store.backend.as_str()
                    ),
                },
                Err(error) => DoctorCheck {
                    name: "store_readiness",
                    status: CheckStatus::Fail,
                    details: format!("probe read failed: {error}"),
                },
            },
            Err(error) => DoctorCheck {
                name: "store_readiness",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        };

        vec![connectivity, readiness]
    })
}

async fn pending_migrations(pool: &DbPool) -> String {
    let available = migrations::available_count();
    match migrations::applied_count(pool).await {
        Ok(applied) => format!("{applied} of {available} migrations applied"),
        Err(_) => format!("migrations not yet applied ({available} available)"),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
