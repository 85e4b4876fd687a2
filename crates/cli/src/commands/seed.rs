use crate::commands::{load_config, runtime, store_failure, CommandFailure, CommandResult};
use partsmart_db::{open_store, MarketplaceSeedDataset, SeedFlowInfo};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let store = open_store(&config).await.map_err(store_failure)?;

        let seed_result = MarketplaceSeedDataset::load(store.as_ref())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = MarketplaceSeedDataset::verify(store.as_ref())
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_message(&failed_checks), 6u8));
        }

        tracing::info!(
            event_name = "seed.loaded",
            records_created = seed_result.records_created,
            backend = config.store.backend.as_str(),
            "demo marketplace seeded"
        );
        Ok::<Vec<SeedFlowInfo>, CommandFailure>(seed_result.flows_seeded)
    });

    match result {
        Ok(flows) => CommandResult::success("seed", success_message(&flows)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn success_message(flows: &[SeedFlowInfo]) -> String {
    let flow_descriptions: Vec<String> = flows
        .iter()
        .map(|flow| format!("  - {}: {} ({})", flow.flow_type, flow.request_id, flow.description))
        .collect();
    format!(
        "demo marketplace loaded for {} lifecycle flows:\n{}",
        flows.len(),
        flow_descriptions.join("\n")
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
