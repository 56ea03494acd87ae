use crate::commands::{command_runtime, CommandResult};
use saralytics_core::config::{AppConfig, LoadOptions};
use saralytics_db::{connect_writable, fixtures, migrations};
use serde_json::json;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match command_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_writable(&config.database.url, config.database.timeout_secs)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = fixtures::seed_demo_dataset(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = fixtures::verify_dataset(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        pool.close().await;

        if verification.matches(&seeded) {
            Ok(seeded)
        } else {
            Err((
                "seed_verification",
                format!(
                    "expected {} rows across {} items, found {} rows across {} items",
                    seeded.rows_inserted,
                    seeded.distinct_items,
                    verification.row_count,
                    verification.distinct_items
                ),
                6u8,
            ))
        }
    });

    match result {
        Ok(seeded) => CommandResult::success_with(
            "seed",
            format!(
                "demo sales dataset loaded into `{}`: {} invoices across {} items",
                config.database.url, seeded.rows_inserted, seeded.distinct_items
            ),
            Some(json!({
                "rows_inserted": seeded.rows_inserted,
                "distinct_items": seeded.distinct_items,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
