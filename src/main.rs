//! Enrollment store shell.
//!
//! Connects to the hosted backend, loads every collection into the store and
//! reports what it found.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use enrollment_store::{Config, EnrollmentStore, Gateway};

#[tokio::main]
async fn main() -> ExitCode {
    // Missing backend settings are fatal before anything else starts.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting enrollment store");
    tracing::info!("Backend: {}", config.backend_url);
    tracing::info!("Profile bucket: {}", config.profile_bucket);

    let gateway = match Gateway::new(&config) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            tracing::error!(code = err.error_code(), "{}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut store = EnrollmentStore::new(gateway);
    store.fetch_all().await;

    let state = store.state();
    tracing::info!(
        "Loaded {} classes, {} students, {} enrollments, {} payments",
        state.classes().len(),
        state.students().len(),
        state.enrollments().len(),
        state.payments().len()
    );

    let stats = state.payment_stats();
    tracing::info!(
        "Payments: {} total, {} completed, {} pending, {:.2} collected",
        stats.total,
        stats.completed,
        stats.pending,
        stats.total_amount
    );

    match state.error() {
        Some(message) => {
            tracing::error!("Last load error: {}", message);
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}
