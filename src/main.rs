//! Refundflow backend entrypoint: wires configuration, the database pool,
//! both gateway adapters, the services, and the background workers.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use refundflow_backend::config::{AppConfig, LogFormat};
use refundflow_backend::credentials::{CredentialStore, EnvCredentialStore};
use refundflow_backend::database::account_validation_repository::{
    AccountValidationRepository, PgAccountValidationRepository,
};
use refundflow_backend::database::bank_mapping_repository::{
    BankMappingRepository, PgBankMappingRepository,
};
use refundflow_backend::database::refund_repository::{PgRefundRepository, RefundRepository};
use refundflow_backend::database::{health_check, init_pool_from_config};
use refundflow_backend::gateway::{GatewayAdapter, HttpGatewayAdapter};
use refundflow_backend::services::{
    AccountValidator, BankSyncService, FeePolicy, HttpTicketingClient, RefundOrchestrator,
    TicketingClient,
};
use refundflow_backend::settings::{PgSettingsStore, Settings, SettingsStore};
use refundflow_backend::signer::{HmacSigner, Signer};
use refundflow_backend::sync::KeyedMutex;
use refundflow_backend::workers::{RetrySweeper, ValidationPoller};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;

    init_tracing(&config);
    info!("starting refundflow backend");

    let pool = init_pool_from_config(&config.database).await?;
    health_check(&pool).await?;

    // Repositories
    let refunds: Arc<dyn RefundRepository> = Arc::new(PgRefundRepository::new(pool.clone()));
    let banks: Arc<dyn BankMappingRepository> =
        Arc::new(PgBankMappingRepository::new(pool.clone()));
    let validations: Arc<dyn AccountValidationRepository> =
        Arc::new(PgAccountValidationRepository::new(pool.clone()));
    let settings_store: Arc<dyn SettingsStore> = Arc::new(PgSettingsStore::new(pool.clone()));
    let settings = Settings::new(settings_store);

    // Gateway adapters, one per provider
    let credentials: Arc<dyn CredentialStore> = Arc::new(EnvCredentialStore::new());
    let disburser: Arc<dyn GatewayAdapter> = Arc::new(HttpGatewayAdapter::new(
        &config.gateway.disbursement,
        config.gateway.environment.clone(),
        credentials.clone(),
    )?);
    let inquirer: Arc<dyn GatewayAdapter> = Arc::new(HttpGatewayAdapter::new(
        &config.gateway.inquiry,
        config.gateway.environment.clone(),
        credentials,
    )?);

    // Collaborators
    let ticketing: Arc<dyn TicketingClient> = Arc::new(HttpTicketingClient::new(&config.ticketing)?);
    let signer: Arc<dyn Signer> = Arc::new(HmacSigner::new(config.refund.signing_secret.clone()));
    let fee_policy = FeePolicy::from_config(&config.refund)?;
    let locks = Arc::new(KeyedMutex::new());

    // Services
    let orchestrator = Arc::new(RefundOrchestrator::new(
        refunds.clone(),
        banks.clone(),
        disburser.clone(),
        ticketing.clone(),
        settings.clone(),
        fee_policy,
        locks.clone(),
        config.ticketing.fetch_detail,
    ));
    let validator = Arc::new(AccountValidator::new(
        banks.clone(),
        validations.clone(),
        inquirer.clone(),
        settings.clone(),
        signer,
        locks.clone(),
    ));
    let bank_sync = BankSyncService::new(banks.clone(), disburser.clone(), inquirer.clone());

    // Refresh the bank catalogue before serving; a failed sync is not fatal
    // as long as mappings from a previous run exist
    if let Err(e) = bank_sync.sync().await {
        error!(error = %e, "bank catalogue sync failed at startup");
    }

    match disburser.get_balance().await {
        Ok(balance) => info!(
            available = balance.available,
            currency = %balance.currency,
            "disbursement balance"
        ),
        Err(e) => error!(error = %e, "failed to fetch disbursement balance"),
    }

    // Background workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = RetrySweeper::new(
        refunds.clone(),
        orchestrator.clone(),
        locks.clone(),
        config.refund.sweep_interval_secs,
        config.refund.sweep_lookback_hours,
        shutdown_rx.clone(),
    );
    let sweeper_handle = tokio::spawn(sweeper.run());

    let (poll_tx, poll_rx) = mpsc::channel(64);
    ValidationPoller::enqueue_pending(&validations, &poll_tx).await;
    let poller = ValidationPoller::new(
        validations.clone(),
        validator.clone(),
        poll_rx,
        shutdown_rx,
    );
    let poller_handle = tokio::spawn(poller.run());

    info!("refundflow backend running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    drop(poll_tx);

    let _ = sweeper_handle.await;
    let _ = poller_handle.await;

    pool.close().await;
    info!("refundflow backend stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Plain => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
