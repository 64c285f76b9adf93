//! Sequencer binary: loads `Config`, runs migrations, bootstraps `State`
//! from storage, verifies on-chain sequencer identity, then serves the API
//! until a graceful-shutdown signal arrives.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use config::Config;
use sequencer_api::{router, serve, AppState, ApiLimits};
use sequencer_core::{Crypto, Domain};
use sequencer_settlement::Settlement;
use sequencer_state::State as ChannelState;
use sequencer_store::Store;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let store = Store::connect(&config.database_url, config.db_pool_size)
        .await
        .context("connecting to database")?;
    store.init().await.context("running schema migrations")?;

    let chain_id = match config.chain_id {
        Some(id) => id,
        None => Settlement::resolve_chain_id(&config.rpc_url, config.rpc_timeout)
            .await
            .context("resolving chain id from RPC")?,
    };
    let domain = Domain { chain_id, verifying_contract: config.channel_manager_address };
    // `PrivateKeySigner` derefs to the underlying k256 signing key; Crypto
    // is the only component permitted to use it for voucher signing.
    let signing_key: k256::ecdsa::SigningKey = (*config.signing_key).clone();
    let crypto = Crypto::new(domain, signing_key);

    let state = ChannelState::bootstrap(Arc::new(store), crypto)
        .await
        .context("bootstrapping channel state from storage")?;

    let settlement = Settlement::connect(
        &config.rpc_url,
        config.channel_manager_address,
        config.signing_key,
        config.rpc_timeout,
    )
    .await
    .context("connecting to settlement RPC and verifying sequencer identity")?;

    let app_state = Arc::new(AppState { state: Arc::new(state), settlement: Arc::new(settlement) });
    let app = router(app_state, ApiLimits::default());

    let addr = ([0, 0, 0, 0], config.port).into();
    serve(addr, app, shutdown_signal()).await.context("serving HTTP API")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
