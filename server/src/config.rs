//! Environment-driven configuration, validated eagerly at startup so a
//! malformed address, key, or URL fails boot rather than the first request.

use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub rpc_url: String,
    pub channel_manager_address: Address,
    pub signing_key: PrivateKeySigner,
    pub chain_id: Option<u64>,
    pub db_pool_size: u32,
    pub rpc_timeout: Duration,
}

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_POOL_SIZE: u32 = sequencer_store::DEFAULT_POOL_SIZE;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = sequencer_settlement::DEFAULT_RPC_TIMEOUT_SECS;

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = optional_env("PORT")?
            .map(|s| s.parse().context("PORT must be a u16"))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let database_url = require_env("DATABASE_URL")?;
        let rpc_url = require_env("RPC_URL")?;

        let channel_manager_address: Address = require_env("CHANNEL_MANAGER_ADDRESS")?
            .parse()
            .context("CHANNEL_MANAGER_ADDRESS must be a 20-byte hex address")?;

        let private_key_hex = require_env("SEQUENCER_PRIVATE_KEY")?;
        let signing_key: PrivateKeySigner = private_key_hex
            .parse()
            .context("SEQUENCER_PRIVATE_KEY must be a 32-byte hex private key")?;

        let chain_id = optional_env("CHAIN_ID")?
            .map(|s| s.parse().context("CHAIN_ID must be a u64"))
            .transpose()?;

        let db_pool_size = optional_env("DB_POOL_SIZE")?
            .map(|s| s.parse().context("DB_POOL_SIZE must be a u32"))
            .transpose()?
            .unwrap_or(DEFAULT_DB_POOL_SIZE);

        let rpc_timeout_secs = optional_env("RPC_TIMEOUT_SECS")?
            .map(|s| s.parse().context("RPC_TIMEOUT_SECS must be a u64"))
            .transpose()?
            .unwrap_or(DEFAULT_RPC_TIMEOUT_SECS);

        Ok(Self {
            port,
            database_url,
            rpc_url,
            channel_manager_address,
            signing_key,
            chain_id,
            db_pool_size,
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn optional_env(key: &str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("invalid environment variable {key}")),
    }
}
