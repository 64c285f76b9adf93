//! Durable, crash-consistent persistence of channel records in Postgres.
//!
//! One table, one row per channel (see `schema::CREATE_TABLE`). Every write
//! is a single `upsert` statement so a crash mid-write can never leave a
//! row with some columns updated and others stale. Bootstrapping reads the
//! whole table back into memory (`load_all`) — the sequencer never reads
//! the database again on the hot path.

pub mod memory;
mod row;
mod schema;

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use sequencer_core::{Channel, ChannelId, SequencerError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, instrument};

pub use memory::InMemoryStore;
pub use row::ChannelRow;

/// Default size of the async connection pool. Tune per deployment; pool
/// exhaustion surfaces as `StorageFailure`, never as an indefinite hang.
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Persistence boundary the rest of the sequencer depends on. `Store` is the
/// Postgres implementation; `InMemoryStore` stands in for it in tests so
/// `sequencer-state` never needs a live database to exercise its admission
/// logic.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn load_all(&self) -> Result<HashMap<ChannelId, Channel>, SequencerError>;
    async fn upsert(&self, channel: &Channel) -> Result<(), SequencerError>;
    async fn find_by_owner(&self, owner: Address) -> Result<Vec<ChannelId>, SequencerError>;
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, SequencerError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| SequencerError::StorageFailure(format!("connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Idempotent schema creation. Tolerates an already-initialised schema;
    /// never tolerates one that is partially initialised (the `CREATE TABLE
    /// IF NOT EXISTS` either fully succeeds or the transaction rolls back).
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<(), SequencerError> {
        sqlx::query(schema::CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| SequencerError::StorageFailure(format!("init: {e}")))?;
        info!("storage schema ready");
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for Store {
    /// Full bootstrap read: every persisted channel, keyed by id.
    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<HashMap<ChannelId, Channel>, SequencerError> {
        let rows = sqlx::query_as::<_, ChannelRow>(schema::SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SequencerError::StorageFailure(format!("load_all: {e}")))?;

        let mut channels = HashMap::with_capacity(rows.len());
        for row in rows {
            let channel = row.into_channel()?;
            channels.insert(channel.channel_id, channel);
        }
        info!(count = channels.len(), "loaded channels from storage");
        Ok(channels)
    }

    /// Atomic write of a single channel's entire state. Must complete (and
    /// be durable) before the caller's `settle` response is emitted.
    #[instrument(skip(self, channel), fields(channel_id = %channel.channel_id))]
    async fn upsert(&self, channel: &Channel) -> Result<(), SequencerError> {
        let row = ChannelRow::from_channel(channel);
        sqlx::query(schema::UPSERT)
            .bind(row.channel_id)
            .bind(row.owner)
            .bind(row.balance)
            .bind(row.expiry_timestamp)
            .bind(row.sequence_number)
            .bind(row.user_signature)
            .bind(row.sequencer_signature)
            .bind(row.signature_timestamp)
            .bind(row.recipients)
            .bind(row.terminal)
            .bind(row.settlement_tx_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| SequencerError::StorageFailure(format!("upsert: {e}")))?;
        Ok(())
    }

    /// Every channel id owned by `owner`, in no particular order.
    #[instrument(skip(self))]
    async fn find_by_owner(&self, owner: Address) -> Result<Vec<ChannelId>, SequencerError> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(schema::SELECT_IDS_BY_OWNER)
            .bind(owner.as_slice())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SequencerError::StorageFailure(format!("find_by_owner: {e}")))?;

        rows.into_iter()
            .map(|(bytes,)| row::bytes_to_channel_id(&bytes))
            .collect()
    }
}
