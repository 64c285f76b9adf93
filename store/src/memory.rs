//! A `ChannelStore` backed by nothing but a `HashMap`, for tests that need
//! persistence semantics without a live Postgres instance.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::Address;
use async_trait::async_trait;
use sequencer_core::{Channel, ChannelId, SequencerError};

use crate::ChannelStore;

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<ChannelId, Channel>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChannelStore for InMemoryStore {
    async fn load_all(&self) -> Result<HashMap<ChannelId, Channel>, SequencerError> {
        Ok(self.rows.lock().expect("lock poisoned").clone())
    }

    async fn upsert(&self, channel: &Channel) -> Result<(), SequencerError> {
        self.rows
            .lock()
            .expect("lock poisoned")
            .insert(channel.channel_id, channel.clone());
        Ok(())
    }

    async fn find_by_owner(&self, owner: Address) -> Result<Vec<ChannelId>, SequencerError> {
        Ok(self
            .rows
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|c| c.owner == owner)
            .map(|c| c.channel_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_load_all_round_trips() {
        let store = InMemoryStore::new();
        let channel = Channel::fresh(ChannelId::repeat_byte(0x01), Address::repeat_byte(0xAA), 1_000, 2_000_000_000);
        store.upsert(&channel).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.get(&channel.channel_id), Some(&channel));
    }

    #[tokio::test]
    async fn find_by_owner_filters_correctly() {
        let store = InMemoryStore::new();
        let owner = Address::repeat_byte(0xBB);
        let mine = Channel::fresh(ChannelId::repeat_byte(0x02), owner, 500, 2_000_000_000);
        let other = Channel::fresh(ChannelId::repeat_byte(0x03), Address::repeat_byte(0xCC), 500, 2_000_000_000);
        store.upsert(&mine).await.unwrap();
        store.upsert(&other).await.unwrap();

        let ids = store.find_by_owner(owner).await.unwrap();
        assert_eq!(ids, vec![mine.channel_id]);
    }
}
