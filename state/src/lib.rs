//! The authoritative in-memory channel map and the `settle`/`validate`
//! admission algorithm.
//!
//! Concurrency model: a sharded `DashMap<ChannelId, Arc<Mutex<Channel>>>`.
//! Reads of different channels proceed in parallel; structural insertion
//! (`seed`) takes the map's own per-shard lock briefly; mutation of a single
//! channel serialises behind that channel's own `tokio::sync::Mutex`, which
//! is held across the durable `Store::upsert` call — that is intentional,
//! see `settle` below.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use dashmap::DashMap;
use sequencer_core::{
    Channel, ChannelId, ChannelMessage, Crypto, RecipientBalance, SequencerError, Voucher,
};
use sequencer_store::ChannelStore;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Vouchers may carry a timestamp up to this far in the past, to tolerate
/// clock skew and in-flight signing latency.
pub const TIMESTAMP_TOLERANCE_SECS: u64 = 15 * 60;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before 1970")
        .as_secs()
}

pub struct State {
    channels: DashMap<ChannelId, Arc<Mutex<Channel>>>,
    store: Arc<dyn ChannelStore>,
    crypto: Crypto,
}

impl State {
    /// Bootstraps the in-memory map from durable storage. Call once at
    /// startup, before the HTTP listener binds.
    #[instrument(skip(store, crypto))]
    pub async fn bootstrap(store: Arc<dyn ChannelStore>, crypto: Crypto) -> Result<Self, SequencerError> {
        let loaded = store.load_all().await?;
        let channels = DashMap::with_capacity(loaded.len());
        for (id, channel) in loaded {
            channels.insert(id, Arc::new(Mutex::new(channel)));
        }
        info!(count = channels.len(), "state bootstrapped");
        Ok(Self { channels, store, crypto })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(store: Arc<dyn ChannelStore>, crypto: Crypto) -> Self {
        Self { channels: DashMap::new(), store, crypto }
    }

    /// Inserts a fresh channel at `sequenceNumber=0`. Fails `AlreadyExists`
    /// if the id is already known. Persists before returning.
    #[instrument(skip(self))]
    pub async fn seed(
        &self,
        channel_id: ChannelId,
        owner: Address,
        balance: u128,
        expiry_timestamp: u64,
    ) -> Result<Channel, SequencerError> {
        if self.channels.contains_key(&channel_id) {
            return Err(SequencerError::AlreadyExists(channel_id));
        }

        let channel = Channel::fresh(channel_id, owner, balance, expiry_timestamp);
        self.store.upsert(&channel).await?;

        // Between the containment check above and this insert, a concurrent
        // seed of the same id could have raced in; DashMap::entry makes the
        // structural insertion itself atomic, so the loser reports
        // AlreadyExists rather than silently clobbering the winner's row.
        match self.channels.entry(channel_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SequencerError::AlreadyExists(channel_id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(channel.clone())));
                Ok(channel)
            }
        }
    }

    /// Snapshot of the current channel state.
    pub async fn get(&self, channel_id: ChannelId) -> Result<Channel, SequencerError> {
        let entry = self
            .channels
            .get(&channel_id)
            .ok_or(SequencerError::NotFound(channel_id))?;
        Ok(entry.value().lock().await.clone())
    }

    /// All channel ids owned by `owner`. Walks the in-memory map so it never
    /// blocks on storage.
    pub async fn list_by_owner(&self, owner: Address) -> Vec<ChannelId> {
        let mut ids = Vec::new();
        for entry in self.channels.iter() {
            if entry.value().lock().await.owner == owner {
                ids.push(*entry.key());
            }
        }
        ids
    }

    /// Records the outcome of a successful on-chain `finalise` call: marks
    /// the channel terminal and stamps the settlement transaction hash.
    /// Does not re-check admission — the caller has already closed the
    /// channel on-chain by the time this is called.
    #[instrument(skip(self))]
    pub async fn mark_terminal(
        &self,
        channel_id: ChannelId,
        settlement_tx_hash: alloy_primitives::B256,
    ) -> Result<Channel, SequencerError> {
        let entry = self
            .channels
            .get(&channel_id)
            .ok_or(SequencerError::NotFound(channel_id))?
            .clone();
        let mut channel = entry.lock().await;

        let mut next = channel.clone();
        next.terminal = true;
        next.settlement_tx_hash = Some(settlement_tx_hash);

        self.store.upsert(&next).await?;
        *channel = next.clone();
        info!(channel_id = %channel_id, "channel marked terminal");
        Ok(next)
    }

    /// Pure, non-mutating replay of the `settle` admission checks.
    pub async fn validate(&self, voucher: &Voucher) -> Result<(), SequencerError> {
        let entry = self
            .channels
            .get(&voucher.channel_id)
            .ok_or(SequencerError::NotFound(voucher.channel_id))?;
        let channel = entry.value().lock().await;
        check_admission(&channel, voucher, &self.crypto, now_unix())?;
        Ok(())
    }

    /// The central admission algorithm. Persistence precedes
    /// the in-memory commit: if `Store::upsert` fails the channel's
    /// observable state remains the prior value. The channel's mutex is
    /// held across that call by design — it is what serialises admission
    /// per channel; see module docs.
    #[instrument(skip(self, voucher), fields(channel_id = %voucher.channel_id, sequence_number = voucher.sequence_number))]
    pub async fn settle(&self, voucher: Voucher) -> Result<Channel, SequencerError> {
        let entry = self
            .channels
            .get(&voucher.channel_id)
            .ok_or(SequencerError::NotFound(voucher.channel_id))?
            .clone();
        let mut channel = entry.lock().await;

        let now = now_unix();
        if let Err(e) = check_admission(&channel, &voucher, &self.crypto, now) {
            warn!(
                channel_id = %voucher.channel_id,
                sequence_number = channel.sequence_number,
                error = %e,
                "settle rejected"
            );
            return Err(e);
        }

        let cosignature = self.crypto.cosign(&message_for(&voucher));

        let mut next = channel.clone();
        next.sequence_number = voucher.sequence_number;
        next.recipients = merge_recipients(&channel.recipients, &voucher.recipients, &voucher.amounts);
        next.user_signature = Some(voucher.user_signature.clone());
        next.sequencer_signature = Some(cosignature?);
        next.signature_timestamp = voucher.timestamp;

        self.store.upsert(&next).await?;

        *channel = next.clone();
        info!(channel_id = %voucher.channel_id, sequence_number = next.sequence_number, "settle admitted");
        Ok(next)
    }
}

fn message_for(voucher: &Voucher) -> ChannelMessage<'_> {
    ChannelMessage {
        channel_id: voucher.channel_id,
        sequence_number: voucher.sequence_number,
        timestamp: voucher.timestamp,
        recipients: &voucher.recipients,
        amounts: &voucher.amounts,
    }
}

fn merge_recipients(
    existing: &[RecipientBalance],
    recipients: &[Address],
    amounts: &[u128],
) -> Vec<RecipientBalance> {
    let mut merged: HashMap<Address, u128> = existing
        .iter()
        .map(|r| (r.recipient_address, r.balance))
        .collect();
    for (recipient, amount) in recipients.iter().zip(amounts.iter()) {
        merged.insert(*recipient, *amount);
    }

    // Preserve first-seen order: existing recipients in their stored order,
    // then any brand-new recipients in voucher order.
    let mut order: Vec<Address> = existing.iter().map(|r| r.recipient_address).collect();
    for recipient in recipients {
        if !order.contains(recipient) {
            order.push(*recipient);
        }
    }

    order
        .into_iter()
        .map(|recipient_address| RecipientBalance {
            recipient_address,
            balance: merged[&recipient_address],
        })
        .collect()
}

/// The channel-expiry through signature-verification checks shared by
/// `validate` and `settle`.
fn check_admission(
    channel: &Channel,
    voucher: &Voucher,
    crypto: &Crypto,
    now: u64,
) -> Result<(), SequencerError> {
    if now > channel.expiry_timestamp {
        return Err(SequencerError::Expired {
            channel_id: channel.channel_id,
            expiry: channel.expiry_timestamp,
            now,
        });
    }

    if voucher.timestamp > channel.expiry_timestamp
        || voucher.timestamp + TIMESTAMP_TOLERANCE_SECS < now
    {
        return Err(SequencerError::BadTimestamp { timestamp: voucher.timestamp, now });
    }

    if voucher.sequence_number <= channel.sequence_number {
        return Err(SequencerError::StaleSequence {
            given: voucher.sequence_number,
            current: channel.sequence_number,
        });
    }

    if voucher.recipients.len() != voucher.amounts.len() {
        return Err(SequencerError::MalformedVoucher {
            recipients: voucher.recipients.len(),
            amounts: voucher.amounts.len(),
        });
    }

    for (recipient, &amount) in voucher.recipients.iter().zip(voucher.amounts.iter()) {
        let previous = channel.cumulative_for(recipient);
        if amount < previous {
            return Err(SequencerError::AmountRegression {
                recipient: *recipient,
                previous,
                attempted: amount,
            });
        }
    }

    let total_after = merge_recipients(&channel.recipients, &voucher.recipients, &voucher.amounts)
        .iter()
        .map(|r| r.balance)
        .sum::<u128>();
    if total_after > channel.balance {
        return Err(SequencerError::Insolvent { requested: total_after, balance: channel.balance });
    }

    crypto.verify(channel.owner, &message_for(voucher), &voucher.user_signature)?;

    Ok(())
}

#[cfg(test)]
mod tests;
