//! Core data model: channels, vouchers and the dually-signed state that
//! results from a successful `settle`.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// 32-byte channel identifier, derived on-chain as
/// `keccak(owner || expiryTime || amount || domainSeparator)`. The sequencer
/// never recomputes it — only indexes by it.
pub type ChannelId = B256;

/// A recipient's running cumulative allocation within a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientBalance {
    pub recipient_address: Address,
    /// Cumulative amount owed to this recipient across the channel's lifetime.
    pub balance: u128,
}

/// The authoritative, persisted state of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: ChannelId,
    pub owner: Address,
    /// Original deposit; the "remaining" capacity is derived as
    /// `balance - sum(recipients[].balance)`.
    pub balance: u128,
    pub expiry_timestamp: u64,
    pub sequence_number: u64,
    pub recipients: Vec<RecipientBalance>,
    pub user_signature: Option<Vec<u8>>,
    pub sequencer_signature: Option<Vec<u8>>,
    pub signature_timestamp: u64,
    /// Set once `finalise` has successfully closed the channel on-chain.
    pub terminal: bool,
    pub settlement_tx_hash: Option<B256>,
}

impl Channel {
    pub fn fresh(channel_id: ChannelId, owner: Address, balance: u128, expiry_timestamp: u64) -> Self {
        Self {
            channel_id,
            owner,
            balance,
            expiry_timestamp,
            sequence_number: 0,
            recipients: Vec::new(),
            user_signature: None,
            sequencer_signature: None,
            signature_timestamp: 0,
            terminal: false,
            settlement_tx_hash: None,
        }
    }

    /// Cumulative amount currently recorded for `recipient`, or zero if unseen.
    pub fn cumulative_for(&self, recipient: &Address) -> u128 {
        self.recipients
            .iter()
            .find(|r| &r.recipient_address == recipient)
            .map(|r| r.balance)
            .unwrap_or(0)
    }

    /// Parallel `(address, amount)` arrays in the order typed-data hashing expects.
    pub fn recipient_arrays(&self) -> (Vec<Address>, Vec<u128>) {
        let addrs = self.recipients.iter().map(|r| r.recipient_address).collect();
        let amounts = self.recipients.iter().map(|r| r.balance).collect();
        (addrs, amounts)
    }
}

/// A payer-signed voucher in its canonical array form. Single-recipient
/// convenience vouchers are expanded into this form before any invariant
/// check runs (see `sequencer-api::dto::canonicalize`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voucher {
    pub channel_id: ChannelId,
    pub sequence_number: u64,
    pub timestamp: u64,
    pub recipients: Vec<Address>,
    pub amounts: Vec<u128>,
    pub user_signature: Vec<u8>,
}

impl Voucher {
    pub fn total_amount(&self) -> u128 {
        self.amounts.iter().sum()
    }
}
