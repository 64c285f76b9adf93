//! Error taxonomy shared by every sequencer component.
//!
//! This is the single `match` target for mapping a domain failure onto an
//! HTTP status (see `sequencer-api`). New variants must be added here, not
//! re-derived per crate, so the mapping can never silently diverge.

use alloy_primitives::Address;
use thiserror::Error;

use crate::types::ChannelId;

#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("channel not found: {0}")]
    NotFound(ChannelId),

    #[error("channel already exists: {0}")]
    AlreadyExists(ChannelId),

    #[error("channel {channel_id} expired at {expiry} (now {now})")]
    Expired {
        channel_id: ChannelId,
        expiry: u64,
        now: u64,
    },

    #[error("voucher timestamp {timestamp} outside the permitted window (now {now})")]
    BadTimestamp { timestamp: u64, now: u64 },

    #[error("stale sequence number {given}, channel is at {current}")]
    StaleSequence { given: u64, current: u64 },

    #[error("recipients and amounts arrays have different lengths: {recipients} vs {amounts}")]
    MalformedVoucher { recipients: usize, amounts: usize },

    #[error("cumulative amount for {recipient} regressed from {previous} to {attempted}")]
    AmountRegression {
        recipient: Address,
        previous: u128,
        attempted: u128,
    },

    #[error("insolvent: total cumulative {requested} exceeds deposit {balance}")]
    Insolvent { requested: u128, balance: u128 },

    #[error("signature does not recover to the channel owner")]
    BadSignature,

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("on-chain settlement reverted: {0}")]
    SettlementReverted(String),

    #[error("operation timed out")]
    Timeout,
}

impl SequencerError {
    /// Stable taxonomy kind, independent of the error message wording above.
    pub fn kind(&self) -> &'static str {
        match self {
            SequencerError::MalformedRequest(_) => "MalformedRequest",
            SequencerError::NotFound(_) => "NotFound",
            SequencerError::AlreadyExists(_) => "AlreadyExists",
            SequencerError::Expired { .. } => "Expired",
            SequencerError::BadTimestamp { .. } => "BadTimestamp",
            SequencerError::StaleSequence { .. } => "StaleSequence",
            SequencerError::MalformedVoucher { .. } => "MalformedRequest",
            SequencerError::AmountRegression { .. } => "AmountRegression",
            SequencerError::Insolvent { .. } => "Insolvent",
            SequencerError::BadSignature => "BadSignature",
            SequencerError::StorageFailure(_) => "StorageFailure",
            SequencerError::SettlementReverted(_) => "SettlementReverted",
            SequencerError::Timeout => "Timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;
