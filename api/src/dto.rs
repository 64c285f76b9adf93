//! Wire shapes and the single-recipient canonicalisation step. Nothing here
//! touches `State` or `Store` — parsing failures reject synchronously,
//! before any channel lock is taken.

use alloy_primitives::{Address, B256};
use sequencer_core::{ChannelId, RecipientBalance, SequencerError, Voucher};
use serde::{Deserialize, Serialize};

pub fn parse_address(s: &str) -> Result<Address, SequencerError> {
    s.parse()
        .map_err(|_| SequencerError::MalformedRequest(format!("invalid address: {s}")))
}

pub fn parse_channel_id(s: &str) -> Result<ChannelId, SequencerError> {
    s.parse()
        .map_err(|_| SequencerError::MalformedRequest(format!("invalid channelId: {s}")))
}

pub fn parse_u128_decimal(s: &str) -> Result<u128, SequencerError> {
    s.parse()
        .map_err(|_| SequencerError::MalformedRequest(format!("invalid integer amount: {s}")))
}

pub fn parse_signature(s: &str) -> Result<Vec<u8>, SequencerError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)
        .map_err(|_| SequencerError::MalformedRequest(format!("invalid hex signature: {s}")))?;
    if bytes.len() != 65 {
        return Err(SequencerError::MalformedRequest(format!(
            "signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn encode_address(address: &Address) -> String {
    format!("{address:?}")
}

fn encode_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRequest {
    pub channel_id: String,
    pub owner: String,
    pub balance: String,
    pub expiry_timestamp: u64,
}

impl SeedRequest {
    pub fn parse(self) -> Result<(ChannelId, Address, u128, u64), SequencerError> {
        Ok((
            parse_channel_id(&self.channel_id)?,
            parse_address(&self.owner)?,
            parse_u128_decimal(&self.balance)?,
            self.expiry_timestamp,
        ))
    }
}

/// Accepts both the single-recipient convenience form (`receiver`/`amount`)
/// and the explicit array form (`recipients`/`amounts`). Exactly one form
/// must be present; mixing both, or supplying neither, is `MalformedRequest`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherRequest {
    pub channel_id: String,
    pub sequence_number: u64,
    pub timestamp: u64,
    pub user_signature: String,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    /// Accepted and ignored: free-text annotation some callers attach to a
    /// voucher for their own bookkeeping.
    #[serde(default)]
    #[allow(dead_code)]
    pub purpose: Option<String>,
}

impl VoucherRequest {
    /// Expands whichever form was supplied into the canonical array form.
    /// The array form is authoritative, matching the on-chain contract;
    /// a single `receiver`/`amount` pair is sugar for a one-element array.
    pub fn canonicalize(self) -> Result<Voucher, SequencerError> {
        let channel_id = parse_channel_id(&self.channel_id)?;
        let user_signature = parse_signature(&self.user_signature)?;

        let has_single = self.receiver.is_some() || self.amount.is_some();
        let has_array = !self.recipients.is_empty() || !self.amounts.is_empty();

        let (recipients, amounts) = match (has_single, has_array) {
            (true, true) => {
                return Err(SequencerError::MalformedRequest(
                    "voucher must not mix single-recipient and array recipient forms".into(),
                ))
            }
            (false, false) => {
                return Err(SequencerError::MalformedRequest(
                    "voucher must supply either receiver/amount or recipients[]/amounts[]".into(),
                ))
            }
            (true, false) => {
                let receiver = self.receiver.ok_or_else(|| {
                    SequencerError::MalformedRequest("receiver missing alongside amount".into())
                })?;
                let amount = self.amount.ok_or_else(|| {
                    SequencerError::MalformedRequest("amount missing alongside receiver".into())
                })?;
                (vec![parse_address(&receiver)?], vec![parse_u128_decimal(&amount)?])
            }
            (false, true) => {
                if self.recipients.len() != self.amounts.len() {
                    return Err(SequencerError::MalformedVoucher {
                        recipients: self.recipients.len(),
                        amounts: self.amounts.len(),
                    });
                }
                let recipients = self
                    .recipients
                    .iter()
                    .map(|s| parse_address(s))
                    .collect::<Result<Vec<_>, _>>()?;
                let amounts = self
                    .amounts
                    .iter()
                    .map(|s| parse_u128_decimal(s))
                    .collect::<Result<Vec<_>, _>>()?;
                (recipients, amounts)
            }
        };

        Ok(Voucher {
            channel_id,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            recipients,
            amounts,
            user_signature,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientBalanceResponse {
    pub recipient_address: String,
    pub balance: String,
}

impl From<&RecipientBalance> for RecipientBalanceResponse {
    fn from(r: &RecipientBalance) -> Self {
        Self { recipient_address: encode_address(&r.recipient_address), balance: r.balance.to_string() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub channel_id: String,
    pub owner: String,
    pub balance: String,
    pub expiry_timestamp: u64,
    pub sequence_number: u64,
    pub user_signature: Option<String>,
    pub sequencer_signature: Option<String>,
    pub signature_timestamp: u64,
    pub recipients: Vec<RecipientBalanceResponse>,
    pub terminal: bool,
    pub settlement_tx_hash: Option<String>,
}

impl From<&sequencer_core::Channel> for ChannelResponse {
    fn from(c: &sequencer_core::Channel) -> Self {
        Self {
            channel_id: format!("0x{}", hex::encode(c.channel_id.as_slice())),
            owner: encode_address(&c.owner),
            balance: c.balance.to_string(),
            expiry_timestamp: c.expiry_timestamp,
            sequence_number: c.sequence_number,
            user_signature: c.user_signature.as_deref().map(encode_bytes),
            sequencer_signature: c.sequencer_signature.as_deref().map(encode_bytes),
            signature_timestamp: c.signature_timestamp,
            recipients: c.recipients.iter().map(RecipientBalanceResponse::from).collect(),
            terminal: c.terminal,
            settlement_tx_hash: c.settlement_tx_hash.map(|h| format!("0x{}", hex::encode(h.as_slice()))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelEnvelope {
    pub channel: ChannelResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub channel_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub channel: ChannelResponse,
    pub transaction_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIdsResponse {
    pub channel_ids: Vec<String>,
}

pub fn encode_channel_id(id: &B256) -> String {
    format!("0x{}", hex::encode(id.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_rejects_mixed_forms() {
        let request = VoucherRequest {
            channel_id: format!("0x{}", hex::encode([0u8; 32])),
            sequence_number: 1,
            timestamp: 0,
            user_signature: format!("0x{}", hex::encode([0u8; 65])),
            receiver: Some(format!("0x{}", hex::encode([0u8; 20]))),
            amount: Some("10".into()),
            recipients: vec![format!("0x{}", hex::encode([0u8; 20]))],
            amounts: vec!["10".into()],
            purpose: None,
        };
        assert!(matches!(request.canonicalize(), Err(SequencerError::MalformedRequest(_))));
    }

    #[test]
    fn canonicalize_expands_single_recipient_form() {
        let request = VoucherRequest {
            channel_id: format!("0x{}", hex::encode([0u8; 32])),
            sequence_number: 1,
            timestamp: 0,
            user_signature: format!("0x{}", hex::encode([1u8; 65])),
            receiver: Some(format!("0x{}", hex::encode([2u8; 20]))),
            amount: Some("10000".into()),
            recipients: Vec::new(),
            amounts: Vec::new(),
            purpose: Some("coffee".into()),
        };
        let voucher = request.canonicalize().unwrap();
        assert_eq!(voucher.recipients.len(), 1);
        assert_eq!(voucher.amounts, vec![10_000]);
    }

    #[test]
    fn canonicalize_rejects_neither_form() {
        let request = VoucherRequest {
            channel_id: format!("0x{}", hex::encode([0u8; 32])),
            sequence_number: 1,
            timestamp: 0,
            user_signature: format!("0x{}", hex::encode([1u8; 65])),
            receiver: None,
            amount: None,
            recipients: Vec::new(),
            amounts: Vec::new(),
            purpose: None,
        };
        assert!(matches!(request.canonicalize(), Err(SequencerError::MalformedRequest(_))));
    }
}
