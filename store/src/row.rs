//! Row <-> domain-type conversion. Kept separate from `lib.rs` so the SQL
//! binding order in `schema::UPSERT` has one obvious place to stay in sync
//! with `ChannelRow`'s field order.

use alloy_primitives::{Address, B256};
use sequencer_core::{Channel, ChannelId, RecipientBalance, SequencerError};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ChannelRow {
    pub channel_id: Vec<u8>,
    pub owner: Vec<u8>,
    pub balance: String,
    pub expiry_timestamp: i64,
    pub sequence_number: i64,
    pub user_signature: Option<Vec<u8>>,
    pub sequencer_signature: Option<Vec<u8>>,
    pub signature_timestamp: i64,
    pub recipients: serde_json::Value,
    pub terminal: bool,
    pub settlement_tx_hash: Option<Vec<u8>>,
}

/// JSON-serialised shape of one recipient entry inside the `recipients` column.
#[derive(Debug, Serialize, Deserialize)]
struct RecipientJson {
    recipient_address: String,
    balance: String,
}

pub fn bytes_to_channel_id(bytes: &[u8]) -> Result<ChannelId, SequencerError> {
    if bytes.len() != 32 {
        return Err(SequencerError::StorageFailure(format!(
            "corrupt channel_id column: expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(ChannelId::from_slice(bytes))
}

fn bytes_to_address(bytes: &[u8]) -> Result<Address, SequencerError> {
    if bytes.len() != 20 {
        return Err(SequencerError::StorageFailure(format!(
            "corrupt address column: expected 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

impl ChannelRow {
    pub fn from_channel(channel: &Channel) -> Self {
        let recipients = channel
            .recipients
            .iter()
            .map(|r| RecipientJson {
                recipient_address: format!("{:?}", r.recipient_address),
                balance: r.balance.to_string(),
            })
            .collect::<Vec<_>>();

        Self {
            channel_id: channel.channel_id.as_slice().to_vec(),
            owner: channel.owner.as_slice().to_vec(),
            balance: channel.balance.to_string(),
            expiry_timestamp: channel.expiry_timestamp as i64,
            sequence_number: channel.sequence_number as i64,
            user_signature: channel.user_signature.clone(),
            sequencer_signature: channel.sequencer_signature.clone(),
            signature_timestamp: channel.signature_timestamp as i64,
            recipients: serde_json::to_value(recipients).expect("recipients always serialise"),
            terminal: channel.terminal,
            settlement_tx_hash: channel.settlement_tx_hash.map(|h| h.as_slice().to_vec()),
        }
    }

    pub fn into_channel(self) -> Result<Channel, SequencerError> {
        let recipients_json: Vec<RecipientJson> = serde_json::from_value(self.recipients)
            .map_err(|e| SequencerError::StorageFailure(format!("corrupt recipients column: {e}")))?;

        let mut recipients = Vec::with_capacity(recipients_json.len());
        for entry in recipients_json {
            let recipient_address: Address = entry
                .recipient_address
                .parse()
                .map_err(|e| SequencerError::StorageFailure(format!("corrupt recipient address: {e}")))?;
            let balance: u128 = entry
                .balance
                .parse()
                .map_err(|e| SequencerError::StorageFailure(format!("corrupt recipient balance: {e}")))?;
            recipients.push(RecipientBalance { recipient_address, balance });
        }

        let settlement_tx_hash = match self.settlement_tx_hash {
            Some(bytes) if bytes.len() == 32 => Some(B256::from_slice(&bytes)),
            Some(bytes) => {
                return Err(SequencerError::StorageFailure(format!(
                    "corrupt settlement_tx_hash column: expected 32 bytes, got {}",
                    bytes.len()
                )))
            }
            None => None,
        };

        Ok(Channel {
            channel_id: bytes_to_channel_id(&self.channel_id)?,
            owner: bytes_to_address(&self.owner)?,
            balance: self
                .balance
                .parse()
                .map_err(|e| SequencerError::StorageFailure(format!("corrupt balance column: {e}")))?,
            expiry_timestamp: self.expiry_timestamp as u64,
            sequence_number: self.sequence_number as u64,
            recipients,
            user_signature: self.user_signature,
            sequencer_signature: self.sequencer_signature,
            signature_timestamp: self.signature_timestamp as u64,
            terminal: self.terminal,
            settlement_tx_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_channel_with_recipients() {
        let channel = Channel {
            channel_id: ChannelId::repeat_byte(0x01),
            owner: Address::repeat_byte(0xAA),
            balance: 1_000_000,
            expiry_timestamp: 1_700_003_600,
            sequence_number: 2,
            recipients: vec![RecipientBalance {
                recipient_address: Address::repeat_byte(0xBB),
                balance: 25_000,
            }],
            user_signature: Some(vec![1u8; 65]),
            sequencer_signature: Some(vec![2u8; 65]),
            signature_timestamp: 1_700_000_100,
            terminal: false,
            settlement_tx_hash: None,
        };

        let row = ChannelRow::from_channel(&channel);
        let round_tripped = row.into_channel().unwrap();
        assert_eq!(round_tripped, channel);
    }

    #[test]
    fn round_trips_a_seed_channel_with_no_recipients() {
        let channel = Channel::fresh(ChannelId::repeat_byte(0x02), Address::repeat_byte(0xCC), 500, 2_000_000_000);
        let row = ChannelRow::from_channel(&channel);
        let round_tripped = row.into_channel().unwrap();
        assert_eq!(round_tripped, channel);
    }
}
