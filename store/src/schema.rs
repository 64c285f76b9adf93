//! SQL text for the single `channels` table.

pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS channels (
    channel_id            BYTEA PRIMARY KEY,
    owner                 BYTEA NOT NULL,
    balance               TEXT NOT NULL,
    expiry_timestamp      BIGINT NOT NULL,
    sequence_number       BIGINT NOT NULL,
    user_signature        BYTEA,
    sequencer_signature   BYTEA,
    signature_timestamp   BIGINT NOT NULL,
    recipients            JSONB NOT NULL,
    terminal              BOOLEAN NOT NULL DEFAULT FALSE,
    settlement_tx_hash    BYTEA
);
CREATE INDEX IF NOT EXISTS channels_owner_idx ON channels (owner);
"#;

pub const SELECT_ALL: &str = r#"
SELECT channel_id, owner, balance, expiry_timestamp, sequence_number,
       user_signature, sequencer_signature, signature_timestamp,
       recipients, terminal, settlement_tx_hash
FROM channels
"#;

pub const UPSERT: &str = r#"
INSERT INTO channels (
    channel_id, owner, balance, expiry_timestamp, sequence_number,
    user_signature, sequencer_signature, signature_timestamp,
    recipients, terminal, settlement_tx_hash
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
ON CONFLICT (channel_id) DO UPDATE SET
    balance = EXCLUDED.balance,
    expiry_timestamp = EXCLUDED.expiry_timestamp,
    sequence_number = EXCLUDED.sequence_number,
    user_signature = EXCLUDED.user_signature,
    sequencer_signature = EXCLUDED.sequencer_signature,
    signature_timestamp = EXCLUDED.signature_timestamp,
    recipients = EXCLUDED.recipients,
    terminal = EXCLUDED.terminal,
    settlement_tx_hash = EXCLUDED.settlement_tx_hash
"#;

pub const SELECT_IDS_BY_OWNER: &str = "SELECT channel_id FROM channels WHERE owner = $1";
