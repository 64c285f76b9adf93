//! EIP-712-style typed-data hashing and signature recover/sign for
//! `ChannelData`, compatible with the on-chain `StreamChannel` contract.
//!
//! Any deviation in `DOMAIN_NAME` or `DOMAIN_VERSION` is a total-failure bug:
//! signatures will verify off-chain but be rejected on-chain (or vice versa).

use alloy_primitives::{keccak256, Address, B256, U256};
use k256::ecdsa::{signature::hazmat::PrehashSigner, RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::error::SequencerError;
use crate::types::ChannelId;

/// Domain name fixed by the on-chain contract. Do not change.
pub const DOMAIN_NAME: &str = "StreamChannel";
/// Domain version fixed by the on-chain contract. Do not change.
pub const DOMAIN_VERSION: &str = "1";

const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const CHANNEL_DATA_TYPE: &str =
    "ChannelData(bytes32 channelId,uint256 sequenceNumber,uint256 timestamp,address[] recipients,uint256[] amounts)";

/// The EIP-712 domain this sequencer signs against: fixed name/version plus
/// the chain and contract it is deployed alongside.
#[derive(Debug, Clone, Copy)]
pub struct Domain {
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Domain {
    pub fn separator(&self) -> B256 {
        let type_hash = keccak256(EIP712_DOMAIN_TYPE.as_bytes());
        let name_hash = keccak256(DOMAIN_NAME.as_bytes());
        let version_hash = keccak256(DOMAIN_VERSION.as_bytes());

        let mut buf = Vec::with_capacity(32 * 5);
        buf.extend_from_slice(type_hash.as_slice());
        buf.extend_from_slice(name_hash.as_slice());
        buf.extend_from_slice(version_hash.as_slice());
        buf.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        buf.extend_from_slice(&pad_address(&self.verifying_contract));
        keccak256(&buf)
    }
}

fn pad_address(addr: &Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(addr.as_slice());
    out
}

/// Tightly packed (no length prefix) concatenation of addresses, matching
/// the contract's `abi.encodePacked(address[])`.
fn pack_recipients(recipients: &[Address]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(recipients.len() * 20);
    for r in recipients {
        buf.extend_from_slice(r.as_slice());
    }
    buf
}

/// Tightly packed concatenation of uint256s, matching
/// `abi.encodePacked(uint256[])`. An empty slice hashes to `keccak("")`,
/// the seed-voucher case.
fn pack_amounts(amounts: &[u128]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(amounts.len() * 32);
    for a in amounts {
        buf.extend_from_slice(&U256::from(*a).to_be_bytes::<32>());
    }
    buf
}

pub fn struct_hash(
    channel_id: ChannelId,
    sequence_number: u64,
    timestamp: u64,
    recipients: &[Address],
    amounts: &[u128],
) -> B256 {
    let type_hash = keccak256(CHANNEL_DATA_TYPE.as_bytes());
    let recipients_hash = keccak256(pack_recipients(recipients));
    let amounts_hash = keccak256(pack_amounts(amounts));

    let mut buf = Vec::with_capacity(32 * 6);
    buf.extend_from_slice(type_hash.as_slice());
    buf.extend_from_slice(channel_id.as_slice());
    buf.extend_from_slice(&U256::from(sequence_number).to_be_bytes::<32>());
    buf.extend_from_slice(&U256::from(timestamp).to_be_bytes::<32>());
    buf.extend_from_slice(recipients_hash.as_slice());
    buf.extend_from_slice(amounts_hash.as_slice());
    keccak256(&buf)
}

/// Final digest = `keccak("\x19\x01" || domainSeparator || structHash)`,
/// the object that is actually signed and recovered.
pub fn typed_data_digest(
    domain: &Domain,
    channel_id: ChannelId,
    sequence_number: u64,
    timestamp: u64,
    recipients: &[Address],
    amounts: &[u128],
) -> B256 {
    let domain_separator = domain.separator();
    let struct_hash = struct_hash(channel_id, sequence_number, timestamp, recipients, amounts);

    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.push(0x19);
    buf.push(0x01);
    buf.extend_from_slice(domain_separator.as_slice());
    buf.extend_from_slice(struct_hash.as_slice());
    keccak256(&buf)
}

/// Recover the Ethereum address that produced a 65-byte `r || s || v`
/// signature over `digest`. `v` is accepted in both the legacy (27/28) and
/// raw (0/1) recovery-id conventions.
pub fn recover_signer(digest: B256, signature: &[u8]) -> Result<Address, SequencerError> {
    if signature.len() != 65 {
        return Err(SequencerError::BadSignature);
    }
    let (rs, v_slice) = signature.split_at(64);
    let v = v_slice[0];

    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::try_from(recovery_byte).map_err(|_| SequencerError::BadSignature)?;
    let sig = Signature::from_slice(rs).map_err(|_| SequencerError::BadSignature)?;

    let verifying_key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|_| SequencerError::BadSignature)?;

    Ok(address_from_verifying_key(&verifying_key))
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Sign `digest` with the sequencer's key, producing a 65-byte `r || s || v`
/// signature using the Ethereum `v ∈ {27, 28}` convention. Deterministic
/// (RFC-6979 nonces) — identical `(digest, key)` always reproduces the same
/// signature, so test fixtures are stable.
pub fn sign_digest(signing_key: &SigningKey, digest: B256) -> Result<Vec<u8>, SequencerError> {
    let (signature, recovery_id): (Signature, RecoveryId) = signing_key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|_| SequencerError::StorageFailure("signing failed".to_string()))?;

    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&signature.r().to_bytes());
    out.extend_from_slice(&signature.s().to_bytes());
    out.push(recovery_id.to_byte() + 27);
    Ok(out)
}

/// Derive the Ethereum address corresponding to a signing key.
pub fn address_of(signing_key: &SigningKey) -> Address {
    address_from_verifying_key(signing_key.verifying_key())
}

/// The sequencer's view of a `ChannelData` message: everything needed to
/// compute the digest for one candidate state. Carries no channel-map state
/// of its own — `verify`/`cosign` are pure functions of their arguments.
pub struct ChannelMessage<'a> {
    pub channel_id: ChannelId,
    pub sequence_number: u64,
    pub timestamp: u64,
    pub recipients: &'a [Address],
    pub amounts: &'a [u128],
}

/// Holds the sequencer's signing key and the fixed EIP-712 domain it signs
/// against. The only component permitted to use the signing key for
/// voucher-related signing.
#[derive(Clone)]
pub struct Crypto {
    domain: Domain,
    signing_key: SigningKey,
}

impl Crypto {
    pub fn new(domain: Domain, signing_key: SigningKey) -> Self {
        Self { domain, signing_key }
    }

    /// The wallet address this sequencer signs co-signatures with.
    pub fn sequencer_address(&self) -> Address {
        address_of(&self.signing_key)
    }

    pub fn digest(&self, message: &ChannelMessage<'_>) -> B256 {
        typed_data_digest(
            &self.domain,
            message.channel_id,
            message.sequence_number,
            message.timestamp,
            message.recipients,
            message.amounts,
        )
    }

    /// Returns `Ok(owner)` iff the signature recovers to `expected_owner`.
    pub fn verify(
        &self,
        expected_owner: Address,
        message: &ChannelMessage<'_>,
        signature: &[u8],
    ) -> Result<Address, SequencerError> {
        let digest = self.digest(message);
        let recovered = recover_signer(digest, signature)?;
        if recovered != expected_owner {
            return Err(SequencerError::BadSignature);
        }
        Ok(recovered)
    }

    /// Co-sign the same digest the payer signed.
    pub fn cosign(&self, message: &ChannelMessage<'_>) -> Result<Vec<u8>, SequencerError> {
        let digest = self.digest(message);
        sign_digest(&self.signing_key, digest)
    }
}
