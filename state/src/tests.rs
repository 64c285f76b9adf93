use std::sync::Arc;

use alloy_primitives::Address;
use k256::ecdsa::SigningKey;
use sequencer_core::crypto::{sign_digest, Domain};
use sequencer_store::InMemoryStore;

use super::*;

fn crypto() -> Crypto {
    let sequencer_key = SigningKey::from_bytes(&[0x42u8; 32].into()).expect("valid scalar");
    let domain = Domain { chain_id: 8453, verifying_contract: Address::repeat_byte(0xEE) };
    Crypto::new(domain, sequencer_key)
}

fn state() -> (State, SigningKey, Address) {
    let owner_key = SigningKey::from_bytes(&[0x07u8; 32].into()).expect("valid scalar");
    let owner = sequencer_core::crypto::address_of(&owner_key);
    let store: Arc<dyn ChannelStore> = Arc::new(InMemoryStore::new());
    let state = State::new_for_test(store, crypto());
    (state, owner_key, owner)
}

fn sign_voucher(state: &State, owner_key: &SigningKey, voucher: &mut Voucher) {
    let digest = state.crypto.digest(&message_for(voucher));
    voucher.user_signature = sign_digest(owner_key, digest).unwrap();
}

#[tokio::test]
async fn seed_then_get_round_trips() {
    let (state, _owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x01);
    let seeded = state.seed(channel_id, owner, 1_000_000, 2_000_000_000).await.unwrap();
    assert_eq!(seeded.sequence_number, 0);

    let fetched = state.get(channel_id).await.unwrap();
    assert_eq!(fetched, seeded);
}

#[tokio::test]
async fn seed_twice_is_rejected() {
    let (state, _owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x02);
    state.seed(channel_id, owner, 1_000, 2_000_000_000).await.unwrap();
    let result = state.seed(channel_id, owner, 1_000, 2_000_000_000).await;
    assert!(matches!(result, Err(SequencerError::AlreadyExists(_))));
}

#[tokio::test]
async fn settle_admits_a_monotone_voucher_and_bumps_sequence() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x03);
    state.seed(channel_id, owner, 100_000, 2_000_000_000).await.unwrap();

    let mut voucher = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![Address::repeat_byte(0xB1)],
        amounts: vec![10_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut voucher);

    let settled = state.settle(voucher).await.unwrap();
    assert_eq!(settled.sequence_number, 1);
    assert_eq!(settled.cumulative_for(&Address::repeat_byte(0xB1)), 10_000);
    assert!(settled.sequencer_signature.is_some());
}

#[tokio::test]
async fn settle_rejects_stale_sequence_number() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x04);
    state.seed(channel_id, owner, 100_000, 2_000_000_000).await.unwrap();

    let mut first = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![Address::repeat_byte(0xB2)],
        amounts: vec![1_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut first);
    state.settle(first).await.unwrap();

    let mut replay = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![Address::repeat_byte(0xB2)],
        amounts: vec![2_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut replay);

    let result = state.settle(replay).await;
    assert!(matches!(result, Err(SequencerError::StaleSequence { .. })));
}

#[tokio::test]
async fn settle_rejects_amount_regression() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x05);
    state.seed(channel_id, owner, 100_000, 2_000_000_000).await.unwrap();
    let recipient = Address::repeat_byte(0xB3);

    let mut first = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![recipient],
        amounts: vec![10_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut first);
    state.settle(first).await.unwrap();

    let mut regressive = Voucher {
        channel_id,
        sequence_number: 2,
        timestamp: now_unix(),
        recipients: vec![recipient],
        amounts: vec![5_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut regressive);

    let result = state.settle(regressive).await;
    assert!(matches!(result, Err(SequencerError::AmountRegression { .. })));
}

#[tokio::test]
async fn settle_rejects_insolvent_voucher() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x06);
    state.seed(channel_id, owner, 1_000, 2_000_000_000).await.unwrap();

    let mut voucher = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![Address::repeat_byte(0xB4)],
        amounts: vec![5_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut voucher);

    let result = state.settle(voucher).await;
    assert!(matches!(result, Err(SequencerError::Insolvent { .. })));
}

#[tokio::test]
async fn settle_rejects_signature_from_a_non_owner() {
    let (state, _owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x07);
    state.seed(channel_id, owner, 100_000, 2_000_000_000).await.unwrap();

    let impostor_key = SigningKey::from_bytes(&[0x99u8; 32].into()).expect("valid scalar");
    let mut voucher = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![Address::repeat_byte(0xB5)],
        amounts: vec![1_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &impostor_key, &mut voucher);

    let result = state.settle(voucher).await;
    assert!(matches!(result, Err(SequencerError::BadSignature)));
}

#[tokio::test]
async fn settle_rejects_an_expired_channel() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x08);
    state.seed(channel_id, owner, 100_000, 1).await.unwrap();

    let mut voucher = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![Address::repeat_byte(0xB6)],
        amounts: vec![1_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut voucher);

    let result = state.settle(voucher).await;
    assert!(matches!(result, Err(SequencerError::Expired { .. })));
}

#[tokio::test]
async fn settle_rejects_a_stale_voucher_timestamp() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x0D);
    state.seed(channel_id, owner, 100_000, 2_000_000_000).await.unwrap();

    let mut voucher = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: 0,
        recipients: vec![Address::repeat_byte(0xB9)],
        amounts: vec![1_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut voucher);

    let result = state.settle(voucher).await;
    assert!(matches!(result, Err(SequencerError::BadTimestamp { .. })));
}

#[tokio::test]
async fn validate_does_not_mutate_channel_state() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x09);
    state.seed(channel_id, owner, 100_000, 2_000_000_000).await.unwrap();

    let mut voucher = Voucher {
        channel_id,
        sequence_number: 1,
        timestamp: now_unix(),
        recipients: vec![Address::repeat_byte(0xB7)],
        amounts: vec![1_000],
        user_signature: Vec::new(),
    };
    sign_voucher(&state, &owner_key, &mut voucher);

    state.validate(&voucher).await.unwrap();
    let channel = state.get(channel_id).await.unwrap();
    assert_eq!(channel.sequence_number, 0);
    assert!(channel.recipients.is_empty());
}

#[tokio::test]
async fn list_by_owner_finds_only_that_owners_channels() {
    let (state, _owner_key, owner) = state();
    let other_owner = Address::repeat_byte(0x77);
    let mine = ChannelId::repeat_byte(0x0A);
    let theirs = ChannelId::repeat_byte(0x0B);
    state.seed(mine, owner, 1_000, 2_000_000_000).await.unwrap();
    state.seed(theirs, other_owner, 1_000, 2_000_000_000).await.unwrap();

    let ids = state.list_by_owner(owner).await;
    assert_eq!(ids, vec![mine]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settles_on_the_same_channel_serialise_without_corrupting_balance() {
    let (state, owner_key, owner) = state();
    let channel_id = ChannelId::repeat_byte(0x0C);
    state.seed(channel_id, owner, 100_000, 2_000_000_000).await.unwrap();
    let state = Arc::new(state);
    let recipient = Address::repeat_byte(0xB8);

    let mut handles = Vec::new();
    for seq in 1..=10u64 {
        let state = Arc::clone(&state);
        let owner_key = owner_key.clone();
        handles.push(tokio::spawn(async move {
            let mut voucher = Voucher {
                channel_id,
                sequence_number: seq,
                timestamp: now_unix(),
                recipients: vec![recipient],
                amounts: vec![seq as u128 * 1_000],
                user_signature: Vec::new(),
            };
            let digest = state.crypto.digest(&message_for(&voucher));
            voucher.user_signature = sign_digest(&owner_key, digest).unwrap();
            state.settle(voucher).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 10);
    let channel = state.get(channel_id).await.unwrap();
    assert_eq!(channel.sequence_number, 10);
    assert_eq!(channel.cumulative_for(&recipient), 10_000);
}
