//! sequencer-core: shared types, typed-data hashing and the error taxonomy
//! for the StreamChannel off-chain sequencer.
//!
//! This crate is pure — no I/O, no ambient state. It provides:
//! - the `Channel` / `Voucher` data model
//! - EIP-712-compatible typed-data hashing and ECDSA recover/sign
//! - the crate-spanning `SequencerError` taxonomy

pub mod crypto;
pub mod error;
pub mod types;

pub use crypto::*;
pub use error::*;
pub use types::*;
