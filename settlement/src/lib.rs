//! On-chain settlement against the `StreamChannel` contract.
//!
//! The chain client is built once at startup and shared as a cheap-to-clone
//! handle; it is never rebuilt per call. Every RPC call is wrapped in a
//! bounded timeout so a hung node degrades to `Timeout`, not an indefinite
//! hang on the caller's task.

use std::time::Duration;

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use sequencer_core::{Channel, SequencerError};
use tracing::{info, instrument};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IStreamChannel {
        function sequencer() external view returns (address);

        function finalCloseBySequencer(
            bytes32 channelId,
            uint256 sequenceNumber,
            uint256 timestamp,
            address[] recipients,
            uint256[] amounts,
            bytes userSignature
        ) external;

        function publishIntermediateChannelState(
            bytes32 channelId,
            uint256 sequenceNumber,
            uint256 timestamp,
            address[] recipients,
            uint256[] amounts,
            bytes userSignature,
            bytes sequencerSignature
        ) external;
    }
}

/// Gas, blob-gas, nonce and chain-id fillers composed around a wallet-backed
/// provider, mirroring the layering used elsewhere for this chain stack.
type InnerFiller = JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>;
type InnerProvider =
    FillProvider<JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>, RootProvider>;

pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct Settlement {
    provider: InnerProvider,
    contract_address: Address,
    rpc_timeout: Duration,
}

impl Settlement {
    /// Queries the RPC endpoint's chain id directly, for deployments that
    /// leave `CHAIN_ID` unset, defaulting to whatever the RPC endpoint reports.
    pub async fn resolve_chain_id(rpc_url: &str, rpc_timeout: Duration) -> Result<u64, SequencerError> {
        let url = rpc_url
            .parse()
            .map_err(|e| SequencerError::MalformedRequest(format!("invalid RPC_URL: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url);
        tokio::time::timeout(rpc_timeout, provider.get_chain_id())
            .await
            .map_err(|_| SequencerError::Timeout)?
            .map_err(|e| SequencerError::SettlementReverted(e.to_string()))
    }

    /// Builds the chain client and verifies the deployed contract agrees
    /// about who the sequencer is. Aborts boot (returns `Err`) on mismatch —
    /// this is the single most common deployment misconfiguration.
    #[instrument(skip(signing_key))]
    pub async fn connect(
        rpc_url: &str,
        contract_address: Address,
        signing_key: PrivateKeySigner,
        rpc_timeout: Duration,
    ) -> Result<Self, SequencerError> {
        let wallet_address = signing_key.address();
        let wallet = EthereumWallet::from(signing_key);

        let url = rpc_url
            .parse()
            .map_err(|e| SequencerError::MalformedRequest(format!("invalid RPC_URL: {e}")))?;
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        let settlement = Self { provider, contract_address, rpc_timeout };
        settlement.check_identity(wallet_address).await?;
        Ok(settlement)
    }

    async fn check_identity(&self, wallet_address: Address) -> Result<(), SequencerError> {
        let contract = IStreamChannel::new(self.contract_address, &self.provider);
        let onchain_sequencer = tokio::time::timeout(self.rpc_timeout, contract.sequencer().call())
            .await
            .map_err(|_| SequencerError::Timeout)?
            .map_err(|e| SequencerError::SettlementReverted(e.to_string()))?;

        if onchain_sequencer != wallet_address {
            return Err(SequencerError::SettlementReverted(format!(
                "configured signer {wallet_address} does not match on-chain sequencer {onchain_sequencer}"
            )));
        }
        info!(sequencer = %wallet_address, "settlement identity check passed");
        Ok(())
    }

    /// Marshals the channel's last admitted dually-signed state into
    /// `finalCloseBySequencer` calldata, signs, broadcasts, and awaits
    /// inclusion. Does not mutate `channel`; the caller marks it terminal
    /// and records the returned hash once this returns `Ok`.
    #[instrument(skip(self, channel), fields(channel_id = %channel.channel_id))]
    pub async fn finalise(&self, channel: &Channel) -> Result<B256, SequencerError> {
        let user_signature = channel
            .user_signature
            .clone()
            .ok_or_else(|| SequencerError::MalformedRequest("channel has no admitted state to finalise".into()))?;
        let (recipients, amounts) = channel.recipient_arrays();
        let amounts: Vec<U256> = amounts.into_iter().map(U256::from).collect();

        let contract = IStreamChannel::new(self.contract_address, &self.provider);
        let call = contract.finalCloseBySequencer(
            channel.channel_id,
            U256::from(channel.sequence_number),
            U256::from(channel.signature_timestamp),
            recipients,
            amounts,
            user_signature.into(),
        );

        let pending = tokio::time::timeout(self.rpc_timeout, call.send())
            .await
            .map_err(|_| SequencerError::Timeout)?
            .map_err(|e| SequencerError::SettlementReverted(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, "finalise transaction submitted");

        let receipt = tokio::time::timeout(self.rpc_timeout, pending.get_receipt())
            .await
            .map_err(|_| SequencerError::Timeout)?
            .map_err(|e| SequencerError::SettlementReverted(e.to_string()))?;

        if !receipt.status() {
            return Err(SequencerError::SettlementReverted(format!("transaction {tx_hash} reverted")));
        }
        Ok(tx_hash)
    }

    /// Anchors the latest dually-signed state on-chain without closing the
    /// channel. Requires both signatures to be on file.
    #[instrument(skip(self, channel), fields(channel_id = %channel.channel_id))]
    pub async fn publish_intermediate_state(&self, channel: &Channel) -> Result<B256, SequencerError> {
        let user_signature = channel
            .user_signature
            .clone()
            .ok_or_else(|| SequencerError::MalformedRequest("channel has no user signature on file".into()))?;
        let sequencer_signature = channel
            .sequencer_signature
            .clone()
            .ok_or_else(|| SequencerError::MalformedRequest("channel has no sequencer signature on file".into()))?;
        let (recipients, amounts) = channel.recipient_arrays();
        let amounts: Vec<U256> = amounts.into_iter().map(U256::from).collect();

        let contract = IStreamChannel::new(self.contract_address, &self.provider);
        let call = contract.publishIntermediateChannelState(
            channel.channel_id,
            U256::from(channel.sequence_number),
            U256::from(channel.signature_timestamp),
            recipients,
            amounts,
            user_signature.into(),
            sequencer_signature.into(),
        );

        let pending = tokio::time::timeout(self.rpc_timeout, call.send())
            .await
            .map_err(|_| SequencerError::Timeout)?
            .map_err(|e| SequencerError::SettlementReverted(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, "publish-intermediate-state transaction submitted");

        let receipt = tokio::time::timeout(self.rpc_timeout, pending.get_receipt())
            .await
            .map_err(|_| SequencerError::Timeout)?
            .map_err(|e| SequencerError::SettlementReverted(e.to_string()))?;
        if !receipt.status() {
            return Err(SequencerError::SettlementReverted(format!("transaction {tx_hash} reverted")));
        }
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_matches_configured_recommendation() {
        assert_eq!(DEFAULT_RPC_TIMEOUT_SECS, 60);
    }
}
