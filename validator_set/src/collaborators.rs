//! Interfaces of the modules the validator set is derived from.
//!
//! The traits named `*Source` are implemented by other modules and called by this one.
//! The traits named `*Hooks` are implemented by [`Keeper`](crate::Keeper) and called by the
//! modules that own the corresponding events.

use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use types::{
    containers::{Infraction, SlashFactor},
    primitives::{
        AssetId, ChainId, ConsensusAddress, ConsensusPubKey, Epoch, Height, OperatorAddress,
        Power, RecordKey,
    },
};

use crate::context::BlockContext;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EpochInfo {
    pub current_epoch: Epoch,
    pub duration: Duration,
}

pub trait EpochsSource: Send + Sync {
    fn epoch_info(&self, identifier: &str) -> Option<EpochInfo>;
}

pub trait OperatorSource: Send + Sync {
    /// Operators whose consensus key for `chain_id` is active.
    /// Operators in the middle of removing their key must not be included.
    fn active_operators_for_chain(
        &self,
        chain_id: &ChainId,
    ) -> Result<Vec<(OperatorAddress, ConsensusPubKey)>>;

    fn operator_address_for_consensus_address(
        &self,
        chain_id: &ChainId,
        consensus_address: &ConsensusAddress,
    ) -> Option<OperatorAddress>;

    fn delete_operator_address_for_consensus_address(
        &self,
        chain_id: &ChainId,
        consensus_address: &ConsensusAddress,
    ) -> Result<()>;

    fn complete_operator_opt_out(&self, operator: &OperatorAddress, chain_id: &ChainId)
        -> Result<()>;

    fn is_operator_mid_key_removal(&self, operator: &OperatorAddress, chain_id: &ChainId) -> bool;

    fn operator_consensus_key_for_chain(
        &self,
        operator: &OperatorAddress,
        chain_id: &ChainId,
    ) -> Option<ConsensusPubKey>;

    fn is_operator_jailed_for_chain(
        &self,
        consensus_address: &ConsensusAddress,
        chain_id: &ChainId,
    ) -> bool;

    fn jail(&self, consensus_address: &ConsensusAddress, chain_id: &ChainId) -> Result<()>;

    fn unjail(&self, consensus_address: &ConsensusAddress, chain_id: &ChainId) -> Result<()>;

    fn slash_with_infraction_reason(
        &self,
        operator: &OperatorAddress,
        chain_id: &ChainId,
        infraction_height: Height,
        power: Power,
        slash_factor: SlashFactor,
        infraction: Infraction,
    ) -> Result<()>;
}

pub trait RestakingSource: Send + Sync {
    /// Vote power of each operator averaged over the current epoch of `epoch_identifier`,
    /// counting only deposits of `asset_ids`. The result is in the same order as `operators`.
    fn average_vote_power(
        &self,
        operators: &[OperatorAddress],
        asset_ids: &[AssetId],
        epoch_identifier: &str,
    ) -> Result<Vec<Power>>;

    fn self_delegated_value(&self, operator: &OperatorAddress) -> Result<Power>;
}

pub trait DelegationSource: Send + Sync {
    fn increment_undelegation_hold(&self, record_key: &RecordKey) -> Result<()>;

    fn decrement_undelegation_hold(&self, record_key: &RecordKey) -> Result<()>;
}

pub trait AssetsSource: Send + Sync {
    fn is_staking_asset(&self, asset_id: &AssetId) -> bool;
}

#[derive(Clone)]
pub struct Collaborators {
    pub epochs: Arc<dyn EpochsSource>,
    pub operators: Arc<dyn OperatorSource>,
    pub restaking: Arc<dyn RestakingSource>,
    pub delegations: Arc<dyn DelegationSource>,
    pub assets: Arc<dyn AssetsSource>,
}

pub trait EpochsHooks {
    fn before_epoch_start(
        &self,
        context: &mut BlockContext,
        identifier: &str,
        epoch: Epoch,
    ) -> Result<()>;

    fn after_epoch_end(
        &self,
        context: &mut BlockContext,
        identifier: &str,
        epoch: Epoch,
    ) -> Result<()>;
}

pub trait OperatorHooks {
    fn after_operator_key_set(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        chain_id: &ChainId,
        public_key: ConsensusPubKey,
    ) -> Result<()>;

    fn after_operator_key_replaced(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        old_key: ConsensusPubKey,
        new_key: ConsensusPubKey,
        chain_id: &ChainId,
    ) -> Result<()>;

    fn after_operator_key_removal_initiated(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        chain_id: &ChainId,
        public_key: ConsensusPubKey,
    ) -> Result<()>;
}

pub trait DelegationHooks {
    fn after_delegation(&self, context: &BlockContext, operator: &OperatorAddress) -> Result<()>;

    fn after_undelegation_started(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        record_key: &RecordKey,
    ) -> Result<()>;
}
