use std::sync::Arc;

use anyhow::{ensure, Result};
use database::Database;
use once_cell::sync::OnceCell;
use prometheus_metrics::{Metrics, METRICS};
use types::{
    containers::{
        HistoricalInfo, Infraction, OperationKind, SlashFactor, Validator, ValidatorUpdate,
    },
    genesis::GenesisState,
    params::Params,
    primitives::{
        AccountAddress, ConsensusAddress, ConsensusPubKey, Epoch, Height, OperatorAddress, Power,
        RecordKey, ValidatorSetId,
    },
};

use crate::{
    collaborators::Collaborators,
    context::BlockContext,
    error::Error,
    genesis, historical,
    hooks::MultiHooks,
    params::{self, MsgUpdateParams},
    queries::{self, PageRequest, ValidatorsPage},
    queue::{self, QueueResultType},
    scheduler, slashing,
    slashing::ValidatorStatus,
    storage::Store,
    validator_updates,
};

static NO_HOOKS: MultiHooks = MultiHooks::new(Vec::new());

/// Owner of the validator set records.
///
/// Construction happens in two phases. The keeper is created first so that other modules can
/// hold a reference to it, then [`Keeper::wire`] supplies the modules it reads from and
/// [`Keeper::set_hooks`] the modules it notifies. Operations that need collaborators fail with
/// [`Error::NotWired`] until then.
///
/// A keeper created without metrics reports to the global [`METRICS`] once those are installed.
pub struct Keeper {
    database: Arc<Database>,
    authority: AccountAddress,
    collaborators: OnceCell<Collaborators>,
    hooks: OnceCell<MultiHooks>,
    metrics: Option<Arc<Metrics>>,
}

impl Keeper {
    #[must_use]
    pub const fn new(
        database: Arc<Database>,
        authority: AccountAddress,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            database,
            authority,
            collaborators: OnceCell::new(),
            hooks: OnceCell::new(),
            metrics,
        }
    }

    pub fn wire(&self, collaborators: Collaborators) -> Result<()> {
        ensure!(
            self.collaborators.set(collaborators).is_ok(),
            Error::AlreadyWired,
        );

        Ok(())
    }

    pub fn set_hooks(&self, hooks: MultiHooks) -> Result<()> {
        ensure!(self.hooks.set(hooks).is_ok(), Error::HooksAlreadySet);
        Ok(())
    }

    #[must_use]
    pub const fn authority(&self) -> AccountAddress {
        self.authority
    }

    #[must_use]
    pub fn store(&self) -> Store<'_> {
        Store::new(&self.database)
    }

    pub(crate) fn database(&self) -> &Database {
        &self.database
    }

    pub(crate) fn collaborators(&self) -> Result<&Collaborators> {
        self.collaborators
            .get()
            .ok_or(Error::NotWired)
            .map_err(Into::into)
    }

    pub(crate) fn hooks(&self) -> &MultiHooks {
        self.hooks.get().unwrap_or(&NO_HOOKS)
    }

    pub(crate) fn metrics(&self) -> Option<&Metrics> {
        self.metrics
            .as_deref()
            .or_else(|| METRICS.get().map(Arc::as_ref))
    }

    // Queue

    pub fn queue_operation(
        &self,
        operator: OperatorAddress,
        public_key: ConsensusPubKey,
        kind: OperationKind,
    ) -> Result<QueueResultType> {
        queue::queue_operation(self, self.store(), operator, public_key, kind)
    }

    // Scheduling

    /// The epoch at the end of which an action started in the current epoch takes effect.
    pub fn unbonding_completion_epoch(&self) -> Result<Epoch> {
        scheduler::unbonding_completion_epoch(self)
    }

    pub fn set_unbonding_information(
        &self,
        operator: OperatorAddress,
        public_key: ConsensusPubKey,
        is_opting_out: bool,
    ) -> Result<()> {
        scheduler::set_unbonding_information(
            self,
            self.store(),
            operator,
            public_key,
            is_opting_out,
        )
    }

    pub fn clear_unbonding_information(
        &self,
        operator: OperatorAddress,
        public_key: ConsensusPubKey,
    ) -> Result<()> {
        scheduler::clear_unbonding_information(self.store(), operator, public_key)
    }

    // Block processing

    pub fn begin_block(&self, context: &BlockContext) -> Result<()> {
        historical::track_historical_info(self, context)
    }

    pub fn end_block(&self, context: &mut BlockContext) -> Result<Vec<ValidatorUpdate>> {
        validator_updates::end_block(self, context)
    }

    /// Applies `updates` to the stored validator set and notifies subscribers.
    ///
    /// Returns the updates that were applied, in the order the consensus engine expects.
    /// A new validator set ID takes effect at the next height even if nothing was applied.
    pub fn apply_validator_changes(
        &self,
        context: &BlockContext,
        updates: Vec<ValidatorUpdate>,
    ) -> Result<Vec<ValidatorUpdate>> {
        validator_updates::apply_validator_changes(self, context, updates)
    }

    // Messages

    pub fn update_params(&self, message: &MsgUpdateParams) -> Result<Params> {
        params::update_params(self, message)
    }

    // Genesis

    pub fn init_genesis(
        &self,
        context: &BlockContext,
        genesis: &GenesisState,
    ) -> Result<Vec<ValidatorUpdate>> {
        genesis::init_genesis(self, context, genesis)
    }

    pub fn export_genesis(&self) -> Result<GenesisState> {
        genesis::export_genesis(self.store())
    }

    // Queries

    pub fn params(&self) -> Result<Params> {
        self.store().params()
    }

    pub fn validator(&self, consensus_address: ConsensusAddress) -> Result<Option<Validator>> {
        self.store().validator(consensus_address)
    }

    pub fn validators(&self, page: &PageRequest) -> Result<ValidatorsPage> {
        queries::validators(self.store(), page)
    }

    pub fn opt_outs_to_finish(&self, epoch: Epoch) -> Result<Vec<OperatorAddress>> {
        self.store().opt_outs_to_finish(epoch)
    }

    pub fn operator_opt_out_finish_epoch(&self, operator: OperatorAddress) -> Result<Option<Epoch>> {
        self.store().operator_opt_out_finish_epoch(operator)
    }

    pub fn undelegations_to_mature(&self, epoch: Epoch) -> Result<Vec<RecordKey>> {
        self.store().undelegations_to_mature(epoch)
    }

    pub fn undelegation_maturity_epoch(&self, record_key: &RecordKey) -> Result<Option<Epoch>> {
        self.store().undelegation_maturity_epoch(record_key)
    }

    pub fn consensus_addresses_to_prune(&self, epoch: Epoch) -> Result<Vec<ConsensusAddress>> {
        self.store().consensus_addresses_to_prune(epoch)
    }

    pub fn consensus_address_prune_epoch(
        &self,
        consensus_address: ConsensusAddress,
    ) -> Result<Option<Epoch>> {
        self.store().consensus_address_prune_epoch(consensus_address)
    }

    pub fn last_validator_updates(&self) -> Result<Vec<ValidatorUpdate>> {
        self.store().last_validator_updates()
    }

    pub fn validator_set_id(&self, height: Height) -> Result<Option<ValidatorSetId>> {
        self.store().validator_set_id(height)
    }

    pub fn last_total_power(&self) -> Result<Power> {
        self.store().last_total_power()
    }

    pub fn historical_info(&self, height: Height) -> Result<Option<HistoricalInfo>> {
        self.store().historical_info(height)
    }

    // Slashing

    pub fn slash_with_infraction_reason(
        &self,
        context: &BlockContext,
        consensus_address: ConsensusAddress,
        infraction_height: Height,
        power: Power,
        slash_factor: SlashFactor,
        infraction: Infraction,
    ) -> Result<()> {
        slashing::slash_with_infraction_reason(
            self,
            context,
            consensus_address,
            infraction_height,
            power,
            slash_factor,
            infraction,
        )
    }

    pub fn jail(&self, context: &BlockContext, consensus_address: ConsensusAddress) -> Result<()> {
        slashing::jail(self, context, consensus_address)
    }

    pub fn unjail(&self, context: &BlockContext, consensus_address: ConsensusAddress) -> Result<()> {
        slashing::unjail(self, context, consensus_address)
    }

    pub fn is_validator_jailed(
        &self,
        context: &BlockContext,
        consensus_address: ConsensusAddress,
    ) -> Result<bool> {
        slashing::is_validator_jailed(self, context, consensus_address)
    }

    pub fn validator_by_consensus_address(
        &self,
        context: &BlockContext,
        consensus_address: ConsensusAddress,
    ) -> Result<Option<ValidatorStatus>> {
        slashing::validator_by_consensus_address(self, context, consensus_address)
    }
}
