use core::time::Duration;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, bail, Result};
use database::Database;
use parking_lot::Mutex;
use prometheus_metrics::Metrics;
use types::{
    containers::{HeaderSummary, Infraction, SlashFactor, ValidatorUpdate},
    genesis::GenesisState,
    params::Params,
    primitives::{
        AccountAddress, AssetId, ChainId, ConsensusAddress, ConsensusPubKey, Epoch, Height,
        OperatorAddress, Power, RecordKey, ADDRESS_SIZE, H256,
    },
};

use crate::{
    collaborators::{
        AssetsSource, Collaborators, DelegationHooks as _, DelegationSource, EpochInfo,
        EpochsHooks as _, EpochsSource, OperatorHooks as _, OperatorSource, RestakingSource,
    },
    context::BlockContext,
    keeper::Keeper,
};

pub const CHAIN_ID: &str = "exocoretestnet_233-1";

const GENESIS_TIME: u64 = 1_700_000_000;
const BLOCK_TIME: u64 = 5;
const EPOCH_DURATION: Duration = Duration::from_secs(86_400);

pub fn authority() -> AccountAddress {
    AccountAddress::repeat_byte(0xaa)
}

pub fn operator(byte: u8) -> OperatorAddress {
    OperatorAddress::repeat_byte(byte)
}

pub fn public_key(byte: u8) -> ConsensusPubKey {
    ConsensusPubKey::repeat_byte(byte)
}

pub fn block_context(height: Height) -> BlockContext {
    BlockContext::new(HeaderSummary {
        chain_id: ChainId::from(CHAIN_ID),
        height,
        time: GENESIS_TIME + height.unsigned_abs() * BLOCK_TIME,
        app_hash: H256::zero(),
    })
}

#[derive(Default)]
pub struct MockEpochs {
    epochs: Mutex<HashMap<String, Epoch>>,
}

impl MockEpochs {
    pub fn set(&self, identifier: &str, epoch: Epoch) {
        self.epochs.lock().insert(identifier.to_owned(), epoch);
    }

    pub fn current(&self, identifier: &str) -> Epoch {
        self.epochs.lock().get(identifier).copied().unwrap_or_default()
    }

    pub fn advance(&self) {
        for epoch in self.epochs.lock().values_mut() {
            *epoch += 1;
        }
    }
}

impl EpochsSource for MockEpochs {
    fn epoch_info(&self, identifier: &str) -> Option<EpochInfo> {
        self.epochs
            .lock()
            .get(identifier)
            .map(|current_epoch| EpochInfo {
                current_epoch: *current_epoch,
                duration: EPOCH_DURATION,
            })
    }
}

#[derive(Default)]
struct OperatorState {
    keys: BTreeMap<OperatorAddress, ConsensusPubKey>,
    mid_key_removal: HashSet<OperatorAddress>,
    addresses: HashMap<ConsensusAddress, OperatorAddress>,
    completed_opt_outs: Vec<OperatorAddress>,
    jailed: HashSet<ConsensusAddress>,
    slashes: Vec<(OperatorAddress, Height, Infraction)>,
}

#[derive(Default)]
pub struct MockOperators {
    state: Mutex<OperatorState>,
}

impl MockOperators {
    pub fn set_key(&self, operator: OperatorAddress, public_key: ConsensusPubKey) {
        let mut state = self.state.lock();
        state.keys.insert(operator, public_key);
        state
            .addresses
            .insert(public_key.to_consensus_address(), operator);
    }

    pub fn key(&self, operator: OperatorAddress) -> Option<ConsensusPubKey> {
        self.state.lock().keys.get(&operator).copied()
    }

    pub fn set_mid_key_removal(&self, operator: OperatorAddress) {
        self.state.lock().mid_key_removal.insert(operator);
    }

    pub fn has_address(&self, consensus_address: &ConsensusAddress) -> bool {
        self.state.lock().addresses.contains_key(consensus_address)
    }

    pub fn completed_opt_outs(&self) -> Vec<OperatorAddress> {
        self.state.lock().completed_opt_outs.clone()
    }

    pub fn slashes(&self) -> Vec<(OperatorAddress, Height, Infraction)> {
        self.state.lock().slashes.clone()
    }
}

impl OperatorSource for MockOperators {
    fn active_operators_for_chain(
        &self,
        _chain_id: &ChainId,
    ) -> Result<Vec<(OperatorAddress, ConsensusPubKey)>> {
        let state = self.state.lock();

        Ok(state
            .keys
            .iter()
            .filter(|(operator, _)| !state.mid_key_removal.contains(*operator))
            .map(|(operator, public_key)| (*operator, *public_key))
            .collect())
    }

    fn operator_address_for_consensus_address(
        &self,
        _chain_id: &ChainId,
        consensus_address: &ConsensusAddress,
    ) -> Option<OperatorAddress> {
        self.state.lock().addresses.get(consensus_address).copied()
    }

    fn delete_operator_address_for_consensus_address(
        &self,
        _chain_id: &ChainId,
        consensus_address: &ConsensusAddress,
    ) -> Result<()> {
        self.state.lock().addresses.remove(consensus_address);
        Ok(())
    }

    fn complete_operator_opt_out(
        &self,
        operator: &OperatorAddress,
        _chain_id: &ChainId,
    ) -> Result<()> {
        let mut state = self.state.lock();

        if !state.mid_key_removal.remove(operator) {
            bail!("operator {operator:?} is not opting out");
        }

        state.keys.remove(operator);
        state.completed_opt_outs.push(*operator);

        Ok(())
    }

    fn is_operator_mid_key_removal(&self, operator: &OperatorAddress, _chain_id: &ChainId) -> bool {
        self.state.lock().mid_key_removal.contains(operator)
    }

    fn operator_consensus_key_for_chain(
        &self,
        operator: &OperatorAddress,
        _chain_id: &ChainId,
    ) -> Option<ConsensusPubKey> {
        self.key(*operator)
    }

    fn is_operator_jailed_for_chain(
        &self,
        consensus_address: &ConsensusAddress,
        _chain_id: &ChainId,
    ) -> bool {
        self.state.lock().jailed.contains(consensus_address)
    }

    fn jail(&self, consensus_address: &ConsensusAddress, _chain_id: &ChainId) -> Result<()> {
        self.state.lock().jailed.insert(*consensus_address);
        Ok(())
    }

    fn unjail(&self, consensus_address: &ConsensusAddress, _chain_id: &ChainId) -> Result<()> {
        self.state.lock().jailed.remove(consensus_address);
        Ok(())
    }

    fn slash_with_infraction_reason(
        &self,
        operator: &OperatorAddress,
        _chain_id: &ChainId,
        infraction_height: Height,
        _power: Power,
        _slash_factor: SlashFactor,
        infraction: Infraction,
    ) -> Result<()> {
        self.state
            .lock()
            .slashes
            .push((*operator, infraction_height, infraction));

        Ok(())
    }
}

#[derive(Default)]
struct RestakingState {
    powers: HashMap<OperatorAddress, Power>,
    self_delegations: HashMap<OperatorAddress, Power>,
    failing: bool,
}

/// Self-delegation defaults to the operator's vote power unless set explicitly.
#[derive(Default)]
pub struct MockRestaking {
    state: Mutex<RestakingState>,
}

impl MockRestaking {
    pub fn set_power(&self, operator: OperatorAddress, power: Power) {
        self.state.lock().powers.insert(operator, power);
    }

    pub fn set_self_delegation(&self, operator: OperatorAddress, value: Power) {
        self.state.lock().self_delegations.insert(operator, value);
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl RestakingSource for MockRestaking {
    fn average_vote_power(
        &self,
        operators: &[OperatorAddress],
        _asset_ids: &[AssetId],
        _epoch_identifier: &str,
    ) -> Result<Vec<Power>> {
        let state = self.state.lock();

        if state.failing {
            bail!("price feed unavailable");
        }

        Ok(operators
            .iter()
            .map(|operator| state.powers.get(operator).copied().unwrap_or_default())
            .collect())
    }

    fn self_delegated_value(&self, operator: &OperatorAddress) -> Result<Power> {
        let state = self.state.lock();

        Ok(state
            .self_delegations
            .get(operator)
            .or_else(|| state.powers.get(operator))
            .copied()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockDelegations {
    holds: Mutex<HashMap<RecordKey, u64>>,
    failing: Mutex<bool>,
}

impl MockDelegations {
    pub fn holds(&self, record_key: &RecordKey) -> u64 {
        self.holds.lock().get(record_key).copied().unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl DelegationSource for MockDelegations {
    fn increment_undelegation_hold(&self, record_key: &RecordKey) -> Result<()> {
        if *self.failing.lock() {
            bail!("delegation ledger is locked");
        }

        *self.holds.lock().entry(record_key.clone()).or_default() += 1;
        Ok(())
    }

    fn decrement_undelegation_hold(&self, record_key: &RecordKey) -> Result<()> {
        let mut holds = self.holds.lock();

        match holds.get_mut(record_key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(())
            }
            _ => bail!("undelegation {record_key} is not held"),
        }
    }
}

#[derive(Default)]
pub struct MockAssets {
    staking: Mutex<HashSet<AssetId>>,
}

impl MockAssets {
    pub fn add(&self, asset_id: AssetId) {
        self.staking.lock().insert(asset_id);
    }
}

impl AssetsSource for MockAssets {
    fn is_staking_asset(&self, asset_id: &AssetId) -> bool {
        self.staking.lock().contains(asset_id)
    }
}

/// A wired keeper driven block by block.
///
/// Genesis is applied at height 0. Blocks are produced from height 1 and the epoch of the
/// module's epoch identifier starts at 1.
pub struct Harness {
    pub keeper: Keeper,
    pub epochs: Arc<MockEpochs>,
    pub operators: Arc<MockOperators>,
    pub restaking: Arc<MockRestaking>,
    pub delegations: Arc<MockDelegations>,
    pub assets: Arc<MockAssets>,
    height: Height,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_genesis(GenesisState::default())
    }

    pub fn with_params(params: Params) -> Result<Self> {
        Self::with_genesis(GenesisState {
            params,
            ..GenesisState::default()
        })
    }

    /// Genesis validators are registered with operators whose addresses are the first bytes of
    /// their keys.
    pub fn with_genesis(genesis: GenesisState) -> Result<Self> {
        Self::build(genesis, None)
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Result<Self> {
        Self::build(GenesisState::default(), Some(metrics))
    }

    fn build(genesis: GenesisState, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let harness = Self {
            keeper: Keeper::new(Arc::new(Database::in_memory()), authority(), metrics),
            epochs: Arc::default(),
            operators: Arc::default(),
            restaking: Arc::default(),
            delegations: Arc::default(),
            assets: Arc::default(),
            height: 1,
        };

        harness.epochs.set(&Params::default().epoch_identifier, 1);

        for asset_id in &genesis.params.asset_ids {
            harness.assets.add(asset_id.clone());
        }

        for validator in &genesis.validators {
            let operator = OperatorAddress::from_slice(&validator.public_key.as_bytes()[..ADDRESS_SIZE]);
            harness.operators.set_key(operator, validator.public_key);
            harness.restaking.set_power(operator, validator.power);
        }

        harness.keeper.wire(harness.collaborators())?;
        harness.keeper.init_genesis(&block_context(0), &genesis)?;

        Ok(harness)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            epochs: Arc::<MockEpochs>::clone(&self.epochs),
            operators: Arc::<MockOperators>::clone(&self.operators),
            restaking: Arc::<MockRestaking>::clone(&self.restaking),
            delegations: Arc::<MockDelegations>::clone(&self.delegations),
            assets: Arc::<MockAssets>::clone(&self.assets),
        }
    }

    /// Context of the next block to be produced.
    pub fn block_context(&self) -> BlockContext {
        block_context(self.height)
    }

    pub const fn height(&self) -> Height {
        self.height
    }

    pub fn params(&self) -> Params {
        self.keeper
            .params()
            .expect("params should be set at genesis")
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epochs.current(&self.params().epoch_identifier)
    }

    pub fn opt_in(&self, byte: u8, power: Power) -> Result<()> {
        let context = self.block_context();

        self.operators.set_key(operator(byte), public_key(byte));
        self.restaking.set_power(operator(byte), power);

        self.keeper.after_operator_key_set(
            &context,
            &operator(byte),
            context.chain_id(),
            public_key(byte),
        )
    }

    pub fn opt_out(&self, byte: u8) -> Result<()> {
        let context = self.block_context();
        let public_key = self.current_key(byte)?;

        self.keeper.after_operator_key_removal_initiated(
            &context,
            &operator(byte),
            context.chain_id(),
            public_key,
        )?;

        self.operators.set_mid_key_removal(operator(byte));

        Ok(())
    }

    pub fn replace_key(&self, byte: u8, new_key: ConsensusPubKey) -> Result<()> {
        let context = self.block_context();
        let old_key = self.current_key(byte)?;

        self.operators.set_key(operator(byte), new_key);

        self.keeper.after_operator_key_replaced(
            &context,
            &operator(byte),
            old_key,
            new_key,
            context.chain_id(),
        )
    }

    pub fn undelegate(&self, byte: u8, record_key: &RecordKey) -> Result<()> {
        let context = self.block_context();

        self.keeper
            .after_undelegation_started(&context, &operator(byte), record_key)
    }

    /// Produces a block that does not end an epoch.
    pub fn produce_block(&mut self) -> Result<Vec<ValidatorUpdate>> {
        let mut context = self.block_context();

        self.keeper.begin_block(&context)?;

        let updates = self.keeper.end_block(&mut context)?;

        self.height += 1;

        Ok(updates)
    }

    /// Produces a block in which the current epoch ends and the next one starts.
    pub fn end_epoch(&mut self) -> Result<Vec<ValidatorUpdate>> {
        let mut context = self.block_context();
        let identifier = self.params().epoch_identifier;
        let epoch = self.epochs.current(&identifier);

        self.keeper.begin_block(&context)?;
        self.keeper.after_epoch_end(&mut context, &identifier, epoch)?;
        self.epochs.advance();
        self.keeper
            .before_epoch_start(&mut context, &identifier, epoch + 1)?;

        let updates = self.keeper.end_block(&mut context)?;

        self.height += 1;

        Ok(updates)
    }

    fn current_key(&self, byte: u8) -> Result<ConsensusPubKey> {
        self.operators
            .key(operator(byte))
            .ok_or_else(|| anyhow!("operator {byte} has no consensus key"))
    }
}
