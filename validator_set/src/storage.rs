use anyhow::Result;
use database::{Database, PrefixableKey};
use derive_more::Display;
use serde::{de::DeserializeOwned, Serialize};
use types::{
    containers::{HistoricalInfo, Operation, Validator, ValidatorUpdate},
    params::Params,
    primitives::{
        ConsensusAddress, Epoch, Height, OperatorAddress, Power, RecordKey, ValidatorSetId,
    },
};

use crate::error::Error;

const PARAMS_KEY: &str = "params";
const OPERATION_QUEUE_KEY: &str = "queue";
const PENDING_OPERATIONS_KEY: &str = "pending_operations";
const PENDING_OPT_OUTS_KEY: &str = "pending_opt_outs";
const PENDING_UNDELEGATIONS_KEY: &str = "pending_undelegations";
const PENDING_CONSENSUS_ADDRESSES_KEY: &str = "pending_consensus_addresses";
const LAST_VALIDATOR_UPDATES_KEY: &str = "last_validator_updates";
const LAST_TOTAL_POWER_KEY: &str = "last_total_power";

/// Typed view of the records owned by this module.
///
/// `Store` borrows a [`Database`] so that the same accessors work on the module store and on
/// branches of it.
#[derive(Clone, Copy)]
pub struct Store<'database> {
    database: &'database Database,
}

impl<'database> Store<'database> {
    #[must_use]
    pub const fn new(database: &'database Database) -> Self {
        Self { database }
    }

    #[must_use]
    pub const fn database(self) -> &'database Database {
        self.database
    }

    pub fn params(self) -> Result<Params> {
        self.get(PARAMS_KEY)?
            .ok_or(Error::ParamsNotSet)
            .map_err(Into::into)
    }

    pub fn set_params(self, params: &Params) -> Result<()> {
        self.put(PARAMS_KEY, params)
    }

    pub fn validator(self, consensus_address: ConsensusAddress) -> Result<Option<Validator>> {
        self.get(ValidatorByConsensusAddress(consensus_address))
    }

    pub fn set_validator(self, validator: &Validator) -> Result<()> {
        self.put(
            ValidatorByConsensusAddress(validator.consensus_address),
            validator,
        )
    }

    pub fn delete_validator(self, consensus_address: ConsensusAddress) -> Result<()> {
        self.database
            .delete(ValidatorByConsensusAddress(consensus_address).to_string())
    }

    /// All validators ordered by consensus address.
    pub fn validators(self) -> Result<Vec<Validator>> {
        self.values_with_prefix::<ValidatorByConsensusAddress, _>()
    }

    /// Validators ordered by consensus address, starting at `start` (inclusive).
    pub fn validators_from(
        self,
        start: ConsensusAddress,
    ) -> Result<impl Iterator<Item = Result<Validator>> + 'database> {
        let iterator = self
            .database
            .iterator_ascending(ValidatorByConsensusAddress(start).to_string()..)?
            .take_while(|result| {
                result
                    .as_ref()
                    .map_or(true, |(key, _)| ValidatorByConsensusAddress::has_prefix(key))
            })
            .map(|result| {
                let (_, bytes) = result?;
                Ok(bincode::deserialize(&bytes)?)
            });

        Ok(iterator)
    }

    pub fn operation_queue(self) -> Result<Vec<Operation>> {
        self.list(OPERATION_QUEUE_KEY)
    }

    pub fn set_operation_queue(self, operations: &[Operation]) -> Result<()> {
        self.set_list(OPERATION_QUEUE_KEY, operations)
    }

    pub fn pending_operations(self) -> Result<Vec<Operation>> {
        self.list(PENDING_OPERATIONS_KEY)
    }

    pub fn set_pending_operations(self, operations: &[Operation]) -> Result<()> {
        self.set_list(PENDING_OPERATIONS_KEY, operations)
    }

    pub fn pending_opt_outs(self) -> Result<Vec<OperatorAddress>> {
        self.list(PENDING_OPT_OUTS_KEY)
    }

    pub fn set_pending_opt_outs(self, operators: &[OperatorAddress]) -> Result<()> {
        self.set_list(PENDING_OPT_OUTS_KEY, operators)
    }

    pub fn pending_undelegations(self) -> Result<Vec<RecordKey>> {
        self.list(PENDING_UNDELEGATIONS_KEY)
    }

    pub fn set_pending_undelegations(self, record_keys: &[RecordKey]) -> Result<()> {
        self.set_list(PENDING_UNDELEGATIONS_KEY, record_keys)
    }

    pub fn pending_consensus_addresses(self) -> Result<Vec<ConsensusAddress>> {
        self.list(PENDING_CONSENSUS_ADDRESSES_KEY)
    }

    pub fn set_pending_consensus_addresses(
        self,
        consensus_addresses: &[ConsensusAddress],
    ) -> Result<()> {
        self.set_list(PENDING_CONSENSUS_ADDRESSES_KEY, consensus_addresses)
    }

    pub fn opt_outs_to_finish(self, epoch: Epoch) -> Result<Vec<OperatorAddress>> {
        self.list(OptOutsToFinish(epoch))
    }

    pub fn set_opt_outs_to_finish(self, epoch: Epoch, operators: &[OperatorAddress]) -> Result<()> {
        self.set_list(OptOutsToFinish(epoch), operators)
    }

    pub fn all_opt_outs_to_finish(self) -> Result<Vec<(Epoch, Vec<OperatorAddress>)>> {
        self.epoch_entries::<OptOutsToFinish, _>()
    }

    pub fn consensus_addresses_to_prune(self, epoch: Epoch) -> Result<Vec<ConsensusAddress>> {
        self.list(ConsensusAddressesToPrune(epoch))
    }

    pub fn set_consensus_addresses_to_prune(
        self,
        epoch: Epoch,
        consensus_addresses: &[ConsensusAddress],
    ) -> Result<()> {
        self.set_list(ConsensusAddressesToPrune(epoch), consensus_addresses)
    }

    pub fn all_consensus_addresses_to_prune(self) -> Result<Vec<(Epoch, Vec<ConsensusAddress>)>> {
        self.epoch_entries::<ConsensusAddressesToPrune, _>()
    }

    pub fn undelegations_to_mature(self, epoch: Epoch) -> Result<Vec<RecordKey>> {
        self.list(UndelegationsToMature(epoch))
    }

    pub fn set_undelegations_to_mature(self, epoch: Epoch, record_keys: &[RecordKey]) -> Result<()> {
        self.set_list(UndelegationsToMature(epoch), record_keys)
    }

    pub fn all_undelegations_to_mature(self) -> Result<Vec<(Epoch, Vec<RecordKey>)>> {
        self.epoch_entries::<UndelegationsToMature, _>()
    }

    pub fn operator_opt_out_finish_epoch(self, operator: OperatorAddress) -> Result<Option<Epoch>> {
        self.get(OptOutFinishEpochByOperator(operator))
    }

    pub fn set_operator_opt_out_finish_epoch(
        self,
        operator: OperatorAddress,
        epoch: Epoch,
    ) -> Result<()> {
        self.put(OptOutFinishEpochByOperator(operator), &epoch)
    }

    pub fn delete_operator_opt_out_finish_epoch(self, operator: OperatorAddress) -> Result<()> {
        self.database
            .delete(OptOutFinishEpochByOperator(operator).to_string())
    }

    pub fn undelegation_maturity_epoch(self, record_key: &RecordKey) -> Result<Option<Epoch>> {
        self.get(MaturityEpochByRecordKey(record_key))
    }

    pub fn set_undelegation_maturity_epoch(self, record_key: &RecordKey, epoch: Epoch) -> Result<()> {
        self.put(MaturityEpochByRecordKey(record_key), &epoch)
    }

    pub fn delete_undelegation_maturity_epoch(self, record_key: &RecordKey) -> Result<()> {
        self.database
            .delete(MaturityEpochByRecordKey(record_key).to_string())
    }

    pub fn consensus_address_prune_epoch(
        self,
        consensus_address: ConsensusAddress,
    ) -> Result<Option<Epoch>> {
        self.get(PruneEpochByConsensusAddress(consensus_address))
    }

    pub fn set_consensus_address_prune_epoch(
        self,
        consensus_address: ConsensusAddress,
        epoch: Epoch,
    ) -> Result<()> {
        self.put(PruneEpochByConsensusAddress(consensus_address), &epoch)
    }

    pub fn delete_consensus_address_prune_epoch(
        self,
        consensus_address: ConsensusAddress,
    ) -> Result<()> {
        self.database
            .delete(PruneEpochByConsensusAddress(consensus_address).to_string())
    }

    pub fn historical_info(self, height: Height) -> Result<Option<HistoricalInfo>> {
        self.get(HistoricalInfoByHeight(height))
    }

    pub fn set_historical_info(self, height: Height, historical_info: &HistoricalInfo) -> Result<()> {
        self.put(HistoricalInfoByHeight(height), historical_info)
    }

    /// Deletes historical info and validator set IDs at heights below `height`.
    pub fn prune_history_below(self, height: Height) -> Result<()> {
        self.database.delete_range(
            HistoricalInfoByHeight(0).to_string()..HistoricalInfoByHeight(height).to_string(),
        )?;

        self.database.delete_range(
            ValidatorSetIdByHeight(0).to_string()..ValidatorSetIdByHeight(height).to_string(),
        )
    }

    pub fn validator_set_id(self, height: Height) -> Result<Option<ValidatorSetId>> {
        self.get(ValidatorSetIdByHeight(height))
    }

    pub fn set_validator_set_id(self, height: Height, validator_set_id: ValidatorSetId) -> Result<()> {
        self.put(ValidatorSetIdByHeight(height), &validator_set_id)
    }

    pub fn last_validator_updates(self) -> Result<Vec<ValidatorUpdate>> {
        self.list(LAST_VALIDATOR_UPDATES_KEY)
    }

    pub fn set_last_validator_updates(self, updates: &[ValidatorUpdate]) -> Result<()> {
        self.put(LAST_VALIDATOR_UPDATES_KEY, updates)
    }

    pub fn last_total_power(self) -> Result<Power> {
        Ok(self.get(LAST_TOTAL_POWER_KEY)?.unwrap_or_default())
    }

    pub fn set_last_total_power(self, power: Power) -> Result<()> {
        self.put(LAST_TOTAL_POWER_KEY, &power)
    }

    fn get<T: DeserializeOwned>(self, key: impl core::fmt::Display) -> Result<Option<T>> {
        self.database
            .get(key.to_string())?
            .map(|bytes| bincode::deserialize(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    fn put<T: Serialize + ?Sized>(self, key: impl core::fmt::Display, value: &T) -> Result<()> {
        self.database
            .put(key.to_string(), bincode::serialize(value)?)
    }

    fn list<T: DeserializeOwned>(self, key: impl core::fmt::Display) -> Result<Vec<T>> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    // Empty lists are not stored so that cleared schedules leave nothing behind.
    fn set_list<T: Serialize>(self, key: impl core::fmt::Display, items: &[T]) -> Result<()> {
        if items.is_empty() {
            self.database.delete(key.to_string())
        } else {
            self.put(key, items)
        }
    }

    fn values_with_prefix<K: PrefixableKey, T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.database
            .prefix_iterator(K::PREFIX)?
            .map(|result| {
                let (_, bytes) = result?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    fn epoch_entries<K: PrefixableKey, T: DeserializeOwned>(self) -> Result<Vec<(Epoch, Vec<T>)>> {
        self.database
            .prefix_iterator(K::PREFIX)?
            .map(|result| {
                let (key, bytes) = result?;
                let epoch = parse_epoch::<K>(&key)?;
                Ok((epoch, bincode::deserialize(&bytes)?))
            })
            .collect()
    }
}

fn parse_epoch<K: PrefixableKey>(bytes: &[u8]) -> Result<Epoch> {
    let payload = bytes
        .strip_prefix(K::PREFIX.as_bytes())
        .ok_or_else(|| Error::IncorrectPrefix {
            prefix: K::PREFIX,
            bytes: bytes.to_vec(),
        })?;

    let string = core::str::from_utf8(payload)?;
    let epoch = string.parse()?;

    Ok(epoch)
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
struct ValidatorByConsensusAddress(ConsensusAddress);

impl PrefixableKey for ValidatorByConsensusAddress {
    const PREFIX: &'static str = "validator/";
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct OptOutsToFinish(Epoch);

impl PrefixableKey for OptOutsToFinish {
    const PREFIX: &'static str = "opt_outs_to_finish/";
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct ConsensusAddressesToPrune(Epoch);

impl PrefixableKey for ConsensusAddressesToPrune {
    const PREFIX: &'static str = "consensus_addresses_to_prune/";
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct UndelegationsToMature(Epoch);

impl PrefixableKey for UndelegationsToMature {
    const PREFIX: &'static str = "undelegations_to_mature/";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
struct OptOutFinishEpochByOperator(OperatorAddress);

impl PrefixableKey for OptOutFinishEpochByOperator {
    const PREFIX: &'static str = "opt_out_finish_epoch/";
}

#[derive(Display)]
#[display("{}{_0}", Self::PREFIX)]
struct MaturityEpochByRecordKey<'key>(&'key RecordKey);

impl PrefixableKey for MaturityEpochByRecordKey<'_> {
    const PREFIX: &'static str = "undelegation_maturity_epoch/";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
struct PruneEpochByConsensusAddress(ConsensusAddress);

impl PrefixableKey for PruneEpochByConsensusAddress {
    const PREFIX: &'static str = "prune_epoch/";
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct HistoricalInfoByHeight(Height);

impl PrefixableKey for HistoricalInfoByHeight {
    const PREFIX: &'static str = "historical_info/";
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct ValidatorSetIdByHeight(Height);

impl PrefixableKey for ValidatorSetIdByHeight {
    const PREFIX: &'static str = "validator_set_id/";
}
