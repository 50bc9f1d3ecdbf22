use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    params::{Params, ParamsError},
    primitives::{ConsensusAddress, ConsensusPubKey, Epoch, OperatorAddress, Power, RecordKey},
};

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisValidator {
    pub public_key: ConsensusPubKey,
    #[serde(with = "serde_utils::string_or_native")]
    pub power: Power,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EpochToOperators {
    #[serde(with = "serde_utils::string_or_native")]
    pub epoch: Epoch,
    pub operators: Vec<OperatorAddress>,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EpochToConsensusAddresses {
    #[serde(with = "serde_utils::string_or_native")]
    pub epoch: Epoch,
    pub consensus_addresses: Vec<ConsensusAddress>,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EpochToUndelegations {
    #[serde(with = "serde_utils::string_or_native")]
    pub epoch: Epoch,
    pub record_keys: Vec<RecordKey>,
}

/// State of the validator set module at genesis or at export.
///
/// The reverse indexes (operator to opt-out epoch, record key to maturity epoch) are not part of
/// the genesis state. They are rebuilt from the schedules.
#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenesisState {
    pub params: Params,
    pub validators: Vec<GenesisValidator>,
    pub opt_outs_to_finish: Vec<EpochToOperators>,
    pub consensus_addresses_to_prune: Vec<EpochToConsensusAddresses>,
    pub undelegations_to_mature: Vec<EpochToUndelegations>,
    #[serde(with = "serde_utils::string_or_native")]
    pub last_total_power: Power,
}

impl GenesisState {
    pub fn validate(&self) -> Result<(), GenesisError> {
        self.params.validate()?;

        let max_validators = usize::try_from(self.params.max_validators)
            .map_err(|_| GenesisError::TooManyValidators)?;

        if self.validators.len() > max_validators {
            return Err(GenesisError::TooManyValidators);
        }

        let mut keys = HashSet::new();
        let mut total_power: Power = 0;

        for validator in &self.validators {
            if !keys.insert(validator.public_key) {
                return Err(GenesisError::DuplicateValidator {
                    public_key: validator.public_key,
                });
            }

            if validator.power < 1 {
                return Err(GenesisError::NonPositivePower {
                    public_key: validator.public_key,
                    power: validator.power,
                });
            }

            total_power = total_power
                .checked_add(validator.power)
                .ok_or(GenesisError::TotalPowerOverflow)?;
        }

        if total_power != self.last_total_power {
            return Err(GenesisError::TotalPowerMismatch {
                computed: total_power,
                in_genesis: self.last_total_power,
            });
        }

        validate_schedule(
            self.opt_outs_to_finish
                .iter()
                .map(|entry| (entry.epoch, &entry.operators)),
            |operator| GenesisError::DuplicateOptOut {
                operator: *operator,
            },
        )?;

        validate_schedule(
            self.consensus_addresses_to_prune
                .iter()
                .map(|entry| (entry.epoch, &entry.consensus_addresses)),
            |consensus_address| GenesisError::DuplicatePrune {
                consensus_address: *consensus_address,
            },
        )?;

        validate_schedule(
            self.undelegations_to_mature
                .iter()
                .map(|entry| (entry.epoch, &entry.record_keys)),
            |record_key| GenesisError::DuplicateUndelegation {
                record_key: record_key.clone(),
            },
        )?;

        Ok(())
    }
}

// Each item may be scheduled at most once across all epochs and each epoch may appear only once.
fn validate_schedule<'items, T: Eq + core::hash::Hash + 'items>(
    entries: impl IntoIterator<Item = (Epoch, &'items Vec<T>)>,
    duplicate_error: impl Fn(&T) -> GenesisError,
) -> Result<(), GenesisError> {
    let mut epochs = HashSet::new();
    let mut items = HashSet::new();

    for (epoch, entry_items) in entries {
        if epoch <= 0 {
            return Err(GenesisError::NonPositiveEpoch { epoch });
        }

        if !epochs.insert(epoch) {
            return Err(GenesisError::DuplicateEpoch { epoch });
        }

        if entry_items.is_empty() {
            return Err(GenesisError::EmptyScheduleEntry { epoch });
        }

        for item in entry_items {
            if !items.insert(item) {
                return Err(duplicate_error(item));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum GenesisError {
    #[error("invalid params: {0}")]
    Params(#[from] ParamsError),
    #[error("more genesis validators than max validators")]
    TooManyValidators,
    #[error("duplicate genesis validator {public_key:?}")]
    DuplicateValidator { public_key: ConsensusPubKey },
    #[error("genesis validator {public_key:?} has non-positive power {power}")]
    NonPositivePower {
        public_key: ConsensusPubKey,
        power: Power,
    },
    #[error("total power of genesis validators overflowed")]
    TotalPowerOverflow,
    #[error("last total power does not match validators (computed: {computed}, in_genesis: {in_genesis})")]
    TotalPowerMismatch { computed: Power, in_genesis: Power },
    #[error("scheduled epoch must be positive (got {epoch})")]
    NonPositiveEpoch { epoch: Epoch },
    #[error("epoch {epoch} appears more than once in a schedule")]
    DuplicateEpoch { epoch: Epoch },
    #[error("schedule entry for epoch {epoch} is empty")]
    EmptyScheduleEntry { epoch: Epoch },
    #[error("operator {operator:?} has more than one scheduled opt-out")]
    DuplicateOptOut { operator: OperatorAddress },
    #[error("consensus address {consensus_address:?} is scheduled for pruning more than once")]
    DuplicatePrune { consensus_address: ConsensusAddress },
    #[error("undelegation {record_key} is scheduled to mature more than once")]
    DuplicateUndelegation { record_key: RecordKey },
}
