use anyhow::{ensure, Result};
use log::info;
use types::{
    containers::{Validator, ValidatorUpdate},
    genesis::{
        EpochToConsensusAddresses, EpochToOperators, EpochToUndelegations, GenesisState,
        GenesisValidator,
    },
};

use crate::{context::BlockContext, error::Error, keeper::Keeper, storage::Store};

/// Initializes the module from `genesis` and returns the initial validator updates.
///
/// Every genesis validator must be accepted by the subscribed hooks.
pub fn init_genesis(
    keeper: &Keeper,
    context: &BlockContext,
    genesis: &GenesisState,
) -> Result<Vec<ValidatorUpdate>> {
    genesis.validate()?;

    let identifier = &genesis.params.epoch_identifier;

    ensure!(
        keeper
            .collaborators()?
            .epochs
            .epoch_info(identifier)
            .is_some(),
        Error::UnknownEpochIdentifier {
            identifier: identifier.clone(),
        },
    );

    let store = keeper.store();

    store.set_params(&genesis.params)?;

    for EpochToOperators { epoch, operators } in &genesis.opt_outs_to_finish {
        store.set_opt_outs_to_finish(*epoch, operators)?;

        for operator in operators {
            store.set_operator_opt_out_finish_epoch(*operator, *epoch)?;
        }
    }

    for EpochToConsensusAddresses {
        epoch,
        consensus_addresses,
    } in &genesis.consensus_addresses_to_prune
    {
        store.set_consensus_addresses_to_prune(*epoch, consensus_addresses)?;

        for consensus_address in consensus_addresses {
            store.set_consensus_address_prune_epoch(*consensus_address, *epoch)?;
        }
    }

    for EpochToUndelegations { epoch, record_keys } in &genesis.undelegations_to_mature {
        store.set_undelegations_to_mature(*epoch, record_keys)?;

        for record_key in record_keys {
            store.set_undelegation_maturity_epoch(record_key, *epoch)?;
        }
    }

    let updates = genesis
        .validators
        .iter()
        .map(|validator| ValidatorUpdate {
            public_key: validator.public_key,
            power: validator.power,
        })
        .collect();

    let applied = keeper.apply_validator_changes(context, updates)?;

    for validator in &genesis.validators {
        ensure!(
            applied
                .iter()
                .any(|update| update.public_key == validator.public_key),
            Error::GenesisValidatorRejected {
                public_key: validator.public_key,
            },
        );
    }

    info!(
        "validator set initialized with {} validators and total power {}",
        applied.len(),
        genesis.last_total_power,
    );

    Ok(applied)
}

pub fn export_genesis(store: Store) -> Result<GenesisState> {
    let mut validators = store.validators()?;

    validators.sort_by(Validator::cmp_by_power);

    let validators = validators
        .into_iter()
        .map(|validator| GenesisValidator {
            public_key: validator.public_key,
            power: validator.power,
        })
        .collect();

    let opt_outs_to_finish = store
        .all_opt_outs_to_finish()?
        .into_iter()
        .map(|(epoch, operators)| EpochToOperators { epoch, operators })
        .collect();

    let consensus_addresses_to_prune = store
        .all_consensus_addresses_to_prune()?
        .into_iter()
        .map(|(epoch, consensus_addresses)| EpochToConsensusAddresses {
            epoch,
            consensus_addresses,
        })
        .collect();

    let undelegations_to_mature = store
        .all_undelegations_to_mature()?
        .into_iter()
        .map(|(epoch, record_keys)| EpochToUndelegations { epoch, record_keys })
        .collect();

    Ok(GenesisState {
        params: store.params()?,
        validators,
        opt_outs_to_finish,
        consensus_addresses_to_prune,
        undelegations_to_mature,
        last_total_power: store.last_total_power()?,
    })
}
