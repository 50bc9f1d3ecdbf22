use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use types::{
    params::{self as validation, Params},
    primitives::AccountAddress,
};

use crate::{collaborators::Collaborators, error::Error, keeper::Keeper};

/// Replaces the module parameters. Only accepted from the module authority.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MsgUpdateParams {
    pub authority: AccountAddress,
    pub params: Params,
}

/// Stores the parameters in `message` and returns what was stored.
///
/// Fields that are invalid keep their previous value. The asset id list is kept as a whole if any
/// of its entries is not a staking asset.
pub fn update_params(keeper: &Keeper, message: &MsgUpdateParams) -> Result<Params> {
    if message.authority != keeper.authority() {
        return Err(Error::Unauthorized {
            expected: keeper.authority(),
            actual: message.authority,
        }
        .into());
    }

    let store = keeper.store();
    let previous = store.params()?;
    let params = normalize(keeper.collaborators()?, &previous, message.params.clone());

    store.set_params(&params)?;

    info!("validator set params updated: {params:?}");

    Ok(params)
}

fn normalize(collaborators: &Collaborators, previous: &Params, mut params: Params) -> Params {
    if let Err(error) = validation::validate_epochs_until_unbonded(params.epochs_until_unbonded) {
        info!("keeping epochs until unbonded of {}: {error}", previous.epochs_until_unbonded);
        params.epochs_until_unbonded = previous.epochs_until_unbonded;
    }

    let identifier_is_known = validation::validate_epoch_identifier(&params.epoch_identifier)
        .is_ok()
        && collaborators
            .epochs
            .epoch_info(&params.epoch_identifier)
            .is_some();

    if !identifier_is_known {
        info!(
            "keeping epoch identifier {:?} instead of unknown {:?}",
            previous.epoch_identifier, params.epoch_identifier,
        );
        params.epoch_identifier.clone_from(&previous.epoch_identifier);
    }

    if let Err(error) = validation::validate_max_validators(params.max_validators) {
        info!("keeping max validators of {}: {error}", previous.max_validators);
        params.max_validators = previous.max_validators;
    }

    if params.historical_entries == 0 {
        info!("keeping historical entries of {}", previous.historical_entries);
        params.historical_entries = previous.historical_entries;
    }

    let asset_ids_are_staked = validation::validate_asset_ids(&params.asset_ids).is_ok()
        && params
            .asset_ids
            .iter()
            .all(|asset_id| collaborators.assets.is_staking_asset(asset_id));

    if !asset_ids_are_staked {
        info!(
            "keeping asset ids {:?} instead of {:?}",
            previous.asset_ids, params.asset_ids,
        );
        params.asset_ids.clone_from(&previous.asset_ids);
    }

    if let Err(error) = validation::validate_min_self_delegation(params.min_self_delegation) {
        info!("keeping min self delegation of {}: {error}", previous.min_self_delegation);
        params.min_self_delegation = previous.min_self_delegation;
    }

    params
}
