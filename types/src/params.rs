use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::{AssetId, Power};

pub const DEFAULT_EPOCHS_UNTIL_UNBONDED: u32 = 7;
pub const DEFAULT_EPOCH_IDENTIFIER: &str = "day";
pub const DEFAULT_MAX_VALIDATORS: u32 = 100;
pub const DEFAULT_HISTORICAL_ENTRIES: u32 = 10_000;
pub const DEFAULT_MIN_SELF_DELEGATION: Power = 100;
pub const DEFAULT_ASSET_ADDRESS: [u8; 20] = [
    0xda, 0xc1, 0x7f, 0x95, 0x8d, 0x2e, 0xe5, 0x23, 0xa2, 0x20, 0x62, 0x06, 0x99, 0x45, 0x97, 0xc1,
    0x3d, 0x83, 0x1e, 0xc7,
];
pub const DEFAULT_ASSET_LAYER_ZERO_ID: u64 = 0x65;

/// Parameters of the validator set module.
///
/// Stored in the module's store and changed only through an authority-gated update.
/// Missing fields in genesis files take their default values.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Number of whole epochs an opt-out, key replacement or undelegation stays at risk.
    #[serde(with = "serde_utils::string_or_native")]
    pub epochs_until_unbonded: u32,
    /// Identifier of the epoch (in the epochs module) at whose end the validator set changes.
    pub epoch_identifier: String,
    #[serde(with = "serde_utils::string_or_native")]
    pub max_validators: u32,
    /// Number of historical snapshots retained for light clients. 0 disables tracking.
    #[serde(with = "serde_utils::string_or_native")]
    pub historical_entries: u32,
    /// Assets whose delegated value counts towards vote power.
    pub asset_ids: Vec<AssetId>,
    /// Minimum self-delegated value an operator needs to be considered for the validator set.
    #[serde(with = "serde_utils::string_or_native")]
    pub min_self_delegation: Power,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            epochs_until_unbonded: DEFAULT_EPOCHS_UNTIL_UNBONDED,
            epoch_identifier: DEFAULT_EPOCH_IDENTIFIER.to_owned(),
            max_validators: DEFAULT_MAX_VALIDATORS,
            historical_entries: DEFAULT_HISTORICAL_ENTRIES,
            asset_ids: vec![AssetId::from_parts(
                &DEFAULT_ASSET_ADDRESS,
                DEFAULT_ASSET_LAYER_ZERO_ID,
            )],
            min_self_delegation: DEFAULT_MIN_SELF_DELEGATION,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ParamsError> {
        validate_epochs_until_unbonded(self.epochs_until_unbonded)?;
        validate_epoch_identifier(&self.epoch_identifier)?;
        validate_max_validators(self.max_validators)?;
        validate_asset_ids(&self.asset_ids)?;
        validate_min_self_delegation(self.min_self_delegation)?;
        Ok(())
    }
}

pub const fn validate_epochs_until_unbonded(epochs: u32) -> Result<(), ParamsError> {
    if epochs == 0 {
        return Err(ParamsError::ZeroEpochsUntilUnbonded);
    }

    Ok(())
}

pub fn validate_epoch_identifier(identifier: &str) -> Result<(), ParamsError> {
    if identifier.trim().is_empty() {
        return Err(ParamsError::EmptyEpochIdentifier);
    }

    Ok(())
}

pub const fn validate_max_validators(max_validators: u32) -> Result<(), ParamsError> {
    if max_validators == 0 {
        return Err(ParamsError::ZeroMaxValidators);
    }

    Ok(())
}

pub fn validate_asset_ids(asset_ids: &[AssetId]) -> Result<(), ParamsError> {
    if asset_ids.is_empty() {
        return Err(ParamsError::NoAssetIds);
    }

    let mut seen = HashSet::with_capacity(asset_ids.len());

    for asset_id in asset_ids {
        if !seen.insert(asset_id) {
            return Err(ParamsError::DuplicateAssetId {
                asset_id: asset_id.clone(),
            });
        }
    }

    Ok(())
}

pub const fn validate_min_self_delegation(min_self_delegation: Power) -> Result<(), ParamsError> {
    if min_self_delegation < 0 {
        return Err(ParamsError::NegativeMinSelfDelegation {
            min_self_delegation,
        });
    }

    Ok(())
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum ParamsError {
    #[error("epochs until unbonded must be positive")]
    ZeroEpochsUntilUnbonded,
    #[error("epoch identifier must not be empty")]
    EmptyEpochIdentifier,
    #[error("max validators must be positive")]
    ZeroMaxValidators,
    #[error("at least one asset id is required")]
    NoAssetIds,
    #[error("duplicate asset id: {asset_id}")]
    DuplicateAssetId { asset_id: AssetId },
    #[error("min self delegation must not be negative (got {min_self_delegation})")]
    NegativeMinSelfDelegation { min_self_delegation: Power },
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert_eq!(Params::default().validate(), Ok(()));
    }

    #[test]
    fn default_asset_is_usdt_on_mainnet() {
        assert_eq!(
            Params::default().asset_ids[0].as_str(),
            "0xdac17f958d2ee523a2206206994597c13d831ec7_0x65",
        );
    }

    #[test_case(
        Params { epochs_until_unbonded: 0, ..Params::default() }
        => Err(ParamsError::ZeroEpochsUntilUnbonded);
        "zero epochs until unbonded"
    )]
    #[test_case(
        Params { epoch_identifier: " ".to_owned(), ..Params::default() }
        => Err(ParamsError::EmptyEpochIdentifier);
        "blank epoch identifier"
    )]
    #[test_case(
        Params { max_validators: 0, ..Params::default() }
        => Err(ParamsError::ZeroMaxValidators);
        "zero max validators"
    )]
    #[test_case(
        Params { asset_ids: vec![], ..Params::default() }
        => Err(ParamsError::NoAssetIds);
        "no asset ids"
    )]
    #[test_case(
        Params { min_self_delegation: -1, ..Params::default() }
        => Err(ParamsError::NegativeMinSelfDelegation { min_self_delegation: -1 });
        "negative min self delegation"
    )]
    #[test_case(
        Params { historical_entries: 0, ..Params::default() }
        => Ok(());
        "historical tracking disabled"
    )]
    fn validation(params: Params) -> Result<(), ParamsError> {
        params.validate()
    }

    #[test]
    fn duplicate_asset_ids_are_rejected() {
        let asset_id = AssetId::from_parts(&[1; 20], 1);

        let params = Params {
            asset_ids: vec![asset_id.clone(), asset_id.clone()],
            ..Params::default()
        };

        assert_eq!(
            params.validate(),
            Err(ParamsError::DuplicateAssetId { asset_id }),
        );
    }

    #[test]
    fn missing_fields_take_default_values() -> serde_json::Result<()> {
        let params = serde_json::from_value::<Params>(json!({
            "epoch_identifier": "hour",
            "max_validators": "3",
        }))?;

        assert_eq!(
            params,
            Params {
                epoch_identifier: "hour".to_owned(),
                max_validators: 3,
                ..Params::default()
            },
        );

        Ok(())
    }
}
