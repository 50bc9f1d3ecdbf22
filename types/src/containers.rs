use core::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::primitives::{
    ChainId, ConsensusAddress, ConsensusPubKey, Height, OperatorAddress, Power, UnixSeconds, H256,
};

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Validator {
    pub consensus_address: ConsensusAddress,
    #[serde(with = "serde_utils::string_or_native")]
    pub power: Power,
    pub public_key: ConsensusPubKey,
}

impl Validator {
    #[must_use]
    pub fn new(public_key: ConsensusPubKey, power: Power) -> Self {
        Self {
            consensus_address: public_key.to_consensus_address(),
            power,
            public_key,
        }
    }

    #[must_use]
    pub fn cmp_by_power(&self, other: &Self) -> Ordering {
        power_order(self.power, &self.public_key, other.power, &other.public_key)
    }
}

/// The order in which validators are reported: descending by power, ties broken by descending
/// public key bytes.
#[must_use]
pub fn power_order(
    first_power: Power,
    first_key: &ConsensusPubKey,
    second_power: Power,
    second_key: &ConsensusPubKey,
) -> Ordering {
    second_power
        .cmp(&first_power)
        .then_with(|| second_key.cmp(first_key))
}

/// An entry of the list handed to the consensus engine. A power of 0 removes the key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorUpdate {
    pub public_key: ConsensusPubKey,
    #[serde(with = "serde_utils::string_or_native")]
    pub power: Power,
}

impl ValidatorUpdate {
    #[must_use]
    pub fn cmp_by_power(&self, other: &Self) -> Ordering {
        power_order(self.power, &self.public_key, other.power, &other.public_key)
    }
}

#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, AsRefStr, Display, EnumString, Deserialize, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Remove,
}

impl OperationKind {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Add => Self::Remove,
            Self::Remove => Self::Add,
        }
    }
}

/// A consensus key change that takes effect at the next epoch boundary.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Operation {
    pub operator: OperatorAddress,
    pub public_key: ConsensusPubKey,
    pub kind: OperationKind,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderSummary {
    pub chain_id: ChainId,
    #[serde(with = "serde_utils::string_or_native")]
    pub height: Height,
    #[serde(with = "serde_utils::string_or_native")]
    pub time: UnixSeconds,
    pub app_hash: H256,
}

/// Snapshot used by light clients of this chain to verify headers at `header.height`.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoricalInfo {
    pub header: HeaderSummary,
    pub validators: Vec<Validator>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr, Display, Deserialize, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Infraction {
    Unspecified,
    DoubleSign,
    Downtime,
}

/// Fraction of the slashable stake to remove, as a fixed-point number with 18 decimal places.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SlashFactor(#[serde(with = "serde_utils::string_or_native")] u128);

impl SlashFactor {
    pub const DECIMALS: u32 = 18;
    pub const ONE: Self = Self(10_u128.pow(Self::DECIMALS));

    #[must_use]
    pub const fn from_atto(atto: u128) -> Option<Self> {
        if atto > Self::ONE.0 {
            None
        } else {
            Some(Self(atto))
        }
    }

    #[must_use]
    pub const fn atto(self) -> u128 {
        self.0
    }
}
