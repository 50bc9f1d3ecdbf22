use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use derive_more::{AsRef, From};
use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

pub type Epoch = i64;
pub type Height = i64;
pub type Power = i64;
pub type UnixSeconds = u64;
pub type ValidatorSetId = u64;

pub const ADDRESS_SIZE: usize = 20;
pub const CONSENSUS_PUBLIC_KEY_SIZE: usize = 32;

construct_fixed_hash! {
    pub struct AccountAddress(ADDRESS_SIZE);
}

construct_fixed_hash! {
    pub struct OperatorAddress(ADDRESS_SIZE);
}

construct_fixed_hash! {
    pub struct ConsensusAddress(ADDRESS_SIZE);
}

// Ed25519 public key bytes as handed to the consensus engine.
construct_fixed_hash! {
    pub struct ConsensusPubKey(CONSENSUS_PUBLIC_KEY_SIZE);
}

construct_fixed_hash! {
    pub struct H256(32);
}

impl_fixed_hash_serde!(AccountAddress, ADDRESS_SIZE);
impl_fixed_hash_serde!(OperatorAddress, ADDRESS_SIZE);
impl_fixed_hash_serde!(ConsensusAddress, ADDRESS_SIZE);
impl_fixed_hash_serde!(ConsensusPubKey, CONSENSUS_PUBLIC_KEY_SIZE);
impl_fixed_hash_serde!(H256, 32);

impl ConsensusPubKey {
    /// Derives the address the consensus engine uses to refer to this key.
    ///
    /// This is the first 20 bytes of the SHA-256 digest of the key, matching how Tendermint-style
    /// engines address Ed25519 validators in evidence and commit signatures.
    #[must_use]
    pub fn to_consensus_address(&self) -> ConsensusAddress {
        let digest = Sha256::digest(self.as_bytes());
        ConsensusAddress::from_slice(&digest[..ADDRESS_SIZE])
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl From<&str> for ChainId {
    fn from(chain_id: &str) -> Self {
        Self(chain_id.to_owned())
    }
}

impl Display for ChainId {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str(&self.0)
    }
}

impl ChainId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifies an undelegation record in the delegation ledger.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, AsRef, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RecordKey(#[serde(with = "serde_utils::prefixed_hex_or_bytes_vec")] Vec<u8>);

impl From<&[u8]> for RecordKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Display for RecordKey {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str(&const_hex::encode_prefixed(&self.0))
    }
}

impl RecordKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Asset identifier in the form `<asset address>_<layer zero chain id>`, both parts hexadecimal
/// with a `0x` prefix. Identifiers are normalized to lowercase when parsed.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, DeserializeFromStr, SerializeDisplay)]
pub struct AssetId(String);

impl AssetId {
    #[must_use]
    pub fn from_parts(address: &[u8], layer_zero_id: u64) -> Self {
        Self(format!(
            "{}_{layer_zero_id:#x}",
            const_hex::encode_prefixed(address),
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AssetId {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str(&self.0)
    }
}

impl FromStr for AssetId {
    type Err = AssetIdError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let normalized = string.to_lowercase();

        let (address, layer_zero_id) =
            normalized
                .split_once('_')
                .ok_or_else(|| AssetIdError::MissingSeparator {
                    asset_id: string.to_owned(),
                })?;

        if !is_prefixed_hex(address) || !is_prefixed_hex(layer_zero_id) {
            return Err(AssetIdError::NotHexadecimal {
                asset_id: string.to_owned(),
            });
        }

        Ok(Self(normalized))
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum AssetIdError {
    #[error("asset id {asset_id} has no separator between address and chain id")]
    MissingSeparator { asset_id: String },
    #[error("asset id {asset_id} is not made of two 0x-prefixed hexadecimal parts")]
    NotHexadecimal { asset_id: String },
}

fn is_prefixed_hex(part: &str) -> bool {
    part.strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_hexdigit()))
}
