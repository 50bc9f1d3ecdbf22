use thiserror::Error;
use types::primitives::{AccountAddress, ConsensusAddress, ConsensusPubKey, Height};

#[derive(Debug, Error)]
pub enum Error {
    #[error("collaborators have already been wired")]
    AlreadyWired,
    #[error("collaborators have not been wired")]
    NotWired,
    #[error("hooks have already been set")]
    HooksAlreadySet,
    #[error("params have not been initialized")]
    ParamsNotSet,
    #[error("epoch identifier {identifier:?} is not known to the epochs module")]
    UnknownEpochIdentifier { identifier: String },
    #[error("invalid authority (expected: {expected:?}, actual: {actual:?})")]
    Unauthorized {
        expected: AccountAddress,
        actual: AccountAddress,
    },
    #[error("restaking module returned {actual} vote powers for {expected} operators")]
    VotePowerCountMismatch { expected: usize, actual: usize },
    #[error("no operator found for consensus address {consensus_address:?}")]
    OperatorNotFound { consensus_address: ConsensusAddress },
    #[error("genesis validator {public_key:?} could not be bonded")]
    GenesisValidatorRejected { public_key: ConsensusPubKey },
    #[error(
        "infraction at height {infraction_height} is in the future \
         (current height: {current_height})"
    )]
    FutureInfraction {
        infraction_height: Height,
        current_height: Height,
    },
    #[error("key does not have the expected prefix {prefix:?}: {bytes:?}")]
    IncorrectPrefix { prefix: &'static str, bytes: Vec<u8> },
    #[error("unbonding completion epoch overflowed")]
    EpochOverflow,
    #[error("total vote power overflowed")]
    TotalPowerOverflow,
}
