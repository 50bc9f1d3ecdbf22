//! Derivation of the consensus validator set from restaked operators.
//!
//! Consensus key changes are queued during an epoch and take effect at its end. At every epoch
//! boundary the vote power of every active operator is recomputed and the difference from the
//! previous set is handed to the consensus engine. Opt-outs, consensus address pruning and
//! undelegations are released a fixed number of epochs after they are requested.

pub use crate::{
    collaborators::{
        AssetsSource, Collaborators, DelegationHooks, DelegationSource, EpochInfo, EpochsHooks,
        EpochsSource, OperatorHooks, OperatorSource, RestakingSource,
    },
    context::{BlockContext, HookContext},
    error::Error,
    hooks::{HookKind, MultiHooks, ValidatorSetHooks},
    keeper::Keeper,
    params::MsgUpdateParams,
    queries::{PageRequest, ValidatorsPage, DEFAULT_PAGE_LIMIT},
    queue::QueueResultType,
    slashing::ValidatorStatus,
    storage::Store,
    validator_updates::{compare_updates, diff},
};

mod collaborators;
mod context;
mod error;
mod genesis;
mod historical;
mod hooks;
mod keeper;
mod params;
mod queries;
mod queue;
mod scheduler;
mod slashing;
mod storage;
mod subscriptions;
mod validator_updates;

#[cfg(test)]
mod test_utils;
