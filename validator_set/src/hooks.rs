use std::sync::Arc;

use anyhow::Result;
use strum::AsRefStr;
use types::primitives::{ConsensusAddress, OperatorAddress};

use crate::context::HookContext;

/// Notifications about changes to the validator set.
///
/// Called from within an isolated scope. An error discards everything the scope wrote and drops
/// the corresponding validator update.
pub trait ValidatorSetHooks: Send + Sync {
    fn after_validator_bonded(
        &self,
        _context: &HookContext,
        _consensus_address: ConsensusAddress,
        _operator: OperatorAddress,
    ) -> Result<()> {
        Ok(())
    }

    /// `operator` is `None` if the operator module no longer maps the address to an operator.
    fn after_validator_removed(
        &self,
        _context: &HookContext,
        _consensus_address: ConsensusAddress,
        _operator: Option<OperatorAddress>,
    ) -> Result<()> {
        Ok(())
    }

    fn after_validator_created(
        &self,
        _context: &HookContext,
        _consensus_address: ConsensusAddress,
        _operator: OperatorAddress,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum HookKind {
    AfterValidatorBonded,
    AfterValidatorRemoved,
    AfterValidatorCreated,
}

/// Subscribers called in registration order. The first error stops the fan-out.
#[derive(Clone, Default)]
pub struct MultiHooks {
    subscribers: Vec<Arc<dyn ValidatorSetHooks>>,
}

impl MultiHooks {
    #[must_use]
    pub const fn new(subscribers: Vec<Arc<dyn ValidatorSetHooks>>) -> Self {
        Self { subscribers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl ValidatorSetHooks for MultiHooks {
    fn after_validator_bonded(
        &self,
        context: &HookContext,
        consensus_address: ConsensusAddress,
        operator: OperatorAddress,
    ) -> Result<()> {
        for subscriber in &self.subscribers {
            subscriber.after_validator_bonded(context, consensus_address, operator)?;
        }

        Ok(())
    }

    fn after_validator_removed(
        &self,
        context: &HookContext,
        consensus_address: ConsensusAddress,
        operator: Option<OperatorAddress>,
    ) -> Result<()> {
        for subscriber in &self.subscribers {
            subscriber.after_validator_removed(context, consensus_address, operator)?;
        }

        Ok(())
    }

    fn after_validator_created(
        &self,
        context: &HookContext,
        consensus_address: ConsensusAddress,
        operator: OperatorAddress,
    ) -> Result<()> {
        for subscriber in &self.subscribers {
            subscriber.after_validator_created(context, consensus_address, operator)?;
        }

        Ok(())
    }
}
