//! Evidence handling entry points.
//!
//! Validators are identified by consensus address in evidence. Penalties are applied to the
//! operator behind the address by the operator module.

use anyhow::{ensure, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use types::{
    containers::{Infraction, SlashFactor, Validator},
    primitives::{ConsensusAddress, Height, Power},
};

use crate::{context::BlockContext, error::Error, keeper::Keeper};

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ValidatorStatus {
    pub validator: Validator,
    pub jailed: bool,
}

pub fn slash_with_infraction_reason(
    keeper: &Keeper,
    context: &BlockContext,
    consensus_address: ConsensusAddress,
    infraction_height: Height,
    power: Power,
    slash_factor: SlashFactor,
    infraction: Infraction,
) -> Result<()> {
    ensure!(
        infraction_height <= context.height(),
        Error::FutureInfraction {
            infraction_height,
            current_height: context.height(),
        },
    );

    let operators = &keeper.collaborators()?.operators;
    let chain_id = context.chain_id();

    let Some(operator) =
        operators.operator_address_for_consensus_address(chain_id, &consensus_address)
    else {
        // The address may have been pruned already. Nothing is at stake for it anymore.
        warn!(
            "ignoring {} evidence for unknown consensus address {consensus_address:?}",
            infraction.as_ref(),
        );
        return Ok(());
    };

    operators.slash_with_infraction_reason(
        &operator,
        chain_id,
        infraction_height,
        power,
        slash_factor,
        infraction,
    )?;

    info!(
        "slashed operator {operator:?} for {} at height {infraction_height} \
         (power: {power}, factor: {})",
        infraction.as_ref(),
        slash_factor.atto(),
    );

    Ok(())
}

pub fn jail(keeper: &Keeper, context: &BlockContext, consensus_address: ConsensusAddress) -> Result<()> {
    keeper
        .collaborators()?
        .operators
        .jail(&consensus_address, context.chain_id())?;

    info!("jailed validator {consensus_address:?}");

    Ok(())
}

pub fn unjail(
    keeper: &Keeper,
    context: &BlockContext,
    consensus_address: ConsensusAddress,
) -> Result<()> {
    keeper
        .collaborators()?
        .operators
        .unjail(&consensus_address, context.chain_id())?;

    info!("unjailed validator {consensus_address:?}");

    Ok(())
}

pub fn is_validator_jailed(
    keeper: &Keeper,
    context: &BlockContext,
    consensus_address: ConsensusAddress,
) -> Result<bool> {
    Ok(keeper
        .collaborators()?
        .operators
        .is_operator_jailed_for_chain(&consensus_address, context.chain_id()))
}

pub fn validator_by_consensus_address(
    keeper: &Keeper,
    context: &BlockContext,
    consensus_address: ConsensusAddress,
) -> Result<Option<ValidatorStatus>> {
    let Some(validator) = keeper.store().validator(consensus_address)? else {
        return Ok(None);
    };

    let jailed = is_validator_jailed(keeper, context, consensus_address)?;

    Ok(Some(ValidatorStatus { validator, jailed }))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{operator, public_key, Harness};

    use super::*;

    #[test]
    fn evidence_is_forwarded_to_operator() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();

        harness.operators.set_key(operator(1), public_key(1));

        harness.keeper.slash_with_infraction_reason(
            &context,
            public_key(1).to_consensus_address(),
            context.height(),
            100,
            SlashFactor::ONE,
            Infraction::DoubleSign,
        )?;

        assert_eq!(
            harness.operators.slashes(),
            [(operator(1), context.height(), Infraction::DoubleSign)],
        );

        Ok(())
    }

    #[test]
    fn evidence_for_unknown_address_is_ignored() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();

        harness.keeper.slash_with_infraction_reason(
            &context,
            public_key(1).to_consensus_address(),
            context.height(),
            100,
            SlashFactor::ONE,
            Infraction::Downtime,
        )?;

        assert!(harness.operators.slashes().is_empty());

        Ok(())
    }

    #[test]
    fn evidence_from_the_future_is_rejected() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();

        harness.operators.set_key(operator(1), public_key(1));

        let error = harness
            .keeper
            .slash_with_infraction_reason(
                &context,
                public_key(1).to_consensus_address(),
                context.height() + 1,
                100,
                SlashFactor::ONE,
                Infraction::DoubleSign,
            )
            .expect_err("infraction height is after the current block");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::FutureInfraction { .. }),
        ));
        assert!(harness.operators.slashes().is_empty());

        Ok(())
    }

    #[test]
    fn jailing_is_reflected_in_validator_status() -> Result<()> {
        let mut harness = Harness::new()?;
        let consensus_address = public_key(1).to_consensus_address();

        harness.opt_in(1, 100)?;
        harness.end_epoch()?;

        let context = harness.block_context();

        harness.keeper.jail(&context, consensus_address)?;

        let status = harness
            .keeper
            .validator_by_consensus_address(&context, consensus_address)?
            .expect("operator should be a validator");

        assert!(status.jailed);
        assert_eq!(status.validator.power, 100);

        harness.keeper.unjail(&context, consensus_address)?;

        assert!(!harness.keeper.is_validator_jailed(&context, consensus_address)?);

        Ok(())
    }

    #[test]
    fn unknown_validator_has_no_status() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();

        assert_eq!(
            harness
                .keeper
                .validator_by_consensus_address(&context, ConsensusAddress::repeat_byte(1))?,
            None,
        );

        Ok(())
    }
}
