use core::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use anyhow::{ensure, Result};
use database::Database;
use itertools::Itertools as _;
use log::{debug, error, info, warn};
use tracing::instrument;
use types::{
    containers::{power_order, OperationKind, Validator, ValidatorUpdate},
    primitives::{ConsensusPubKey, Height, OperatorAddress, Power, ValidatorSetId},
};

use crate::{
    context::{BlockContext, HookContext},
    error::Error,
    hooks::{HookKind, MultiHooks, ValidatorSetHooks as _},
    keeper::Keeper,
    storage::Store,
};

/// Produces the validator updates for the block described by `context`.
///
/// Blocks that do not end an epoch carry the validator set over unchanged.
#[instrument(level = "debug", skip_all, fields(height = context.height()))]
pub fn end_block(keeper: &Keeper, context: &mut BlockContext) -> Result<Vec<ValidatorUpdate>> {
    let store = keeper.store();

    if !context.take_epoch_ended() {
        carry_validator_set_id(store, context.height())?;
        return Ok(vec![]);
    }

    let _timer = keeper
        .metrics()
        .map(|metrics| metrics.end_block_times.start_timer());

    release_pending(keeper, context)?;

    let removed_keys = store
        .pending_operations()?
        .into_iter()
        .filter(|operation| operation.kind == OperationKind::Remove)
        .map(|operation| operation.public_key)
        .collect::<HashSet<_>>();

    store.set_pending_operations(&[])?;

    let updates = match compute_updates(keeper, context, &removed_keys) {
        Ok(updates) => updates,
        Err(error) => {
            warn!(
                "unable to recompute validator set at height {}; \
                 retrying at the next epoch boundary: {error:?}",
                context.height(),
            );

            if let Some(metrics) = keeper.metrics() {
                metrics.recomputation_failures.inc();
            }

            carry_validator_set_id(store, context.height())?;

            return Ok(vec![]);
        }
    };

    apply_validator_changes(keeper, context, updates)
}

/// Applies each update in its own scope and returns the ones that succeeded, sorted.
pub fn apply_validator_changes(
    keeper: &Keeper,
    context: &BlockContext,
    updates: Vec<ValidatorUpdate>,
) -> Result<Vec<ValidatorUpdate>> {
    let store = keeper.store();
    let mut applied = Vec::with_capacity(updates.len());

    for update in updates {
        let result = keeper
            .database()
            .transaction(|branch| apply_validator_change(keeper, context, branch, update));

        match result {
            Ok(true) => applied.push(update),
            Ok(false) => {}
            Err(error) => warn!("dropping validator update {update:?}: {error:?}"),
        }
    }

    applied.sort_by(compare_updates);

    let validators = store.validators()?;

    let total_power = validators
        .iter()
        .try_fold(0, |total: Power, validator| total.checked_add(validator.power))
        .ok_or(Error::TotalPowerOverflow)?;

    store.set_last_validator_updates(&applied)?;
    store.set_last_total_power(total_power)?;

    let validator_set_id = advance_validator_set_id(store, context.height())?;

    if !applied.is_empty() {
        info!(
            "validator set {validator_set_id} at height {}: {} updates, {} validators, \
             total power {total_power}",
            context.height(),
            applied.len(),
            validators.len(),
        );
    }

    if let Some(metrics) = keeper.metrics() {
        metrics.inc_validator_updates(applied.len());
        metrics.set_validator_set(validators.len(), total_power);
        metrics.set_validator_set_id(validator_set_id);
    }

    Ok(applied)
}

/// Updates for moving from `previous` to `next`.
///
/// `next` must already be sorted and capped. Keys that are in `previous` but not in `next` are
/// removed with a power of 0.
#[must_use]
pub fn diff(
    mut previous: BTreeMap<ConsensusPubKey, Power>,
    next: impl IntoIterator<Item = (ConsensusPubKey, Power)>,
) -> Vec<ValidatorUpdate> {
    let mut updates = vec![];

    for (public_key, power) in next {
        if previous.remove(&public_key) != Some(power) {
            updates.push(ValidatorUpdate { public_key, power });
        }
    }

    updates.extend(
        previous
            .into_keys()
            .map(|public_key| ValidatorUpdate {
                public_key,
                power: 0,
            }),
    );

    updates
}

/// Descending by power, ties broken by descending public key bytes.
#[must_use]
pub fn compare_updates(first: &ValidatorUpdate, second: &ValidatorUpdate) -> Ordering {
    first.cmp_by_power(second)
}

fn release_pending(keeper: &Keeper, context: &BlockContext) -> Result<()> {
    let collaborators = keeper.collaborators()?;
    let store = keeper.store();
    let chain_id = context.chain_id();

    for record_key in store.pending_undelegations()? {
        if let Err(error) = collaborators
            .delegations
            .decrement_undelegation_hold(&record_key)
        {
            error!("unable to release hold on undelegation {record_key}: {error:?}");
        }

        store.delete_undelegation_maturity_epoch(&record_key)?;
    }

    store.set_pending_undelegations(&[])?;

    for operator in store.pending_opt_outs()? {
        if let Err(error) = collaborators
            .operators
            .complete_operator_opt_out(&operator, chain_id)
        {
            error!("unable to complete opt-out of operator {operator:?}: {error:?}");
        }

        store.delete_operator_opt_out_finish_epoch(operator)?;
    }

    store.set_pending_opt_outs(&[])?;

    for consensus_address in store.pending_consensus_addresses()? {
        if let Err(error) = collaborators
            .operators
            .delete_operator_address_for_consensus_address(chain_id, &consensus_address)
        {
            error!("unable to prune consensus address {consensus_address:?}: {error:?}");
        }

        store.delete_consensus_address_prune_epoch(consensus_address)?;
    }

    store.set_pending_consensus_addresses(&[])?;

    Ok(())
}

fn compute_updates(
    keeper: &Keeper,
    context: &BlockContext,
    removed_keys: &HashSet<ConsensusPubKey>,
) -> Result<Vec<ValidatorUpdate>> {
    let collaborators = keeper.collaborators()?;
    let store = keeper.store();
    let params = store.params()?;

    let mut operators = vec![];
    let mut public_keys = vec![];

    for (operator, public_key) in collaborators
        .operators
        .active_operators_for_chain(context.chain_id())?
    {
        if removed_keys.contains(&public_key) {
            debug!("skipping {public_key:?} of operator {operator:?}: removal pending");
            continue;
        }

        let self_delegation = collaborators.restaking.self_delegated_value(&operator)?;

        if self_delegation < params.min_self_delegation {
            debug!(
                "skipping operator {operator:?}: self delegation {self_delegation} \
                 is below minimum {}",
                params.min_self_delegation,
            );
            continue;
        }

        operators.push(operator);
        public_keys.push(public_key);
    }

    let powers = collaborators.restaking.average_vote_power(
        &operators,
        &params.asset_ids,
        &params.epoch_identifier,
    )?;

    ensure!(
        powers.len() == operators.len(),
        Error::VotePowerCountMismatch {
            expected: operators.len(),
            actual: powers.len(),
        },
    );

    let max_validators = usize::try_from(params.max_validators)?;

    let next = public_keys
        .into_iter()
        .zip(powers)
        .sorted_by(|(first_key, first_power), (second_key, second_power)| {
            power_order(*first_power, first_key, *second_power, second_key)
        })
        .take(max_validators)
        .take_while(|(_, power)| *power >= 1);

    let previous = store
        .validators()?
        .into_iter()
        .map(|validator| (validator.public_key, validator.power))
        .collect();

    Ok(diff(previous, next))
}

// Runs inside a branch of the module store. Returning an error discards the branch.
fn apply_validator_change(
    keeper: &Keeper,
    context: &BlockContext,
    branch: &Database,
    update: ValidatorUpdate,
) -> Result<bool> {
    let store = Store::new(branch);
    let consensus_address = update.public_key.to_consensus_address();
    let is_active = update.power >= 1;

    let hook_context = HookContext {
        block: context,
        store: branch,
    };

    match (store.validator(consensus_address)?, is_active) {
        (Some(_), false) => {
            store.delete_validator(consensus_address)?;

            let operator = keeper
                .collaborators()?
                .operators
                .operator_address_for_consensus_address(context.chain_id(), &consensus_address);

            dispatch(keeper, HookKind::AfterValidatorRemoved, |hooks| {
                hooks.after_validator_removed(&hook_context, consensus_address, operator)
            })?;
        }
        (Some(mut validator), true) => {
            validator.power = update.power;
            store.set_validator(&validator)?;

            let operator = resolve_operator(keeper, context, update)?;

            dispatch(keeper, HookKind::AfterValidatorCreated, |hooks| {
                hooks.after_validator_created(&hook_context, consensus_address, operator)
            })?;
        }
        (None, true) => {
            store.set_validator(&Validator::new(update.public_key, update.power))?;

            let operator = resolve_operator(keeper, context, update)?;

            dispatch(keeper, HookKind::AfterValidatorBonded, |hooks| {
                hooks.after_validator_bonded(&hook_context, consensus_address, operator)
            })?;
        }
        (None, false) => {
            warn!(
                "skipping removal of {:?} because it is not a validator",
                update.public_key,
            );

            return Ok(false);
        }
    }

    Ok(true)
}

fn resolve_operator(
    keeper: &Keeper,
    context: &BlockContext,
    update: ValidatorUpdate,
) -> Result<OperatorAddress> {
    let consensus_address = update.public_key.to_consensus_address();

    keeper
        .collaborators()?
        .operators
        .operator_address_for_consensus_address(context.chain_id(), &consensus_address)
        .ok_or(Error::OperatorNotFound { consensus_address })
        .map_err(Into::into)
}

fn dispatch(
    keeper: &Keeper,
    hook: HookKind,
    call: impl FnOnce(&MultiHooks) -> Result<()>,
) -> Result<()> {
    let timer = keeper
        .metrics()
        .and_then(|metrics| prometheus_metrics::start_timer_vec(&metrics.hook_times, hook.as_ref()));

    let result = call(keeper.hooks());

    prometheus_metrics::stop_and_record(timer);

    if result.is_err() {
        if let Some(metrics) = keeper.metrics() {
            metrics.inc_hook_failures(hook.as_ref());
        }
    }

    result
}

// A new validator set takes effect at the next height even if no power changed.
fn advance_validator_set_id(store: Store, height: Height) -> Result<ValidatorSetId> {
    let next = store.validator_set_id(height)?.unwrap_or_default() + 1;
    store.set_validator_set_id(height + 1, next)?;
    Ok(next)
}

fn carry_validator_set_id(store: Store, height: Height) -> Result<()> {
    let current = store.validator_set_id(height)?.unwrap_or_default();
    store.set_validator_set_id(height + 1, current)
}
