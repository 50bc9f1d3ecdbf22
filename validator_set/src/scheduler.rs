use anyhow::Result;
use log::{debug, info};
use tracing::instrument;
use types::primitives::{ConsensusAddress, ConsensusPubKey, Epoch, OperatorAddress, RecordKey};

use crate::{context::BlockContext, error::Error, keeper::Keeper, storage::Store};

/// Moves everything due at the end of `epoch` into the pending sets read by `end_block`.
#[instrument(level = "debug", skip(keeper, context))]
pub fn after_epoch_end(
    keeper: &Keeper,
    context: &mut BlockContext,
    identifier: &str,
    epoch: Epoch,
) -> Result<()> {
    let _timer = keeper
        .metrics()
        .map(|metrics| metrics.epoch_end_times.start_timer());

    let params = keeper.store().params()?;

    if identifier != params.epoch_identifier {
        return Ok(());
    }

    let pending = keeper
        .database()
        .transaction(|branch| promote_to_pending(Store::new(branch), epoch))?;

    info!(
        "epoch {epoch} ended; pending: {} operations, {} opt-outs, {} prunes, {} undelegations",
        pending.operations, pending.opt_outs, pending.consensus_addresses, pending.undelegations,
    );

    if let Some(metrics) = keeper.metrics() {
        metrics.set_pending_items("operations", pending.operations);
        metrics.set_pending_items("opt_outs", pending.opt_outs);
        metrics.set_pending_items("consensus_addresses", pending.consensus_addresses);
        metrics.set_pending_items("undelegations", pending.undelegations);
    }

    context.mark_epoch_ended();

    Ok(())
}

#[derive(Clone, Copy, Default, Debug)]
pub struct PendingCounts {
    pub operations: usize,
    pub opt_outs: usize,
    pub consensus_addresses: usize,
    pub undelegations: usize,
}

pub fn promote_to_pending(store: Store, epoch: Epoch) -> Result<PendingCounts> {
    let operations = store.operation_queue()?;
    store.set_pending_operations(&operations)?;
    store.set_operation_queue(&[])?;

    let opt_outs = store.opt_outs_to_finish(epoch)?;
    store.set_pending_opt_outs(&opt_outs)?;
    store.set_opt_outs_to_finish(epoch, &[])?;

    let consensus_addresses = store.consensus_addresses_to_prune(epoch)?;
    store.set_pending_consensus_addresses(&consensus_addresses)?;
    store.set_consensus_addresses_to_prune(epoch, &[])?;

    let undelegations = store.undelegations_to_mature(epoch)?;
    store.set_pending_undelegations(&undelegations)?;
    store.set_undelegations_to_mature(epoch, &[])?;

    Ok(PendingCounts {
        operations: operations.len(),
        opt_outs: opt_outs.len(),
        consensus_addresses: consensus_addresses.len(),
        undelegations: undelegations.len(),
    })
}

pub fn unbonding_completion_epoch(keeper: &Keeper) -> Result<Epoch> {
    let epochs = &keeper.collaborators()?.epochs;
    let params = keeper.store().params()?;

    let epoch_info = epochs
        .epoch_info(&params.epoch_identifier)
        .ok_or_else(|| Error::UnknownEpochIdentifier {
            identifier: params.epoch_identifier.clone(),
        })?;

    epoch_info
        .current_epoch
        .checked_add(params.epochs_until_unbonded.into())
        .ok_or(Error::EpochOverflow)
        .map_err(Into::into)
}

/// Schedules pruning of the consensus address of `public_key` and, if `is_opting_out`, the
/// completion of the operator's opt-out.
pub fn set_unbonding_information(
    keeper: &Keeper,
    store: Store,
    operator: OperatorAddress,
    public_key: ConsensusPubKey,
    is_opting_out: bool,
) -> Result<()> {
    let epoch = unbonding_completion_epoch(keeper)?;

    if is_opting_out {
        append_opt_out_to_finish(store, epoch, operator)?;
        store.set_operator_opt_out_finish_epoch(operator, epoch)?;
    }

    append_consensus_address_to_prune(store, epoch, public_key.to_consensus_address())?;

    debug!(
        "scheduled unbonding of {public_key:?} of operator {operator:?} at epoch {epoch} \
         (opting out: {is_opting_out})",
    );

    Ok(())
}

/// Undoes a pending opt-out of `operator` and any scheduled pruning of `public_key`, which is
/// now in use again.
pub fn clear_unbonding_information(
    store: Store,
    operator: OperatorAddress,
    public_key: ConsensusPubKey,
) -> Result<()> {
    if let Some(epoch) = store.operator_opt_out_finish_epoch(operator)? {
        store.delete_operator_opt_out_finish_epoch(operator)?;

        let mut opt_outs = store.opt_outs_to_finish(epoch)?;
        opt_outs.retain(|scheduled| *scheduled != operator);
        store.set_opt_outs_to_finish(epoch, &opt_outs)?;

        debug!("cleared opt-out of operator {operator:?} scheduled at epoch {epoch}");
    }

    let consensus_address = public_key.to_consensus_address();

    if let Some(epoch) = store.consensus_address_prune_epoch(consensus_address)? {
        remove_consensus_address_to_prune(store, epoch, consensus_address)?;
        store.delete_consensus_address_prune_epoch(consensus_address)?;

        debug!("cleared pruning of {consensus_address:?} scheduled at epoch {epoch}");
    }

    // Promoted in this block but not yet released.
    let mut pending = store.pending_consensus_addresses()?;

    if pending.contains(&consensus_address) {
        pending.retain(|scheduled| *scheduled != consensus_address);
        store.set_pending_consensus_addresses(&pending)?;
    }

    Ok(())
}

/// Schedules the release of an undelegation from `operator` and places a hold on it.
///
/// Undelegations from an operator that is opting out mature together with the opt-out.
/// Undelegations from an operator without a key for this chain are not at risk and are not held.
/// Nothing is scheduled if the hold cannot be placed.
pub fn schedule_undelegation(
    keeper: &Keeper,
    context: &BlockContext,
    operator: OperatorAddress,
    record_key: &RecordKey,
) -> Result<()> {
    let collaborators = keeper.collaborators()?;
    let chain_id = context.chain_id();

    let opt_out_epoch = if collaborators
        .operators
        .is_operator_mid_key_removal(&operator, chain_id)
    {
        keeper.store().operator_opt_out_finish_epoch(operator)?
    } else {
        None
    };

    let epoch = match opt_out_epoch {
        Some(epoch) => epoch,
        None => {
            if collaborators
                .operators
                .operator_consensus_key_for_chain(&operator, chain_id)
                .is_none()
            {
                debug!("undelegation {record_key} from operator {operator:?} is not held");
                return Ok(());
            }

            unbonding_completion_epoch(keeper)?
        }
    };

    keeper.database().transaction(|branch| {
        let store = Store::new(branch);

        append_undelegation_to_mature(store, epoch, record_key)?;
        store.set_undelegation_maturity_epoch(record_key, epoch)?;

        collaborators
            .delegations
            .increment_undelegation_hold(record_key)
    })?;

    debug!("undelegation {record_key} from operator {operator:?} matures at epoch {epoch}");

    Ok(())
}

fn append_opt_out_to_finish(store: Store, epoch: Epoch, operator: OperatorAddress) -> Result<()> {
    let mut operators = store.opt_outs_to_finish(epoch)?;

    if !operators.contains(&operator) {
        operators.push(operator);
        store.set_opt_outs_to_finish(epoch, &operators)?;
    }

    Ok(())
}

// A consensus address is scheduled for pruning at most once. Rescheduling moves it.
fn append_consensus_address_to_prune(
    store: Store,
    epoch: Epoch,
    consensus_address: ConsensusAddress,
) -> Result<()> {
    if let Some(previous_epoch) = store.consensus_address_prune_epoch(consensus_address)? {
        if previous_epoch == epoch {
            return Ok(());
        }

        remove_consensus_address_to_prune(store, previous_epoch, consensus_address)?;
    }

    let mut consensus_addresses = store.consensus_addresses_to_prune(epoch)?;

    if !consensus_addresses.contains(&consensus_address) {
        consensus_addresses.push(consensus_address);
        store.set_consensus_addresses_to_prune(epoch, &consensus_addresses)?;
    }

    store.set_consensus_address_prune_epoch(consensus_address, epoch)
}

fn remove_consensus_address_to_prune(
    store: Store,
    epoch: Epoch,
    consensus_address: ConsensusAddress,
) -> Result<()> {
    let mut consensus_addresses = store.consensus_addresses_to_prune(epoch)?;
    consensus_addresses.retain(|scheduled| *scheduled != consensus_address);
    store.set_consensus_addresses_to_prune(epoch, &consensus_addresses)
}

fn append_undelegation_to_mature(store: Store, epoch: Epoch, record_key: &RecordKey) -> Result<()> {
    let mut record_keys = store.undelegations_to_mature(epoch)?;

    if !record_keys.contains(record_key) {
        record_keys.push(record_key.clone());
        store.set_undelegations_to_mature(epoch, &record_keys)?;
    }

    Ok(())
}
