use anyhow::Result;
use log::debug;
use types::{
    containers::OperationKind,
    primitives::{ChainId, ConsensusPubKey, Epoch, OperatorAddress, RecordKey},
};

use crate::{
    collaborators::{DelegationHooks, EpochsHooks, OperatorHooks},
    context::BlockContext,
    keeper::Keeper,
    queue, scheduler,
    storage::Store,
};

impl EpochsHooks for Keeper {
    fn before_epoch_start(
        &self,
        _context: &mut BlockContext,
        _identifier: &str,
        _epoch: Epoch,
    ) -> Result<()> {
        Ok(())
    }

    fn after_epoch_end(
        &self,
        context: &mut BlockContext,
        identifier: &str,
        epoch: Epoch,
    ) -> Result<()> {
        scheduler::after_epoch_end(self, context, identifier, epoch)
    }
}

impl OperatorHooks for Keeper {
    // An operator that opts back in before its opt-out completes keeps its validator.
    fn after_operator_key_set(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        chain_id: &ChainId,
        public_key: ConsensusPubKey,
    ) -> Result<()> {
        if chain_id != context.chain_id() {
            return Ok(());
        }

        self.database().transaction(|branch| {
            let store = Store::new(branch);

            scheduler::clear_unbonding_information(store, *operator, public_key)?;
            queue::queue_operation(self, store, *operator, public_key, OperationKind::Add)?;

            Ok(())
        })
    }

    // The old key stays resolvable until the evidence window for it has passed.
    fn after_operator_key_replaced(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        old_key: ConsensusPubKey,
        new_key: ConsensusPubKey,
        chain_id: &ChainId,
    ) -> Result<()> {
        if chain_id != context.chain_id() {
            return Ok(());
        }

        self.database().transaction(|branch| {
            let store = Store::new(branch);

            scheduler::set_unbonding_information(self, store, *operator, old_key, false)?;
            scheduler::clear_unbonding_information(store, *operator, new_key)?;
            queue::queue_operation(self, store, *operator, old_key, OperationKind::Remove)?;
            queue::queue_operation(self, store, *operator, new_key, OperationKind::Add)?;

            Ok(())
        })
    }

    fn after_operator_key_removal_initiated(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        chain_id: &ChainId,
        public_key: ConsensusPubKey,
    ) -> Result<()> {
        if chain_id != context.chain_id() {
            return Ok(());
        }

        self.database().transaction(|branch| {
            let store = Store::new(branch);

            scheduler::set_unbonding_information(self, store, *operator, public_key, true)?;
            queue::queue_operation(self, store, *operator, public_key, OperationKind::Remove)?;

            Ok(())
        })
    }
}

impl DelegationHooks for Keeper {
    // Vote power is recomputed from scratch at every epoch boundary.
    fn after_delegation(&self, _context: &BlockContext, operator: &OperatorAddress) -> Result<()> {
        debug!("delegation to operator {operator:?} takes effect at the next epoch boundary");
        Ok(())
    }

    fn after_undelegation_started(
        &self,
        context: &BlockContext,
        operator: &OperatorAddress,
        record_key: &RecordKey,
    ) -> Result<()> {
        scheduler::schedule_undelegation(self, context, *operator, record_key)
    }
}

#[cfg(test)]
mod tests {
    use types::containers::Operation;

    use crate::test_utils::{operator, public_key, Harness};

    use super::*;

    #[test]
    fn key_set_queues_addition() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();

        harness.keeper.after_operator_key_set(
            &context,
            &operator(1),
            context.chain_id(),
            public_key(1),
        )?;

        assert_eq!(
            harness.keeper.store().operation_queue()?,
            [Operation {
                operator: operator(1),
                public_key: public_key(1),
                kind: OperationKind::Add,
            }],
        );

        Ok(())
    }

    #[test]
    fn events_for_other_chains_are_ignored() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();
        let other_chain = ChainId::from("other_1-1");

        harness
            .keeper
            .after_operator_key_set(&context, &operator(1), &other_chain, public_key(1))?;
        harness.keeper.after_operator_key_removal_initiated(
            &context,
            &operator(1),
            &other_chain,
            public_key(1),
        )?;

        assert!(harness.keeper.store().operation_queue()?.is_empty());
        assert_eq!(harness.keeper.operator_opt_out_finish_epoch(operator(1))?, None);

        Ok(())
    }

    #[test]
    fn opt_in_then_opt_out_in_same_epoch_cancels() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();

        harness.keeper.after_operator_key_set(
            &context,
            &operator(1),
            context.chain_id(),
            public_key(1),
        )?;
        harness.keeper.after_operator_key_removal_initiated(
            &context,
            &operator(1),
            context.chain_id(),
            public_key(1),
        )?;

        assert!(harness.keeper.store().operation_queue()?.is_empty());
        assert!(harness
            .keeper
            .operator_opt_out_finish_epoch(operator(1))?
            .is_some());

        Ok(())
    }

    #[test]
    fn re_opt_in_clears_scheduled_opt_out() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();
        let epoch = harness.keeper.unbonding_completion_epoch()?;

        harness.keeper.after_operator_key_removal_initiated(
            &context,
            &operator(1),
            context.chain_id(),
            public_key(1),
        )?;
        harness.keeper.after_operator_key_set(
            &context,
            &operator(1),
            context.chain_id(),
            public_key(1),
        )?;

        assert!(harness.keeper.opt_outs_to_finish(epoch)?.is_empty());
        assert!(harness.keeper.consensus_addresses_to_prune(epoch)?.is_empty());
        assert_eq!(harness.keeper.operator_opt_out_finish_epoch(operator(1))?, None);

        Ok(())
    }

    #[test]
    fn key_replacement_queues_both_operations() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();
        let epoch = harness.keeper.unbonding_completion_epoch()?;

        harness.keeper.after_operator_key_replaced(
            &context,
            &operator(1),
            public_key(1),
            public_key(2),
            context.chain_id(),
        )?;

        let kinds = harness
            .keeper
            .store()
            .operation_queue()?
            .into_iter()
            .map(|operation| (operation.public_key, operation.kind))
            .collect::<Vec<_>>();

        assert_eq!(
            kinds,
            [
                (public_key(1), OperationKind::Remove),
                (public_key(2), OperationKind::Add),
            ],
        );
        assert_eq!(
            harness.keeper.consensus_addresses_to_prune(epoch)?,
            [public_key(1).to_consensus_address()],
        );

        Ok(())
    }

    #[test]
    fn undelegation_during_opt_out_matures_with_opt_out() -> Result<()> {
        let harness = Harness::new()?;
        let context = harness.block_context();
        let record_key = RecordKey::from(&[9][..]);

        harness.operators.set_key(operator(1), public_key(1));
        harness.keeper.after_operator_key_removal_initiated(
            &context,
            &operator(1),
            context.chain_id(),
            public_key(1),
        )?;
        harness.operators.set_mid_key_removal(operator(1));

        let opt_out_epoch = harness.keeper.operator_opt_out_finish_epoch(operator(1))?;

        // The unbonding period computed now would end later than the opt-out.
        harness.epochs.advance();

        harness
            .keeper
            .after_undelegation_started(&context, &operator(1), &record_key)?;

        assert!(opt_out_epoch.is_some());
        assert_eq!(
            harness.keeper.undelegation_maturity_epoch(&record_key)?,
            opt_out_epoch,
        );
        assert_eq!(harness.delegations.holds(&record_key), 1);

        Ok(())
    }
}
