use anyhow::Result;
use log::debug;
use strum::AsRefStr;
use types::{
    containers::{Operation, OperationKind},
    primitives::{ConsensusPubKey, OperatorAddress},
};

use crate::{keeper::Keeper, storage::Store};

#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum QueueResultType {
    /// The operation was appended to the queue.
    Success,
    /// An operation of the same kind for the same key is already queued.
    Exists,
    /// An operation of the opposite kind for the same key was queued. Both were dropped.
    Removed,
}

pub fn queue_operation(
    keeper: &Keeper,
    store: Store,
    operator: OperatorAddress,
    public_key: ConsensusPubKey,
    kind: OperationKind,
) -> Result<QueueResultType> {
    let result = enqueue(store, operator, public_key, kind)?;

    debug!(
        "queued {} operation for {public_key:?} of operator {operator:?}: {}",
        kind.as_ref(),
        result.as_ref(),
    );

    if let Some(metrics) = keeper.metrics() {
        if result == QueueResultType::Success {
            metrics.inc_queued_operations(kind.as_ref());
        }
    }

    Ok(result)
}

// There is at most one queued operation per key, so the first match is the only one.
pub fn enqueue(
    store: Store,
    operator: OperatorAddress,
    public_key: ConsensusPubKey,
    kind: OperationKind,
) -> Result<QueueResultType> {
    let mut queue = store.operation_queue()?;

    let result = match queue
        .iter()
        .position(|operation| operation.public_key == public_key)
    {
        Some(index) if queue[index].kind == kind => return Ok(QueueResultType::Exists),
        Some(index) => {
            queue.remove(index);
            QueueResultType::Removed
        }
        None => {
            queue.push(Operation {
                operator,
                public_key,
                kind,
            });

            QueueResultType::Success
        }
    };

    store.set_operation_queue(&queue)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use database::Database;
    use test_case::test_case;

    use super::*;

    const ADD: OperationKind = OperationKind::Add;
    const REMOVE: OperationKind = OperationKind::Remove;

    #[test_case(&[ADD], &[QueueResultType::Success], 1; "single addition")]
    #[test_case(&[ADD, ADD], &[QueueResultType::Success, QueueResultType::Exists], 1; "repeated addition")]
    #[test_case(&[ADD, REMOVE], &[QueueResultType::Success, QueueResultType::Removed], 0; "addition then removal")]
    #[test_case(&[REMOVE, ADD], &[QueueResultType::Success, QueueResultType::Removed], 0; "removal then addition")]
    #[test_case(
        &[ADD, REMOVE, REMOVE],
        &[QueueResultType::Success, QueueResultType::Removed, QueueResultType::Success],
        1;
        "removal after cancellation"
    )]
    fn operations_for_one_key_collapse(
        kinds: &[OperationKind],
        expected_results: &[QueueResultType],
        expected_length: usize,
    ) -> Result<()> {
        let database = Database::in_memory();
        let store = Store::new(&database);
        let operator = OperatorAddress::repeat_byte(1);
        let public_key = ConsensusPubKey::repeat_byte(1);

        let results = kinds
            .iter()
            .map(|kind| enqueue(store, operator, public_key, *kind))
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(results, expected_results);
        assert_eq!(store.operation_queue()?.len(), expected_length);

        Ok(())
    }

    #[test]
    fn operations_for_different_keys_are_kept_in_order() -> Result<()> {
        let database = Database::in_memory();
        let store = Store::new(&database);
        let operator = OperatorAddress::repeat_byte(1);

        enqueue(store, operator, ConsensusPubKey::repeat_byte(1), REMOVE)?;
        enqueue(store, operator, ConsensusPubKey::repeat_byte(2), ADD)?;

        let queue = store.operation_queue()?;

        assert_eq!(
            queue,
            [
                Operation {
                    operator,
                    public_key: ConsensusPubKey::repeat_byte(1),
                    kind: REMOVE,
                },
                Operation {
                    operator,
                    public_key: ConsensusPubKey::repeat_byte(2),
                    kind: ADD,
                },
            ],
        );

        Ok(())
    }
}
