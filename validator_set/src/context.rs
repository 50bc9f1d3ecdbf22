use database::Database;
use types::{
    containers::HeaderSummary,
    primitives::{ChainId, Height},
};

/// State threaded through the processing of a single block.
///
/// A fresh context is created for every block. The epoch-ended marker is set by the epoch end
/// hook and consumed by the `end_block` call of the same block.
#[derive(Clone, Debug)]
pub struct BlockContext {
    header: HeaderSummary,
    epoch_ended: bool,
}

impl BlockContext {
    #[must_use]
    pub const fn new(header: HeaderSummary) -> Self {
        Self {
            header,
            epoch_ended: false,
        }
    }

    #[must_use]
    pub const fn header(&self) -> &HeaderSummary {
        &self.header
    }

    #[must_use]
    pub const fn chain_id(&self) -> &ChainId {
        &self.header.chain_id
    }

    #[must_use]
    pub const fn height(&self) -> Height {
        self.header.height
    }

    #[must_use]
    pub const fn epoch_ended(&self) -> bool {
        self.epoch_ended
    }

    pub(crate) fn mark_epoch_ended(&mut self) {
        self.epoch_ended = true;
    }

    pub(crate) fn take_epoch_ended(&mut self) -> bool {
        core::mem::take(&mut self.epoch_ended)
    }
}

/// Passed to validator set hooks.
///
/// `store` is a branch that is merged into the module store only if the hook succeeds.
/// Subscribers that keep their own records in the same store must write them through it.
#[derive(Clone, Copy)]
pub struct HookContext<'context> {
    pub block: &'context BlockContext,
    pub store: &'context Database,
}
