use anyhow::Result;
use log::debug;
use types::containers::{HistoricalInfo, Validator};

use crate::{context::BlockContext, keeper::Keeper};

/// Records the header and validator set of the current block and prunes snapshots that fell out
/// of the retention window.
pub fn track_historical_info(keeper: &Keeper, context: &BlockContext) -> Result<()> {
    let _timer = keeper
        .metrics()
        .map(|metrics| metrics.begin_block_times.start_timer());

    let store = keeper.store();
    let params = store.params()?;
    let height = context.height();

    // The validator set ID of the current height is still needed by `end_block`.
    let oldest_retained = height
        .saturating_sub(i64::from(params.historical_entries) - 1)
        .clamp(0, height.max(0));

    store.prune_history_below(oldest_retained)?;

    if params.historical_entries == 0 {
        return Ok(());
    }

    let mut validators = store.validators()?;

    validators.sort_by(Validator::cmp_by_power);

    debug!("storing historical info for height {height} with {} validators", validators.len());

    store.set_historical_info(
        height,
        &HistoricalInfo {
            header: context.header().clone(),
            validators,
        },
    )
}
