//! Periodic maintenance: feed refresh and convert settlement.
//!
//! Runs when a block's timestamp reaches the next maintenance time. The
//! median exchange rate is recomputed from the active witnesses' current
//! feeds, then every due convert request settles at that median. Requests
//! stay queued while no feed exists — settlement is postponed, never
//! forfeited.

use crate::error::ChainError;
use crate::evaluator::credit;
use meridian_protocol::{FillConvertOperation, Operation};
use meridian_store::ObjectStore;
use meridian_types::{Price, Timestamp};

/// Recompute the median exchange rate from active witnesses' feeds.
pub fn refresh_median_feed(store: &mut ObjectStore) -> Result<(), ChainError> {
    let globals = store.globals()?;
    let feeds: Vec<Price> = globals
        .active_witnesses
        .iter()
        .filter_map(|name| store.find_witness(name))
        .filter_map(|(_, w)| w.last_feed)
        .collect();
    let median = Price::median(feeds);
    store.modify_globals(|g| g.median_feed = median)?;
    Ok(())
}

/// Settle every convert request due at or before `now`.
///
/// Returns the virtual fill operations describing each settlement.
pub fn settle_due_converts(
    store: &mut ObjectStore,
    now: Timestamp,
) -> Result<Vec<Operation>, ChainError> {
    let Some(median) = store.globals()?.median_feed else {
        // No feed yet; requests remain queued for a later maintenance.
        return Ok(Vec::new());
    };

    let mut fills = Vec::new();
    for id in store.due_converts(now) {
        let request = store.convert_request(id)?.clone();
        let Some(amount_out) = median.convert(request.amount) else {
            tracing::warn!(
                owner = %request.owner,
                amount = %request.amount,
                "convert settlement skipped: median cannot price this amount"
            );
            continue;
        };
        credit(store, "fill_convert", &request.owner, amount_out)?;
        store.remove(id)?;
        fills.push(Operation::FillConvert(FillConvertOperation {
            owner: request.owner,
            amount_in: request.amount,
            amount_out,
        }));
    }
    Ok(fills)
}

/// One full maintenance pass.
pub fn run_maintenance(
    store: &mut ObjectStore,
    now: Timestamp,
) -> Result<Vec<Operation>, ChainError> {
    refresh_median_feed(store)?;
    let fills = settle_due_converts(store, now)?;
    if !fills.is_empty() {
        tracing::info!(settled = fills.len(), "maintenance settled convert requests");
    }
    Ok(fills)
}
