use std::sync::Arc;

use anyhow::Result;
use log::warn;
use once_cell::sync::OnceCell;
use prometheus::{
    histogram_opts, opts, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec,
};
use types::primitives::{Power, ValidatorSetId};

pub static METRICS: OnceCell<Arc<Metrics>> = OnceCell::new();

#[derive(Debug)]
pub struct Metrics {
    // Validator set
    active_validators: IntGauge,
    total_vote_power: IntGauge,
    validator_set_id: IntGauge,
    validator_updates: IntCounter,
    pub recomputation_failures: IntCounter,

    // Queues and schedules
    queued_operations: IntCounterVec,
    pending_items: IntGaugeVec,

    // Hooks
    hook_failures: IntCounterVec,
    pub hook_times: HistogramVec,

    // Block processing
    pub begin_block_times: Histogram,
    pub end_block_times: Histogram,
    pub epoch_end_times: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Validator set
            active_validators: IntGauge::new(
                "VALIDATOR_SET_ACTIVE_VALIDATORS",
                "Number of validators in the last applied validator set",
            )?,

            total_vote_power: IntGauge::new(
                "VALIDATOR_SET_TOTAL_VOTE_POWER",
                "Sum of the vote power of the last applied validator set",
            )?,

            validator_set_id: IntGauge::new(
                "VALIDATOR_SET_ID",
                "Identifier of the current validator set",
            )?,

            validator_updates: IntCounter::new(
                "VALIDATOR_SET_UPDATES_TOTAL",
                "Number of validator updates handed to the consensus engine",
            )?,

            recomputation_failures: IntCounter::new(
                "VALIDATOR_SET_RECOMPUTATION_FAILURES_TOTAL",
                "Number of epoch boundaries at which the validator set could not be recomputed",
            )?,

            // Queues and schedules
            queued_operations: IntCounterVec::new(
                opts!(
                    "VALIDATOR_SET_QUEUED_OPERATIONS_TOTAL",
                    "Number of consensus key operations queued by kind",
                ),
                &["kind"],
            )?,

            pending_items: IntGaugeVec::new(
                opts!(
                    "VALIDATOR_SET_PENDING_ITEMS",
                    "Number of items waiting for the next epoch boundary by kind",
                ),
                &["kind"],
            )?,

            // Hooks
            hook_failures: IntCounterVec::new(
                opts!(
                    "VALIDATOR_SET_HOOK_FAILURES_TOTAL",
                    "Number of failed hook invocations by hook",
                ),
                &["hook"],
            )?,

            hook_times: HistogramVec::new(
                histogram_opts!("VALIDATOR_SET_HOOK_TIMES", "Hook invocation times"),
                &["hook"],
            )?,

            // Block processing
            begin_block_times: Histogram::with_opts(histogram_opts!(
                "VALIDATOR_SET_BEGIN_BLOCK_TIMES",
                "Historical info tracking times",
            ))?,

            end_block_times: Histogram::with_opts(histogram_opts!(
                "VALIDATOR_SET_END_BLOCK_TIMES",
                "End block processing times",
            ))?,

            epoch_end_times: Histogram::with_opts(histogram_opts!(
                "VALIDATOR_SET_EPOCH_END_TIMES",
                "Epoch end hook processing times",
            ))?,
        })
    }

    pub fn register_with_default_metrics(&self) -> Result<()> {
        let default_registry = prometheus::default_registry();

        default_registry.register(Box::new(self.active_validators.clone()))?;
        default_registry.register(Box::new(self.total_vote_power.clone()))?;
        default_registry.register(Box::new(self.validator_set_id.clone()))?;
        default_registry.register(Box::new(self.validator_updates.clone()))?;
        default_registry.register(Box::new(self.recomputation_failures.clone()))?;
        default_registry.register(Box::new(self.queued_operations.clone()))?;
        default_registry.register(Box::new(self.pending_items.clone()))?;
        default_registry.register(Box::new(self.hook_failures.clone()))?;
        default_registry.register(Box::new(self.hook_times.clone()))?;
        default_registry.register(Box::new(self.begin_block_times.clone()))?;
        default_registry.register(Box::new(self.end_block_times.clone()))?;
        default_registry.register(Box::new(self.epoch_end_times.clone()))?;

        Ok(())
    }

    // Validator set
    pub fn set_validator_set(&self, validator_count: usize, total_vote_power: Power) {
        self.active_validators
            .set(i64::try_from(validator_count).unwrap_or(i64::MAX));
        self.total_vote_power.set(total_vote_power);
    }

    pub fn set_validator_set_id(&self, validator_set_id: ValidatorSetId) {
        self.validator_set_id
            .set(i64::try_from(validator_set_id).unwrap_or(i64::MAX));
    }

    pub fn inc_validator_updates(&self, count: usize) {
        self.validator_updates
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    // Queues and schedules
    pub fn inc_queued_operations(&self, kind: &str) {
        match self.queued_operations.get_metric_with_label_values(&[kind]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to track queued {kind} operation: {error:?}"),
        }
    }

    pub fn set_pending_items(&self, kind: &str, count: usize) {
        match self.pending_items.get_metric_with_label_values(&[kind]) {
            Ok(gauge) => gauge.set(i64::try_from(count).unwrap_or(i64::MAX)),
            Err(error) => warn!("unable to track pending {kind} count: {error:?}"),
        }
    }

    // Hooks
    pub fn inc_hook_failures(&self, hook: &str) {
        match self.hook_failures.get_metric_with_label_values(&[hook]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to track failure of {hook} hook: {error:?}"),
        }
    }
}
