//! Counters and gauges describing what the challenger did.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::executor::ActionKind;

const NAMESPACE: &str = "dac";

/// How a scheduled action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionResult {
    /// A transaction landed.
    Succeeded,
    /// The executor had nothing to do.
    Skipped,
    /// The executor failed.
    Failed,
    /// The mailbox was busy and the action was discarded.
    Dropped,
}

impl ActionResult {
    /// Label used in metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionResult::Succeeded => "succeeded",
            ActionResult::Skipped => "skipped",
            ActionResult::Failed => "failed",
            ActionResult::Dropped => "dropped",
        }
    }
}

/// Sink for the events the coordinator makes observable.
pub trait Metricer: Send + Sync {
    /// Counts one finished or discarded action.
    fn record_action(&self, kind: ActionKind, result: ActionResult);

    /// Records the highest L1 block the actor scheduled an action for.
    fn record_last_acted_l1_block(&self, block_number: u64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metricer for NoopMetrics {
    fn record_action(&self, _kind: ActionKind, _result: ActionResult) {}

    fn record_last_acted_l1_block(&self, _block_number: u64) {}
}

/// Prometheus metrics on a registry owned by the instance.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    actions: IntCounterVec,
    highest_acted_l1_block: IntGauge,
}

impl PrometheusMetrics {
    /// Creates and registers the metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let actions = IntCounterVec::new(
            Opts::new("actions_total", "Number of DA challenge actions by outcome")
                .namespace(NAMESPACE),
            &["action", "outcome"],
        )?;
        let highest_acted_l1_block = IntGauge::with_opts(
            Opts::new(
                "highest_acted_l1_block",
                "Highest L1 block number the challenger acted on",
            )
            .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(actions.clone()))?;
        registry.register(Box::new(highest_acted_l1_block.clone()))?;

        Ok(Self {
            registry,
            actions,
            highest_acted_l1_block,
        })
    }

    /// The registry holding every metric, for exposition.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the metrics in the Prometheus text format.
    pub fn encode_text(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl Metricer for PrometheusMetrics {
    fn record_action(&self, kind: ActionKind, result: ActionResult) {
        self.actions
            .with_label_values(&[kind.as_str(), result.as_str()])
            .inc();
    }

    fn record_last_acted_l1_block(&self, block_number: u64) {
        let block_number = i64::try_from(block_number).unwrap_or(i64::MAX);
        if block_number > self.highest_acted_l1_block.get() {
            self.highest_acted_l1_block.set(block_number);
        }
    }
}
