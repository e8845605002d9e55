use std::sync::Arc;
use std::time::Duration;

use dac_challenge_interface::services::FinalizedHeadSource;
use dac_challenge_interface::L1BlockRef;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::actor::FinalizedSignal;

/// Upper bound on a single finalized head query.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls the finalized L1 head and forwards every new head to the actor.
pub struct FinalizedHeadPoller {
    source: Arc<dyn FinalizedHeadSource>,
    signal: FinalizedSignal,
    interval: Duration,
}

impl FinalizedHeadPoller {
    /// Polls `source` every `interval`.
    pub fn new(
        source: Arc<dyn FinalizedHeadSource>,
        signal: FinalizedSignal,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            signal,
            interval,
        }
    }

    /// Spawns the polling loop. It runs until `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<L1BlockRef> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let head = match tokio::time::timeout(POLL_TIMEOUT, self.source.finalized_ref()).await {
                Ok(Ok(head)) => head,
                Ok(Err(err)) => {
                    warn!(err = ?err, "Failed to poll finalized L1 head");
                    continue;
                }
                Err(_) => {
                    warn!(timeout = ?POLL_TIMEOUT, "Timed out polling finalized L1 head");
                    continue;
                }
            };
            if last.is_some_and(|last| last.hash == head.hash) {
                continue;
            }

            debug!(block_number = head.number, hash = ?head.hash, "New finalized L1 head");
            if !self.signal.send(&cancel, head).await {
                break;
            }
            last = Some(head);
        }
        debug!("Finalized head poller stopped");
    }
}
