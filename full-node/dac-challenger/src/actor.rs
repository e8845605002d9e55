//! The block-driven decision loop.
//!
//! For every finalized L1 block the actor advances the DA provider's origin, looks at each DA
//! commitment posted in the block and decides whether it has to be challenged or resolved. The
//! decisions are handed to the schedulers, which execute them in the background.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dac_challenge_interface::services::{L1Fetcher, PlasmaError, PlasmaInputFetcher};
use dac_challenge_interface::{
    Action, ChallengeStatus, CommitmentArg, CommitmentData, L1BlockRef, ResolveData,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::Executor;
use crate::follow_up::{FollowUps, PendingUnlocks};
use crate::metrics::Metricer;
use crate::scheduler::{
    ActionScheduler, BondUnlockScheduler, ChallengeScheduler, Enqueued, ResolveScheduler,
    SchedulerError, WithdrawScheduler,
};
use crate::source::{CommitmentSource, DataSourceError, DataSourceFactory};

/// Protocol parameters the actor decides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorConfig {
    /// Blocks after a commitment during which it can be challenged.
    pub challenge_window: u64,
    /// Blocks after a challenge during which it can be resolved.
    pub resolve_window: u64,
    /// Spacing between re-evaluations of a commitment. Zero disables re-evaluation.
    pub retry_interval_blocks: u64,
}

impl ActorConfig {
    fn challenge_deadline(&self, block_number: u64) -> u64 {
        block_number.saturating_add(self.challenge_window)
    }

    fn resolve_deadline(&self, block_number: u64) -> u64 {
        self.challenge_deadline(block_number)
            .saturating_add(self.resolve_window)
    }
}

/// The schedulers the actor feeds. At least one of `challenge` and `resolve` must be set.
#[derive(Clone, Default)]
pub struct Schedulers {
    /// Receives challenges.
    pub challenge: Option<Arc<ChallengeScheduler>>,
    /// Receives resolves.
    pub resolve: Option<Arc<ResolveScheduler>>,
    /// Receives bond unlocks of challenged commitments.
    pub unlock: Option<Arc<BondUnlockScheduler>>,
    /// Receives one withdrawal per finalized block.
    pub withdraw: Option<Arc<WithdrawScheduler>>,
}

/// Errors of the actor.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Neither a challenge nor a resolve scheduler was configured.
    #[error("actor needs to be configured with a challenger or a resolver, or both")]
    NothingToDo,
    /// The DA provider could not follow the new finalized block.
    #[error("failed to advance plasma L1 origin to block {block_number}")]
    AdvanceOrigin {
        /// The finalized block.
        block_number: u64,
        /// Underlying error.
        #[source]
        source: PlasmaError,
    },
    /// Reading the block's commitments failed.
    #[error("failed to return input commitment for batch")]
    Source(#[from] DataSourceError),
    /// A scheduler refused the decision.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Shutdown started while the block was processed.
    #[error("actor was cancelled")]
    Cancelled,
}

impl ActorError {
    /// Whether the actor cannot make progress on any later block either.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ActorError::Source(DataSourceError::MissingBlobsFetcher(_))
        )
    }
}

enum Decision {
    Act(Action),
    Nothing,
    /// The input could not be fetched for reasons unrelated to the protocol.
    Retry,
}

/// Decides what to do about the DA commitments of each finalized block.
pub struct Actor {
    schedulers: Schedulers,
    plasma: Arc<dyn PlasmaInputFetcher>,
    l1: Arc<dyn L1Fetcher>,
    sources: DataSourceFactory,
    metrics: Arc<dyn Metricer>,
    config: ActorConfig,
    follow_ups: FollowUps,
    unlocks: PendingUnlocks,
    last_acted: Arc<AtomicU64>,
}

impl Actor {
    /// Creates an actor. Fails with [`ActorError::NothingToDo`] unless a challenge or resolve
    /// scheduler is configured.
    pub fn new(
        schedulers: Schedulers,
        plasma: Arc<dyn PlasmaInputFetcher>,
        l1: Arc<dyn L1Fetcher>,
        sources: DataSourceFactory,
        metrics: Arc<dyn Metricer>,
        config: ActorConfig,
    ) -> Result<Self, ActorError> {
        if schedulers.challenge.is_none() && schedulers.resolve.is_none() {
            return Err(ActorError::NothingToDo);
        }
        Ok(Self {
            schedulers,
            plasma,
            l1,
            sources,
            metrics,
            follow_ups: FollowUps::new(config.retry_interval_blocks),
            unlocks: PendingUnlocks::default(),
            config,
            last_acted: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Highest L1 block an action was scheduled for. Zero before the first action.
    pub fn last_acted_l1_block(&self) -> u64 {
        self.last_acted.load(Ordering::Relaxed)
    }

    /// Number of commitments waiting to be re-evaluated.
    pub fn pending_follow_ups(&self) -> usize {
        self.follow_ups.len()
    }

    /// Number of challenged commitments whose bond has not been unlocked yet.
    pub fn pending_unlocks(&self) -> usize {
        self.unlocks.len()
    }

    /// Processes one finalized block to completion.
    ///
    /// Errors abort the block only. [`ActorError::is_fatal`] tells whether later blocks can
    /// succeed.
    pub async fn process_finalized(
        &mut self,
        cancel: &CancellationToken,
        head: L1BlockRef,
    ) -> Result<(), ActorError> {
        match self
            .plasma
            .advance_l1_origin(self.l1.as_ref(), head.id())
            .await
        {
            Ok(()) => {}
            Err(PlasmaError::ReorgRequired) => {
                warn!(block_number = head.number, "L1 reorg detected, resetting derivation state");
                self.reset();
            }
            Err(source) => {
                return Err(ActorError::AdvanceOrigin {
                    block_number: head.number,
                    source,
                })
            }
        }

        self.run_follow_ups(cancel, head.number).await?;
        self.schedule_unlocks(head.number).await;
        self.schedule_withdraw(head.number).await;

        let mut commitments = CommitmentSource::new(self.sources.open(&head)?);
        while let Some(commitment) = commitments.next().await? {
            let decision = self.evaluate(&head, &commitment).await;
            self.apply(cancel, head.number, head, commitment, decision, None)
                .await?;
        }
        Ok(())
    }

    /// Spawns the actor loop. It stops when `parent` is cancelled, on [`ActorHandle::close`] or
    /// after a fatal error.
    pub fn start(self, parent: &CancellationToken) -> ActorHandle {
        let cancel = parent.child_token();
        let (sender, inbox) = mpsc::channel(1);
        let last_acted = self.last_acted.clone();
        let handle = tokio::spawn(self.run(inbox, cancel.clone()));
        ActorHandle {
            signal: FinalizedSignal { sender },
            cancel,
            worker: Mutex::new(Some(handle)),
            last_acted,
        }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<L1BlockRef>, cancel: CancellationToken) {
        loop {
            let head = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = inbox.recv() => match next {
                    Some(head) => head,
                    None => break,
                },
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.process_finalized(&cancel, head) => result,
            };
            match result {
                Ok(()) => debug!(block_number = head.number, "Processed finalized block"),
                Err(ActorError::Cancelled) => break,
                Err(err) if err.is_fatal() => {
                    error!(block_number = head.number, err = ?err, "Stopping DA challenge actor");
                    break;
                }
                Err(err) => {
                    error!(block_number = head.number, err = ?err, "Failed to process finalized block")
                }
            }
        }
        debug!("DA challenge actor stopped");
    }

    fn reset(&mut self) {
        self.follow_ups.clear();
        self.unlocks.clear();
    }

    async fn evaluate(&self, block: &L1BlockRef, commitment: &CommitmentData) -> Decision {
        match self
            .plasma
            .get_input(self.l1.as_ref(), commitment, block)
            .await
        {
            Ok(blob) => {
                if self.schedulers.resolve.is_none() {
                    return Decision::Nothing;
                }
                let status = self.plasma.get_challenge_status(commitment, block.number);
                if status != ChallengeStatus::Active {
                    return Decision::Nothing;
                }
                Decision::Act(Action::Resolve(ResolveData {
                    arg: CommitmentArg::new(block.number, commitment),
                    blob,
                }))
            }
            Err(PlasmaError::PendingChallenge) if self.schedulers.challenge.is_some() => {
                Decision::Act(Action::Challenge(CommitmentArg::new(
                    block.number,
                    commitment,
                )))
            }
            Err(PlasmaError::Other(err)) => {
                warn!(
                    block_number = block.number,
                    commitment = %hex::encode(commitment.encode()),
                    err = ?err,
                    "Failed to fetch input"
                );
                Decision::Retry
            }
            Err(outcome) => {
                debug!(
                    block_number = block.number,
                    commitment = %hex::encode(commitment.encode()),
                    %outcome,
                    "Nothing to do for commitment"
                );
                Decision::Nothing
            }
        }
    }

    async fn apply(
        &mut self,
        cancel: &CancellationToken,
        head: u64,
        block: L1BlockRef,
        commitment: CommitmentData,
        decision: Decision,
        previous_deadline: Option<u64>,
    ) -> Result<(), ActorError> {
        match decision {
            Decision::Nothing => Ok(()),
            Decision::Retry => {
                let deadline =
                    previous_deadline.unwrap_or_else(|| self.config.resolve_deadline(block.number));
                self.follow_ups.track(head, block, commitment, deadline);
                Ok(())
            }
            Decision::Act(action) => self.act(cancel, head, block, commitment, action).await,
        }
    }

    /// Hands `action` to its scheduler.
    ///
    /// Only undelivered actions are re-evaluated later. A delivered action is never scheduled
    /// again for the same commitment.
    async fn act(
        &mut self,
        cancel: &CancellationToken,
        head: u64,
        block: L1BlockRef,
        commitment: CommitmentData,
        action: Action,
    ) -> Result<(), ActorError> {
        let is_challenge = matches!(action, Action::Challenge(_));
        info!(
            block_number = block.number,
            commitment = %action.commitment(),
            challenge = is_challenge,
            "Scheduling DA challenge action"
        );
        let (enqueued, deadline) = match action {
            Action::Challenge(arg) => {
                let Some(scheduler) = self.schedulers.challenge.clone() else {
                    return Ok(());
                };
                let enqueued = schedule(cancel, &scheduler, block.number, arg).await;
                (enqueued, self.config.challenge_deadline(block.number))
            }
            Action::Resolve(data) => {
                let Some(scheduler) = self.schedulers.resolve.clone() else {
                    return Ok(());
                };
                let enqueued = schedule(cancel, &scheduler, block.number, data).await;
                (enqueued, self.config.resolve_deadline(block.number))
            }
        };

        match enqueued {
            Ok(Enqueued::Queued) => {
                self.record_acted(block.number);
                if is_challenge && self.schedulers.unlock.is_some() {
                    self.unlocks.insert(
                        block.number,
                        &commitment,
                        self.config.resolve_deadline(block.number),
                    );
                }
                Ok(())
            }
            Ok(Enqueued::Dropped) => {
                self.follow_ups.track(head, block, commitment, deadline);
                Ok(())
            }
            Err(ActorError::Scheduler(err)) => {
                error!(block_number = block.number, err = ?err, "Failed to schedule action");
                self.follow_ups.track(head, block, commitment, deadline);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn run_follow_ups(
        &mut self,
        cancel: &CancellationToken,
        head: u64,
    ) -> Result<(), ActorError> {
        for follow_up in self.follow_ups.due(head) {
            debug!(
                block_number = follow_up.block.number,
                commitment = %hex::encode(follow_up.commitment.encode()),
                head,
                "Re-evaluating commitment"
            );
            let decision = self.evaluate(&follow_up.block, &follow_up.commitment).await;
            self.apply(
                cancel,
                head,
                follow_up.block,
                follow_up.commitment,
                decision,
                Some(follow_up.deadline),
            )
            .await?;
        }
        Ok(())
    }

    async fn schedule_unlocks(&mut self, head: u64) {
        let Some(scheduler) = self.schedulers.unlock.clone() else {
            return;
        };
        for (block_number, arg) in self.unlocks.eligible(head) {
            match scheduler.schedule(block_number, arg.clone()).await {
                Ok(Enqueued::Queued) => self.unlocks.remove(block_number, &arg),
                // The mailbox is full, later bonds wait for the next block.
                Ok(Enqueued::Dropped) => break,
                Err(err) => {
                    error!(block_number, err = ?err, "Failed to schedule bond unlock");
                    break;
                }
            }
        }
    }

    async fn schedule_withdraw(&self, head: u64) {
        if let Some(scheduler) = &self.schedulers.withdraw {
            if let Err(err) = scheduler.schedule(head, head).await {
                error!(block_number = head, err = ?err, "Failed to schedule withdrawal");
            }
        }
    }

    fn record_acted(&self, block_number: u64) {
        self.last_acted.fetch_max(block_number, Ordering::Relaxed);
        self.metrics.record_last_acted_l1_block(block_number);
    }
}

async fn schedule<E: Executor>(
    cancel: &CancellationToken,
    scheduler: &ActionScheduler<E>,
    block_number: u64,
    job: E::Job,
) -> Result<Enqueued, ActorError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ActorError::Cancelled),
        enqueued = scheduler.schedule(block_number, job) => Ok(enqueued?),
    }
}

/// Delivers finalized blocks to a running actor. Cheap to clone.
#[derive(Clone)]
pub struct FinalizedSignal {
    sender: mpsc::Sender<L1BlockRef>,
}

impl FinalizedSignal {
    /// Hands `head` to the actor, waiting until it is accepted or `cancel` fires.
    ///
    /// Returns `false` if the block was not delivered.
    pub async fn send(&self, cancel: &CancellationToken, head: L1BlockRef) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = self.sender.send(head) => sent.is_ok(),
        }
    }
}

/// A running [`Actor`].
pub struct ActorHandle {
    signal: FinalizedSignal,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    last_acted: Arc<AtomicU64>,
}

impl ActorHandle {
    /// Notifies the actor of a new finalized block. See [`FinalizedSignal::send`].
    pub async fn on_new_l1_finalized(&self, cancel: &CancellationToken, head: L1BlockRef) -> bool {
        self.signal.send(cancel, head).await
    }

    /// A sender for finalized blocks that can outlive a borrow of the handle.
    pub fn signal(&self) -> FinalizedSignal {
        self.signal.clone()
    }

    /// Highest L1 block an action was scheduled for.
    pub fn last_acted_l1_block(&self) -> u64 {
        self.last_acted.load(Ordering::Relaxed)
    }

    /// Stops the actor loop and waits for it to exit.
    pub async fn close(&self) {
        self.cancel.cancel();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = worker {
            if let Err(err) = handle.await {
                error!(?err, "DA challenge actor panicked");
            }
        }
    }
}
