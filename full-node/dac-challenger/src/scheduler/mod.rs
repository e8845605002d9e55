//! Single-slot mailboxes in front of the executors.
//!
//! Each scheduler owns one worker task that runs its executor for one job at a time. Results
//! are recorded as metrics and logged, never returned to whoever scheduled the job.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::executor::{
    ActionKind, Challenger, ExecutionOutcome, Executor, Resolver, Unlocker, Withdrawer,
};
use crate::metrics::{ActionResult, Metricer};

/// Schedules challenges. Never drops.
pub type ChallengeScheduler = ActionScheduler<Challenger>;
/// Schedules resolves. Never drops.
pub type ResolveScheduler = ActionScheduler<Resolver>;
/// Schedules bond unlocks. Drops while busy.
pub type BondUnlockScheduler = ActionScheduler<Unlocker>;
/// Schedules withdrawals. Drops while busy.
pub type WithdrawScheduler = ActionScheduler<Withdrawer>;

/// What [`ActionScheduler::schedule`] does when the mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxPolicy {
    /// Wait until the worker takes the pending job.
    Block,
    /// Discard the new job.
    DropIfBusy,
}

/// Result of a successful [`ActionScheduler::schedule`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The job is in the mailbox.
    Queued,
    /// The mailbox was full and the job was discarded.
    Dropped,
}

/// Errors returned by [`ActionScheduler::schedule`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The worker has exited, nothing will ever take the job.
    #[error("{0} scheduler is closed")]
    Closed(ActionKind),
}

struct Scheduled<J> {
    block_number: u64,
    job: J,
}

enum Worker<E: Executor> {
    Idle {
        executor: E,
        inbox: mpsc::Receiver<Scheduled<E::Job>>,
    },
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Closed,
}

/// Feeds one executor through a mailbox of capacity one.
pub struct ActionScheduler<E: Executor> {
    policy: MailboxPolicy,
    mailbox: mpsc::Sender<Scheduled<E::Job>>,
    metrics: Arc<dyn Metricer>,
    worker: Mutex<Worker<E>>,
}

impl ChallengeScheduler {
    /// A blocking scheduler for challenges.
    pub fn challenges(executor: Challenger, metrics: Arc<dyn Metricer>) -> Self {
        Self::new(executor, MailboxPolicy::Block, metrics)
    }
}

impl ResolveScheduler {
    /// A blocking scheduler for resolves.
    pub fn resolves(executor: Resolver, metrics: Arc<dyn Metricer>) -> Self {
        Self::new(executor, MailboxPolicy::Block, metrics)
    }
}

impl BondUnlockScheduler {
    /// A dropping scheduler for bond unlocks.
    pub fn unlocks(executor: Unlocker, metrics: Arc<dyn Metricer>) -> Self {
        Self::new(executor, MailboxPolicy::DropIfBusy, metrics)
    }
}

impl WithdrawScheduler {
    /// A dropping scheduler for withdrawals.
    pub fn withdrawals(executor: Withdrawer, metrics: Arc<dyn Metricer>) -> Self {
        Self::new(executor, MailboxPolicy::DropIfBusy, metrics)
    }
}

impl<E: Executor> ActionScheduler<E> {
    /// Creates a stopped scheduler. Jobs can be queued before [`ActionScheduler::start`], up to
    /// the mailbox capacity.
    pub fn new(executor: E, policy: MailboxPolicy, metrics: Arc<dyn Metricer>) -> Self {
        let (mailbox, inbox) = mpsc::channel(1);
        Self {
            policy,
            mailbox,
            metrics,
            worker: Mutex::new(Worker::Idle { executor, inbox }),
        }
    }

    /// The mailbox policy of this scheduler.
    pub fn policy(&self) -> MailboxPolicy {
        self.policy
    }

    /// Spawns the worker. The worker stops when `parent` is cancelled or on
    /// [`ActionScheduler::close`]. Calling this twice has no effect.
    pub fn start(&self, parent: &CancellationToken) {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        match std::mem::replace(&mut *worker, Worker::Closed) {
            Worker::Idle { executor, inbox } => {
                let cancel = parent.child_token();
                let handle = tokio::spawn(run(
                    executor,
                    inbox,
                    self.metrics.clone(),
                    cancel.clone(),
                ));
                *worker = Worker::Running { cancel, handle };
            }
            other => {
                warn!(kind = %E::KIND, "Scheduler already started");
                *worker = other;
            }
        }
    }

    /// Stops the worker and waits for it to exit. An in-flight execution is abandoned.
    ///
    /// No executor runs after this returns, and later [`ActionScheduler::schedule`] calls
    /// fail with [`SchedulerError::Closed`].
    pub async fn close(&self) {
        let previous = {
            let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *worker, Worker::Closed)
        };
        if let Worker::Running { cancel, handle } = previous {
            cancel.cancel();
            if let Err(err) = handle.await {
                error!(kind = %E::KIND, ?err, "Scheduler worker panicked");
            }
        }
    }

    /// Places `job` in the mailbox according to the scheduler's policy.
    pub async fn schedule(&self, block_number: u64, job: E::Job) -> Result<Enqueued, SchedulerError> {
        let item = Scheduled { block_number, job };
        match self.policy {
            MailboxPolicy::Block => self
                .mailbox
                .send(item)
                .await
                .map(|()| Enqueued::Queued)
                .map_err(|_| SchedulerError::Closed(E::KIND)),
            MailboxPolicy::DropIfBusy => match self.mailbox.try_send(item) {
                Ok(()) => Ok(Enqueued::Queued),
                Err(TrySendError::Full(item)) => {
                    debug!(
                        kind = %E::KIND,
                        block_number = item.block_number,
                        "Skipping action while another one is in progress"
                    );
                    self.metrics.record_action(E::KIND, ActionResult::Dropped);
                    Ok(Enqueued::Dropped)
                }
                Err(TrySendError::Closed(_)) => Err(SchedulerError::Closed(E::KIND)),
            },
        }
    }
}

async fn run<E: Executor>(
    executor: E,
    mut inbox: mpsc::Receiver<Scheduled<E::Job>>,
    metrics: Arc<dyn Metricer>,
    cancel: CancellationToken,
) {
    loop {
        let Scheduled { block_number, job } = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = inbox.recv() => match next {
                Some(scheduled) => scheduled,
                None => break,
            },
        };

        let description = job.to_string();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(kind = %E::KIND, block_number, job = %description, "Shutdown interrupted action");
                break;
            }
            result = executor.execute(job) => result,
        };

        match result {
            Ok(ExecutionOutcome::Submitted) => {
                metrics.record_action(E::KIND, ActionResult::Succeeded);
            }
            Ok(ExecutionOutcome::Skipped) => {
                metrics.record_action(E::KIND, ActionResult::Skipped);
            }
            Err(err) => {
                metrics.record_action(E::KIND, ActionResult::Failed);
                error!(
                    kind = %E::KIND,
                    block_number,
                    job = %description,
                    err = ?err,
                    "Failed to execute action"
                );
            }
        }
    }
    debug!(kind = %E::KIND, "Scheduler worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use dac_challenge_interface::mocks::{MockDaChallengeContract, MockTxSender};
    use dac_challenge_interface::{Address, CommitmentArg, CommitmentData, H256};

    use super::*;
    use crate::executor::UNLOCK_PURPOSE;
    use crate::metrics::NoopMetrics;

    #[derive(Default)]
    struct RecordingMetrics {
        actions: Mutex<Vec<(ActionKind, ActionResult)>>,
    }

    impl RecordingMetrics {
        fn actions(&self) -> Vec<(ActionKind, ActionResult)> {
            self.actions.lock().unwrap().clone()
        }
    }

    impl Metricer for RecordingMetrics {
        fn record_action(&self, kind: ActionKind, result: ActionResult) {
            self.actions.lock().unwrap().push((kind, result));
        }

        fn record_last_acted_l1_block(&self, _block_number: u64) {}
    }

    /// Counts executions. Each execution waits for a permit from `gate`.
    struct GatedExecutor {
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl Executor for GatedExecutor {
        type Job = u64;

        const KIND: ActionKind = ActionKind::Withdraw;

        async fn execute(&self, _job: u64) -> anyhow::Result<ExecutionOutcome> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await?.forget();
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionOutcome::Submitted)
        }
    }

    struct Harness {
        scheduler: Arc<ActionScheduler<GatedExecutor>>,
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
    }

    fn harness(policy: MailboxPolicy) -> Harness {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let executor = GatedExecutor {
            started: started.clone(),
            finished: finished.clone(),
            gate: gate.clone(),
        };
        Harness {
            scheduler: Arc::new(ActionScheduler::new(
                executor,
                policy,
                Arc::new(NoopMetrics),
            )),
            started,
            finished,
            gate,
        }
    }

    async fn wait_until(counter: &AtomicUsize, value: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < value {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("counter did not reach the expected value");
    }

    #[tokio::test]
    async fn blocking_schedule_waits_for_dequeue() {
        let h = harness(MailboxPolicy::Block);

        assert_eq!(h.scheduler.schedule(1, 1).await, Ok(Enqueued::Queued));

        let scheduler = h.scheduler.clone();
        let mut second = tokio::spawn(async move { scheduler.schedule(2, 2).await });
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut second)
                .await
                .is_err(),
            "second schedule returned before the first job was taken"
        );

        let cancel = CancellationToken::new();
        h.scheduler.start(&cancel);

        assert_eq!(second.await.unwrap(), Ok(Enqueued::Queued));
        wait_until(&h.started, 1).await;

        h.gate.add_permits(2);
        wait_until(&h.finished, 2).await;
        h.scheduler.close().await;
    }

    #[tokio::test]
    async fn dropping_schedule_discards_while_busy() {
        let h = harness(MailboxPolicy::DropIfBusy);

        assert_eq!(h.scheduler.schedule(1, 1).await, Ok(Enqueued::Queued));
        assert_eq!(h.scheduler.schedule(2, 2).await, Ok(Enqueued::Dropped));

        let cancel = CancellationToken::new();
        h.scheduler.start(&cancel);
        h.gate.add_permits(10);
        wait_until(&h.finished, 1).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.started.load(Ordering::SeqCst), 1);
        h.scheduler.close().await;
    }

    #[tokio::test]
    async fn no_execution_after_close() {
        let h = harness(MailboxPolicy::Block);
        let cancel = CancellationToken::new();
        h.scheduler.start(&cancel);

        h.scheduler.schedule(1, 1).await.unwrap();
        wait_until(&h.started, 1).await;

        h.scheduler.close().await;
        h.gate.add_permits(10);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(h.finished.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.scheduler.schedule(2, 2).await,
            Err(SchedulerError::Closed(ActionKind::Withdraw))
        );
        assert_eq!(h.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parent_cancellation_stops_worker() {
        let h = harness(MailboxPolicy::DropIfBusy);
        let cancel = CancellationToken::new();
        h.scheduler.start(&cancel);

        cancel.cancel();
        h.scheduler.close().await;

        assert_eq!(
            h.scheduler.schedule(1, 1).await,
            Err(SchedulerError::Closed(ActionKind::Withdraw))
        );
    }

    async fn wait_for_records(metrics: &RecordingMetrics, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.actions().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("outcome was not recorded");
    }

    #[tokio::test]
    async fn records_the_outcome_of_every_unlock() {
        let contract = Arc::new(MockDaChallengeContract::new(Address::repeat_byte(2), 10, 20));
        let sender = Arc::new(MockTxSender::new(Address::repeat_byte(1)));
        let metrics = Arc::new(RecordingMetrics::default());
        let scheduler = BondUnlockScheduler::unlocks(
            Unlocker::new(contract.clone(), sender.clone()),
            metrics.clone(),
        );
        let cancel = CancellationToken::new();
        scheduler.start(&cancel);
        let arg = |byte: u8| CommitmentArg::new(100, &CommitmentData::Keccak256(H256([byte; 32])));

        contract.set_bond_locked(true);
        assert_eq!(scheduler.schedule(100, arg(1)).await, Ok(Enqueued::Queued));
        wait_for_records(&metrics, 1).await;
        assert!(sender.sent().is_empty());

        contract.set_bond_locked(false);
        assert_eq!(scheduler.schedule(100, arg(2)).await, Ok(Enqueued::Queued));
        wait_for_records(&metrics, 2).await;
        assert_eq!(sender.purposes(), vec![UNLOCK_PURPOSE.to_string()]);

        contract.set_failing(true);
        assert_eq!(scheduler.schedule(100, arg(3)).await, Ok(Enqueued::Queued));
        wait_for_records(&metrics, 3).await;

        assert_eq!(
            metrics.actions(),
            vec![
                (ActionKind::Unlock, ActionResult::Skipped),
                (ActionKind::Unlock, ActionResult::Succeeded),
                (ActionKind::Unlock, ActionResult::Failed),
            ]
        );
        scheduler.close().await;
    }

    #[tokio::test]
    async fn dropped_jobs_are_recorded() {
        let metrics = Arc::new(RecordingMetrics::default());
        let h = harness(MailboxPolicy::DropIfBusy);
        let scheduler = ActionScheduler::new(
            GatedExecutor {
                started: h.started.clone(),
                finished: h.finished.clone(),
                gate: h.gate.clone(),
            },
            MailboxPolicy::DropIfBusy,
            metrics.clone(),
        );

        scheduler.schedule(1, 1).await.unwrap();
        scheduler.schedule(2, 2).await.unwrap();

        assert_eq!(
            metrics.actions(),
            vec![(ActionKind::Withdraw, ActionResult::Dropped)]
        );
    }
}
