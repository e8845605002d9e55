use std::sync::Arc;

use dac_challenge_interface::contracts::ContractError;
use dac_challenge_interface::services::{
    BlobsFetcher, FinalizedHeadSource, L1Fetcher, PlasmaInputFetcher, TxSender,
};
use dac_challenge_interface::U256;
use dac_ethereum_adapter::{EthersL1Fetcher, MiddlewareTxSender};
use ethers_providers::Middleware;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::actor::{Actor, ActorConfig, ActorError, ActorHandle, Schedulers};
use crate::config::{ChallengerConfig, ConfigError};
use crate::executor::{Challenger, Resolver, Unlocker, Withdrawer};
use crate::metrics::Metricer;
use crate::poller::FinalizedHeadPoller;
use crate::registry::{ContractRegistry, RegistryError};
use crate::scheduler::{
    BondUnlockScheduler, ChallengeScheduler, ResolveScheduler, WithdrawScheduler,
};
use crate::source::DataSourceFactory;

/// External collaborators of the service.
#[derive(Clone)]
pub struct ServiceDeps {
    /// Submits the transactions.
    pub sender: Arc<dyn TxSender>,
    /// Fetches DA inputs and tracks challenge state.
    pub plasma: Arc<dyn PlasmaInputFetcher>,
    /// Reads L1 blocks.
    pub l1: Arc<dyn L1Fetcher>,
    /// Reads blobs. Required once blob batches are active.
    pub blobs: Option<Arc<dyn BlobsFetcher>>,
    /// Reports the finalized L1 head.
    pub head: Arc<dyn FinalizedHeadSource>,
    /// Receives metrics.
    pub metrics: Arc<dyn Metricer>,
}

impl ServiceDeps {
    /// Uses `client` for L1 reads, the finalized head and transaction submission.
    ///
    /// `client` must be able to sign for its default sender.
    pub fn ethereum<M: Middleware + 'static>(
        client: Arc<M>,
        num_confirmations: usize,
        plasma: Arc<dyn PlasmaInputFetcher>,
        blobs: Option<Arc<dyn BlobsFetcher>>,
        metrics: Arc<dyn Metricer>,
    ) -> anyhow::Result<Self> {
        let l1 = EthersL1Fetcher::new(client.clone());
        let sender = MiddlewareTxSender::new(client, num_confirmations)?;
        Ok(Self {
            sender: Arc::new(sender),
            plasma,
            l1: Arc::new(l1.clone()),
            blobs,
            head: Arc::new(l1),
            metrics,
        })
    }

    /// Talks to `l1_rpc_url` over HTTP, sending as `sender_address` and waiting for
    /// `num_confirmations` after each transaction.
    ///
    /// The L1 node has to sign for `sender_address`. Wrap a client in a signing middleware and
    /// use [`ServiceDeps::ethereum`] otherwise.
    pub fn from_config(
        config: &ChallengerConfig,
        plasma: Arc<dyn PlasmaInputFetcher>,
        blobs: Option<Arc<dyn BlobsFetcher>>,
        metrics: Arc<dyn Metricer>,
    ) -> anyhow::Result<Self> {
        let client = Arc::new(config.l1_client()?);
        Self::ethereum(client, config.num_confirmations, plasma, blobs, metrics)
    }
}

/// Errors raised while building or starting the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configuration is incomplete.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    /// No usable contract binding.
    #[error("failed to create da challenge contract")]
    Registry(#[from] RegistryError),
    /// Reading a protocol parameter failed.
    #[error("failed to read protocol parameters")]
    Contract(#[from] ContractError),
    /// A protocol window does not fit into a block number.
    #[error("{name} {value} is out of range")]
    WindowOutOfRange {
        /// Which window.
        name: &'static str,
        /// The value reported by the contract.
        value: U256,
    },
    /// The actor rejected its setup.
    #[error("failed to create actor")]
    Actor(#[from] ActorError),
    /// [`ChallengerService::start`] was called twice.
    #[error("challenger service was already started")]
    AlreadyStarted,
}

struct Running {
    cancel: CancellationToken,
    poller_cancel: CancellationToken,
    poller: JoinHandle<()>,
    actor: ActorHandle,
}

/// The assembled challenger: poller, actor and schedulers.
pub struct ChallengerService {
    config: ChallengerConfig,
    head: Arc<dyn FinalizedHeadSource>,
    schedulers: Schedulers,
    actor: Option<Actor>,
    running: Option<Running>,
}

impl ChallengerService {
    /// Binds the contract through `registry` and wires executors, schedulers and the actor.
    pub async fn new(
        config: ChallengerConfig,
        registry: &ContractRegistry,
        deps: ServiceDeps,
    ) -> Result<Self, ServiceError> {
        config.check()?;

        let contracts = registry
            .build_contracts(
                config.commitment_type,
                config.commitment_kind,
                config.da_challenge_address,
            )
            .await?;
        let actor_config = ActorConfig {
            challenge_window: window(
                "challenge window",
                contracts.queries.challenge_window().await?,
            )?,
            resolve_window: window("resolve window", contracts.queries.resolve_window().await?)?,
            retry_interval_blocks: config.retry_interval_blocks,
        };

        let metrics = deps.metrics;
        let sender = deps.sender;
        let schedulers = Schedulers {
            challenge: config.challenge_enabled.then(|| {
                Arc::new(ChallengeScheduler::challenges(
                    Challenger::new(contracts.challenge.clone(), sender.clone()),
                    metrics.clone(),
                ))
            }),
            resolve: config.resolve_enabled.then(|| {
                Arc::new(ResolveScheduler::resolves(
                    Resolver::new(contracts.resolve.clone(), sender.clone()),
                    metrics.clone(),
                ))
            }),
            unlock: (config.bond_management_enabled && config.challenge_enabled).then(|| {
                Arc::new(BondUnlockScheduler::unlocks(
                    Unlocker::new(contracts.unlock.clone(), sender.clone()),
                    metrics.clone(),
                ))
            }),
            withdraw: config.bond_management_enabled.then(|| {
                Arc::new(WithdrawScheduler::withdrawals(
                    Withdrawer::new(contracts.withdraw.clone(), sender.clone()),
                    metrics.clone(),
                ))
            }),
        };

        let sources = DataSourceFactory::new(config.rollup_config(), deps.l1.clone(), deps.blobs);
        let actor = Actor::new(
            schedulers.clone(),
            deps.plasma,
            deps.l1,
            sources,
            metrics,
            actor_config,
        )?;

        info!(
            contract = ?config.da_challenge_address,
            sender = ?sender.from(),
            challenge_window = actor_config.challenge_window,
            resolve_window = actor_config.resolve_window,
            "Created DA challenger"
        );
        Ok(Self {
            config,
            head: deps.head,
            schedulers,
            actor: Some(actor),
            running: None,
        })
    }

    /// Starts the schedulers, the actor and the finalized head poller under `parent`.
    pub fn start(&mut self, parent: &CancellationToken) -> Result<(), ServiceError> {
        let actor = self.actor.take().ok_or(ServiceError::AlreadyStarted)?;
        let cancel = parent.child_token();

        if let Some(scheduler) = &self.schedulers.challenge {
            scheduler.start(&cancel);
        }
        if let Some(scheduler) = &self.schedulers.resolve {
            scheduler.start(&cancel);
        }
        if let Some(scheduler) = &self.schedulers.unlock {
            scheduler.start(&cancel);
        }
        if let Some(scheduler) = &self.schedulers.withdraw {
            scheduler.start(&cancel);
        }
        let actor = actor.start(&cancel);

        let poller_cancel = cancel.child_token();
        let poller = FinalizedHeadPoller::new(
            self.head.clone(),
            actor.signal(),
            self.config.poll_interval(),
        )
        .start(poller_cancel.clone());

        info!("Challenger service started");
        self.running = Some(Running {
            cancel,
            poller_cancel,
            poller,
            actor,
        });
        Ok(())
    }

    /// Highest L1 block an action was scheduled for, zero if none or not started.
    pub fn last_acted_l1_block(&self) -> u64 {
        self.running
            .as_ref()
            .map_or(0, |running| running.actor.last_acted_l1_block())
    }

    /// Stops the poller, then the actor, then every scheduler, waiting for each to exit.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        info!("Stopping challenger service");

        running.poller_cancel.cancel();
        if let Err(err) = running.poller.await {
            error!(?err, "Finalized head poller panicked");
        }
        running.actor.close().await;

        if let Some(scheduler) = &self.schedulers.challenge {
            scheduler.close().await;
        }
        if let Some(scheduler) = &self.schedulers.resolve {
            scheduler.close().await;
        }
        if let Some(scheduler) = &self.schedulers.unlock {
            scheduler.close().await;
        }
        if let Some(scheduler) = &self.schedulers.withdraw {
            scheduler.close().await;
        }
        running.cancel.cancel();
        info!("Challenger service stopped");
    }
}

fn window(name: &'static str, value: U256) -> Result<u64, ServiceError> {
    if value > U256::from(u64::MAX) {
        return Err(ServiceError::WindowOutOfRange { name, value });
    }
    Ok(value.as_u64())
}

#[cfg(test)]
mod tests {
    use dac_challenge_interface::mocks::MockPlasmaFetcher;
    use dac_challenge_interface::{Address, CommitmentKind, CommitmentType};

    use super::*;
    use crate::metrics::NoopMetrics;

    fn config(sender_address: Option<Address>) -> ChallengerConfig {
        ChallengerConfig {
            l1_rpc_url: "http://localhost:8545".to_string(),
            da_challenge_address: Address::repeat_byte(0xdc),
            batch_inbox_address: Address::repeat_byte(0x1b),
            batcher_addresses: vec![Address::repeat_byte(0xba)],
            ecotone_time: None,
            commitment_type: CommitmentType::Keccak256,
            commitment_kind: CommitmentKind::Undefined,
            challenge_enabled: true,
            resolve_enabled: true,
            bond_management_enabled: true,
            poll_interval_ms: 12_000,
            retry_interval_blocks: 16,
            num_confirmations: 2,
            sender_address,
        }
    }

    #[test]
    fn deps_send_as_the_configured_account() {
        let sender = Address::repeat_byte(0x70);

        let deps = ServiceDeps::from_config(
            &config(Some(sender)),
            Arc::new(MockPlasmaFetcher::new()),
            None,
            Arc::new(NoopMetrics),
        )
        .unwrap();

        assert_eq!(deps.sender.from(), sender);
    }

    #[test]
    fn deps_need_a_sender_account() {
        let err = ServiceDeps::from_config(
            &config(None),
            Arc::new(MockPlasmaFetcher::new()),
            None,
            Arc::new(NoopMetrics),
        )
        .err()
        .unwrap();

        assert!(format!("{err:#}").contains("a signer is required"));
    }
}
