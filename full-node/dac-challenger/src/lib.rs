#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod actor;
mod config;
pub mod executor;
mod follow_up;
pub mod metrics;
mod poller;
mod registry;
pub mod scheduler;
mod service;
pub mod source;

pub use actor::{Actor, ActorConfig, ActorError, ActorHandle, FinalizedSignal, Schedulers};
pub use config::{
    from_toml_path, ChallengerConfig, ConfigError, DEFAULT_POLL_INTERVAL,
    DEFAULT_RETRY_INTERVAL_BLOCKS,
};
pub use follow_up::{FollowUp, FollowUps, PendingUnlocks};
pub use poller::{FinalizedHeadPoller, POLL_TIMEOUT};
pub use registry::{
    ContractConstructor, ContractRegistry, ContractRegistryBuilder, Contracts, RegistryError,
};
pub use service::{ChallengerService, ServiceDeps, ServiceError};
