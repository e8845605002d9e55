use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use dac_challenge_interface::{Address, CommitmentKind, CommitmentType};
use ethers_providers::{Http, Provider};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::source::RollupConfig;

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

/// Re-evaluation interval used when none is configured.
pub const DEFAULT_RETRY_INTERVAL_BLOCKS: u64 = 16;

/// Challenger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChallengerConfig {
    /// L1 JSON-RPC endpoint.
    pub l1_rpc_url: String,
    /// Address of the DA challenge contract.
    pub da_challenge_address: Address,
    /// Address batches are posted to.
    pub batch_inbox_address: Address,
    /// Batchers whose commitments are watched. All other senders are ignored.
    pub batcher_addresses: Vec<Address>,
    /// Activation time of blob batches, if scheduled.
    #[serde(default)]
    pub ecotone_time: Option<u64>,
    /// Commitment codec used by the rollup.
    pub commitment_type: CommitmentType,
    /// Backend of generic commitments.
    #[serde(default)]
    pub commitment_kind: CommitmentKind,
    /// Open challenges for missing data.
    #[serde(default = "enabled")]
    pub challenge_enabled: bool,
    /// Resolve challenges with retrieved data.
    #[serde(default = "enabled")]
    pub resolve_enabled: bool,
    /// Unlock and withdraw bonds.
    #[serde(default = "enabled")]
    pub bond_management_enabled: bool,
    /// Milliseconds between finalized head polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Finalized blocks between re-evaluations of a commitment. Zero disables them.
    #[serde(default = "default_retry_interval_blocks")]
    pub retry_interval_blocks: u64,
    /// Confirmations to wait for after each transaction.
    #[serde(default = "default_num_confirmations")]
    pub num_confirmations: usize,
    /// Account the L1 node signs transactions for. Required by
    /// [`ServiceDeps::from_config`](crate::ServiceDeps::from_config).
    #[serde(default)]
    pub sender_address: Option<Address>,
}

fn enabled() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_retry_interval_blocks() -> u64 {
    DEFAULT_RETRY_INTERVAL_BLOCKS
}

fn default_num_confirmations() -> usize {
    1
}

/// Problems found by [`ChallengerConfig::check`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `l1_rpc_url` is empty.
    #[error("missing l1 eth rpc url")]
    MissingL1EthRpc,
    /// `batch_inbox_address` is zero.
    #[error("missing batch inbox address")]
    MissingBatchInboxAddress,
    /// `da_challenge_address` is zero.
    #[error("missing da challenge contract address")]
    MissingDaChallengeAddress,
    /// `batcher_addresses` is empty.
    #[error("missing batcher addresses")]
    MissingBatcherAddresses,
    /// Generic commitments without a kind.
    #[error("missing generic da challenge kind")]
    MissingDaCommitmentKind,
    /// `poll_interval_ms` is zero.
    #[error("poll interval must not be 0")]
    ZeroPollInterval,
    /// Both `challenge_enabled` and `resolve_enabled` are off.
    #[error("at least one of challenging and resolving must be enabled")]
    NothingEnabled,
}

impl ChallengerConfig {
    /// Rejects configurations the service cannot run with.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.l1_rpc_url.is_empty() {
            return Err(ConfigError::MissingL1EthRpc);
        }
        if self.batch_inbox_address.is_zero() {
            return Err(ConfigError::MissingBatchInboxAddress);
        }
        if self.da_challenge_address.is_zero() {
            return Err(ConfigError::MissingDaChallengeAddress);
        }
        if self.batcher_addresses.is_empty() {
            return Err(ConfigError::MissingBatcherAddresses);
        }
        if self.commitment_type == CommitmentType::Generic
            && self.commitment_kind == CommitmentKind::Undefined
        {
            return Err(ConfigError::MissingDaCommitmentKind);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if !self.challenge_enabled && !self.resolve_enabled {
            return Err(ConfigError::NothingEnabled);
        }
        Ok(())
    }

    /// Finalized head poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// An HTTP client for `l1_rpc_url` that sends as `sender_address`, if set.
    pub fn l1_client(&self) -> anyhow::Result<Provider<Http>> {
        let provider = Provider::<Http>::try_from(self.l1_rpc_url.as_str())
            .with_context(|| format!("invalid l1 rpc url {}", self.l1_rpc_url))?;
        Ok(match self.sender_address {
            Some(sender) => provider.with_sender(sender),
            None => provider,
        })
    }

    /// Where the batch data is found on L1.
    pub fn rollup_config(&self) -> RollupConfig {
        RollupConfig {
            batch_inbox_address: self.batch_inbox_address,
            batcher_addresses: self.batcher_addresses.clone(),
            ecotone_time: self.ecotone_time,
        }
    }
}

/// Reads a TOML file into `R`.
pub fn from_toml_path<P: AsRef<Path>, R: DeserializeOwned>(path: P) -> anyhow::Result<R> {
    let path = path.as_ref();
    let mut contents = String::new();
    {
        let mut file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        file.read_to_string(&mut contents)?;
    }

    let result: R = toml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::str::FromStr;

    use ethers_providers::Middleware;
    use tempfile::NamedTempFile;

    use super::*;

    fn create_config_from(content: &str) -> NamedTempFile {
        let mut config_file = NamedTempFile::new().unwrap();
        config_file.write_all(content.as_bytes()).unwrap();
        config_file
    }

    fn address(s: &str) -> Address {
        Address::from_str(s).unwrap()
    }

    #[test]
    fn test_correct_config() {
        let config = r#"
            l1_rpc_url = "http://localhost:8545"
            da_challenge_address = "0x6e3c9cb6da9a6e7b3f7cab29e32dd7e0d8c1b7a4"
            batch_inbox_address = "0xff00000000000000000000000000000000000901"
            batcher_addresses = ["0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc"]
            commitment_type = "keccak256"
            ecotone_time = 1706634000
            resolve_enabled = false
            num_confirmations = 3
            sender_address = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
        "#;

        let config_file = create_config_from(config);

        let config: ChallengerConfig = from_toml_path(config_file.path()).unwrap();
        let expected = ChallengerConfig {
            l1_rpc_url: "http://localhost:8545".to_string(),
            da_challenge_address: address("0x6e3c9cb6da9a6e7b3f7cab29e32dd7e0d8c1b7a4"),
            batch_inbox_address: address("0xff00000000000000000000000000000000000901"),
            batcher_addresses: vec![address("0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc")],
            ecotone_time: Some(1706634000),
            commitment_type: CommitmentType::Keccak256,
            commitment_kind: CommitmentKind::Undefined,
            challenge_enabled: true,
            resolve_enabled: false,
            bond_management_enabled: true,
            poll_interval_ms: 12_000,
            retry_interval_blocks: DEFAULT_RETRY_INTERVAL_BLOCKS,
            num_confirmations: 3,
            sender_address: Some(address("0x70997970c51812dc3a010c7d01b50e0d17dc79c8")),
        };
        assert_eq!(config, expected);
        assert_eq!(config.check(), Ok(()));
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_check_rejects_incomplete_config() {
        let config = r#"
            l1_rpc_url = "http://localhost:8545"
            da_challenge_address = "0x6e3c9cb6da9a6e7b3f7cab29e32dd7e0d8c1b7a4"
            batch_inbox_address = "0xff00000000000000000000000000000000000901"
            batcher_addresses = ["0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc"]
            commitment_type = "generic"
        "#;
        let config_file = create_config_from(config);
        let mut config: ChallengerConfig = from_toml_path(config_file.path()).unwrap();

        assert_eq!(config.check(), Err(ConfigError::MissingDaCommitmentKind));

        config.commitment_kind = CommitmentKind::EigenDA;
        assert_eq!(config.check(), Ok(()));

        config.batch_inbox_address = Address::zero();
        assert_eq!(config.check(), Err(ConfigError::MissingBatchInboxAddress));
    }

    #[test]
    fn test_l1_client_uses_configured_endpoint_and_sender() {
        let config_file = create_config_from(
            r#"
            l1_rpc_url = "http://localhost:8545"
            da_challenge_address = "0x6e3c9cb6da9a6e7b3f7cab29e32dd7e0d8c1b7a4"
            batch_inbox_address = "0xff00000000000000000000000000000000000901"
            batcher_addresses = ["0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc"]
            commitment_type = "keccak256"
            sender_address = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
        "#,
        );
        let mut config: ChallengerConfig = from_toml_path(config_file.path()).unwrap();

        let client = config.l1_client().unwrap();
        assert_eq!(client.url().as_str(), "http://localhost:8545/");
        assert_eq!(
            client.default_sender(),
            Some(address("0x70997970c51812dc3a010c7d01b50e0d17dc79c8"))
        );

        config.l1_rpc_url = "not a url".to_string();
        assert!(config.l1_client().is_err());
    }

    #[test]
    fn test_unknown_commitment_type_is_rejected() {
        let config = r#"
            l1_rpc_url = "http://localhost:8545"
            da_challenge_address = "0x6e3c9cb6da9a6e7b3f7cab29e32dd7e0d8c1b7a4"
            batch_inbox_address = "0xff00000000000000000000000000000000000901"
            batcher_addresses = []
            commitment_type = "sha256"
        "#;
        let config_file = create_config_from(config);

        assert!(from_toml_path::<_, ChallengerConfig>(config_file.path()).is_err());
    }
}
