//! Capability traits over the on-chain challenge contract.
//!
//! Each write capability wraps one contract call and returns a [`TxCandidate`] that the
//! transaction sender submits. Executors depend only on the capability they need, so a contract
//! registry can hand out different implementations per commitment type.

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, U256};
use thiserror::Error;

use crate::{Challenge, ChallengeStatus, CommitmentArg, TxCandidate};

/// Errors returned by contract bindings.
#[derive(Debug, Error)]
pub enum ContractError {
    /// Simulating the call reverted. For `unlockBond` this means the bond is still locked.
    #[error("simulation of {method} failed: {reason}")]
    SimulationFailed {
        /// Contract method that was simulated.
        method: &'static str,
        /// Revert reason reported by the node.
        reason: String,
    },
    /// The deployed contract reports a version this binding does not understand.
    #[error("unrecognized version for challenge contract {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version reported by the contract.
        found: String,
        /// Version supported by the binding.
        expected: &'static str,
    },
    /// The call returned data that could not be decoded.
    #[error("failed to decode {method} output: {reason}")]
    Decode {
        /// Contract method whose output was decoded.
        method: &'static str,
        /// What went wrong.
        reason: String,
    },
    /// ABI encoding failed.
    #[error("failed to encode {method} call: {reason}")]
    Encode {
        /// Contract method being encoded.
        method: &'static str,
        /// What went wrong.
        reason: String,
    },
    /// Transport or node failure.
    #[error("call to {method} failed")]
    Call {
        /// Contract method being called.
        method: &'static str,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

/// Read access to bond accounting.
#[async_trait]
pub trait BondQueries: Send + Sync {
    /// Bond required to open a challenge.
    async fn bond_size(&self) -> Result<U256, ContractError>;

    /// Balance deposited on the contract by `addr`.
    async fn balance(&self, addr: Address) -> Result<U256, ContractError>;
}

/// Opens challenges.
#[async_trait]
pub trait ChallengeContract: BondQueries {
    /// Builds a `challenge` transaction for the commitment.
    async fn challenge(&self, arg: &CommitmentArg) -> Result<TxCandidate, ContractError>;

    /// Builds a `deposit` transaction carrying `value` wei.
    fn deposit(&self, value: U256) -> Result<TxCandidate, ContractError>;
}

/// Resolves challenges.
#[async_trait]
pub trait ResolveContract: Send + Sync {
    /// Builds a `resolve` transaction supplying `blob` for the challenged commitment.
    async fn resolve(&self, arg: &CommitmentArg, blob: &Bytes)
        -> Result<TxCandidate, ContractError>;
}

/// Unlocks bonds of finished challenges.
#[async_trait]
pub trait UnlockContract: Send + Sync {
    /// Builds an `unlockBond` transaction.
    ///
    /// Returns [`ContractError::SimulationFailed`] while the bond is not yet unlockable.
    async fn unlock_bond(&self, arg: &CommitmentArg) -> Result<TxCandidate, ContractError>;
}

/// Withdraws unlocked balances.
#[async_trait]
pub trait WithdrawContract: BondQueries {
    /// Builds a `withdraw` transaction for the sender's whole balance.
    async fn withdraw(&self) -> Result<TxCandidate, ContractError>;
}

/// Read-only queries against the challenge contract.
#[async_trait]
pub trait ChallengeQueries: Send + Sync {
    /// Number of blocks after a commitment during which it can be challenged.
    async fn challenge_window(&self) -> Result<U256, ContractError>;

    /// Number of blocks after a challenge during which it can be resolved.
    async fn resolve_window(&self) -> Result<U256, ContractError>;

    /// The challenge record for `arg`. Missing records come back zeroed.
    async fn get_challenge(&self, arg: &CommitmentArg) -> Result<Challenge, ContractError>;

    /// Status of the challenge as of the latest L1 block.
    async fn get_challenge_status(
        &self,
        arg: &CommitmentArg,
    ) -> Result<ChallengeStatus, ContractError>;

    /// Whether the contract accepts `commitment` as well formed.
    async fn validate_commitment(&self, commitment: &Bytes) -> Result<bool, ContractError>;
}

/// The full surface of a challenge contract binding.
pub trait DaChallengeContract:
    ChallengeContract + ResolveContract + UnlockContract + WithdrawContract + ChallengeQueries
{
}

impl<T> DaChallengeContract for T where
    T: ChallengeContract + ResolveContract + UnlockContract + WithdrawContract + ChallengeQueries
{
}
