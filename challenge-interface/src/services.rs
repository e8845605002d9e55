//! Traits for the external collaborators of the coordinator.
//! None of them are implemented by the coordinator itself.

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256};
use thiserror::Error;

use crate::{BlockId, ChallengeStatus, CommitmentData, L1BlockRef, TxCandidate};

/// Submits transactions and blocks until they are confirmed.
///
/// Implementations own nonce management, gas pricing and resubmission, and must be safe to
/// share between the scheduler workers.
#[async_trait]
pub trait TxSender: Send + Sync {
    /// Account the transactions are sent from.
    fn from(&self) -> Address;

    /// Sends `candidates` in order and waits for all of them to land.
    /// `purpose` is a human readable label used for logging.
    async fn send_and_wait_simple(
        &self,
        purpose: &str,
        candidates: Vec<TxCandidate>,
    ) -> anyhow::Result<()>;
}

/// Outcomes of the DA input fetcher. Everything except [`PlasmaError::Other`] is an expected
/// domain result that drives a coordinator decision.
#[derive(Debug, Error)]
pub enum PlasmaError {
    /// The fetcher saw an L1 reorg and its tracked state must be rebuilt.
    #[error("reorg required")]
    ReorgRequired,
    /// The input is missing and a challenge for it is already open.
    #[error("challenge in progress")]
    ActiveChallenge,
    /// The input is missing and nobody has challenged it yet.
    #[error("input is missing and not yet challenged")]
    PendingChallenge,
    /// The input was challenged and the challenge expired.
    #[error("challenge expired")]
    ExpiredChallenge,
    /// The input is missing and the challenge window has passed.
    #[error("input is missing past the challenge window")]
    MissingPastWindow,
    /// Any other failure, e.g. an unreachable DA server.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors returned by an [`L1Fetcher`].
#[derive(Debug, Error)]
pub enum L1FetchError {
    /// The node does not know the requested block.
    #[error("block {0:?} not found")]
    NotFound(H256),
    /// Transport or node failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An L1 transaction, reduced to what the batch inbox filters need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L1Transaction {
    /// Transaction hash.
    pub hash: H256,
    /// Recovered sender.
    pub from: Address,
    /// Recipient, `None` for contract creation.
    pub to: Option<Address>,
    /// Calldata.
    pub input: Bytes,
    /// Versioned hashes of attached blobs. Empty for non-blob transactions.
    pub blob_versioned_hashes: Vec<H256>,
}

/// Reads blocks from L1.
#[async_trait]
pub trait L1Fetcher: Send + Sync {
    /// Transactions of the block with the given hash, in block order.
    async fn txs_by_hash(&self, hash: H256) -> Result<Vec<L1Transaction>, L1FetchError>;
}

/// A blob versioned hash together with its position among the block's blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedBlobHash {
    /// Position of the blob within the block.
    pub index: u64,
    /// Versioned hash of the blob.
    pub hash: H256,
}

/// Retrieves blob sidecars, e.g. from a beacon node.
#[async_trait]
pub trait BlobsFetcher: Send + Sync {
    /// Returns the decoded data of each requested blob, in request order.
    async fn get_blobs(
        &self,
        block: &L1BlockRef,
        hashes: &[IndexedBlobHash],
    ) -> anyhow::Result<Vec<Bytes>>;
}

/// The DA-provider side of the plasma derivation: tracks challenge state per L1 origin and
/// retrieves committed inputs.
#[async_trait]
pub trait PlasmaInputFetcher: Send + Sync {
    /// Advances the tracked L1 origin to `block`, syncing challenge events up to it.
    /// Returns [`PlasmaError::ReorgRequired`] when the tracked state is no longer canonical.
    async fn advance_l1_origin(&self, l1: &dyn L1Fetcher, block: BlockId)
        -> Result<(), PlasmaError>;

    /// Fetches the input behind `commitment`, posted in `block`.
    async fn get_input(
        &self,
        l1: &dyn L1Fetcher,
        commitment: &CommitmentData,
        block: &L1BlockRef,
    ) -> Result<Bytes, PlasmaError>;

    /// Status of the challenge for `commitment`, posted at `block_number`, as tracked locally.
    fn get_challenge_status(&self, commitment: &CommitmentData, block_number: u64)
        -> ChallengeStatus;
}

/// Source of the latest finalized L1 block.
#[async_trait]
pub trait FinalizedHeadSource: Send + Sync {
    /// The latest finalized block.
    async fn finalized_ref(&self) -> anyhow::Result<L1BlockRef>;
}
