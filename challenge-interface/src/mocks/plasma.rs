use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers_core::types::Bytes;

use crate::services::{L1Fetcher, PlasmaError, PlasmaInputFetcher};
use crate::{BlockId, ChallengeStatus, CommitmentData, L1BlockRef};

/// Scripted result of [`PlasmaInputFetcher::get_input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockInput {
    /// The input is available.
    Data(Bytes),
    /// Missing, already challenged.
    ActiveChallenge,
    /// Missing, not challenged yet.
    PendingChallenge,
    /// Challenge expired.
    ExpiredChallenge,
    /// Missing past the challenge window.
    MissingPastWindow,
    /// Infrastructure failure.
    Failure(String),
}

impl MockInput {
    fn into_result(self) -> Result<Bytes, PlasmaError> {
        match self {
            MockInput::Data(data) => Ok(data),
            MockInput::ActiveChallenge => Err(PlasmaError::ActiveChallenge),
            MockInput::PendingChallenge => Err(PlasmaError::PendingChallenge),
            MockInput::ExpiredChallenge => Err(PlasmaError::ExpiredChallenge),
            MockInput::MissingPastWindow => Err(PlasmaError::MissingPastWindow),
            MockInput::Failure(reason) => Err(PlasmaError::Other(anyhow::anyhow!(reason))),
        }
    }
}

#[derive(Default)]
struct State {
    inputs: HashMap<CommitmentData, MockInput>,
    statuses: HashMap<CommitmentData, ChallengeStatus>,
    advance_results: VecDeque<Result<(), MockAdvance>>,
    advanced: Vec<BlockId>,
    fetched: Vec<(CommitmentData, u64)>,
}

#[derive(Debug, Clone, Copy)]
enum MockAdvance {
    Reorg,
    Failure,
}

/// A DA input fetcher answering from scripted tables.
///
/// Unknown commitments are missing and unchallenged; unknown statuses are
/// [`ChallengeStatus::Uninitialized`].
#[derive(Default)]
pub struct MockPlasmaFetcher {
    state: Mutex<State>,
}

impl MockPlasmaFetcher {
    /// Creates an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result of fetching `commitment`.
    pub fn set_input(&self, commitment: CommitmentData, input: MockInput) {
        self.state.lock().unwrap().inputs.insert(commitment, input);
    }

    /// Scripts the challenge status of `commitment`.
    pub fn set_status(&self, commitment: CommitmentData, status: ChallengeStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(commitment, status);
    }

    /// Makes the next `advance_l1_origin` call report a reorg.
    pub fn push_reorg(&self) {
        self.state
            .lock()
            .unwrap()
            .advance_results
            .push_back(Err(MockAdvance::Reorg));
    }

    /// Makes the next `advance_l1_origin` call fail.
    pub fn push_advance_failure(&self) {
        self.state
            .lock()
            .unwrap()
            .advance_results
            .push_back(Err(MockAdvance::Failure));
    }

    /// Blocks the origin was advanced to, in order.
    pub fn advanced(&self) -> Vec<BlockId> {
        self.state.lock().unwrap().advanced.clone()
    }

    /// Commitments fetched so far with the block number they were fetched for.
    pub fn fetched(&self) -> Vec<(CommitmentData, u64)> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl PlasmaInputFetcher for MockPlasmaFetcher {
    async fn advance_l1_origin(
        &self,
        _l1: &dyn L1Fetcher,
        block: BlockId,
    ) -> Result<(), PlasmaError> {
        let mut state = self.state.lock().unwrap();
        state.advanced.push(block);
        match state.advance_results.pop_front() {
            None | Some(Ok(())) => Ok(()),
            Some(Err(MockAdvance::Reorg)) => Err(PlasmaError::ReorgRequired),
            Some(Err(MockAdvance::Failure)) => {
                Err(PlasmaError::Other(anyhow::anyhow!("origin advance failed")))
            }
        }
    }

    async fn get_input(
        &self,
        _l1: &dyn L1Fetcher,
        commitment: &CommitmentData,
        block: &L1BlockRef,
    ) -> Result<Bytes, PlasmaError> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push((commitment.clone(), block.number));
        state
            .inputs
            .get(commitment)
            .cloned()
            .unwrap_or(MockInput::PendingChallenge)
            .into_result()
    }

    fn get_challenge_status(
        &self,
        commitment: &CommitmentData,
        _block_number: u64,
    ) -> ChallengeStatus {
        self.state
            .lock()
            .unwrap()
            .statuses
            .get(commitment)
            .copied()
            .unwrap_or(ChallengeStatus::Uninitialized)
    }
}
