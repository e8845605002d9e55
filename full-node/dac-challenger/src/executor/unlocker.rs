use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dac_challenge_interface::contracts::{ContractError, UnlockContract};
use dac_challenge_interface::services::TxSender;
use dac_challenge_interface::CommitmentArg;
use tracing::debug;

use super::{ActionKind, ExecutionOutcome, Executor, UNLOCK_PURPOSE};

/// Unlocks the bonds of finished challenges.
pub struct Unlocker {
    contract: Arc<dyn UnlockContract>,
    sender: Arc<dyn TxSender>,
}

impl Unlocker {
    /// Unlocks through `contract`, sending as `sender`.
    pub fn new(contract: Arc<dyn UnlockContract>, sender: Arc<dyn TxSender>) -> Self {
        Self { contract, sender }
    }
}

#[async_trait]
impl Executor for Unlocker {
    type Job = CommitmentArg;

    const KIND: ActionKind = ActionKind::Unlock;

    async fn execute(&self, commitment: CommitmentArg) -> anyhow::Result<ExecutionOutcome> {
        debug!(%commitment, "Attempting to unlock bond");

        let candidate = match self.contract.unlock_bond(&commitment).await {
            Ok(candidate) => candidate,
            Err(ContractError::SimulationFailed { .. }) => {
                debug!(%commitment, "Bond is still locked");
                return Ok(ExecutionOutcome::Skipped);
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context("failed to create candidate unlock bond tx"))
            }
        };

        self.sender
            .send_and_wait_simple(UNLOCK_PURPOSE, vec![candidate])
            .await
            .context("failed to unlock bond")?;
        Ok(ExecutionOutcome::Submitted)
    }
}

#[cfg(test)]
mod tests {
    use dac_challenge_interface::mocks::{MockDaChallengeContract, MockTxSender};
    use dac_challenge_interface::{Address, CommitmentData, H256};

    use super::*;

    fn commitment() -> CommitmentArg {
        CommitmentArg::new(100, &CommitmentData::Keccak256(H256([9; 32])))
    }

    #[tokio::test]
    async fn locked_bond_is_not_an_error() {
        let contract = Arc::new(MockDaChallengeContract::new(Address::repeat_byte(2), 10, 20));
        contract.set_bond_locked(true);
        let sender = Arc::new(MockTxSender::new(Address::repeat_byte(1)));
        let unlocker = Unlocker::new(contract, sender.clone());

        let outcome = unlocker.execute(commitment()).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Skipped);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn unlocks_released_bond() {
        let contract = Arc::new(MockDaChallengeContract::new(Address::repeat_byte(2), 10, 20));
        let sender = Arc::new(MockTxSender::new(Address::repeat_byte(1)));
        let unlocker = Unlocker::new(contract, sender.clone());

        let outcome = unlocker.execute(commitment()).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Submitted);
        assert_eq!(sender.purposes(), vec![UNLOCK_PURPOSE.to_string()]);
    }

    #[tokio::test]
    async fn contract_failure_is_an_error() {
        let contract = Arc::new(MockDaChallengeContract::new(Address::repeat_byte(2), 10, 20));
        contract.set_failing(true);
        let sender = Arc::new(MockTxSender::new(Address::repeat_byte(1)));
        let unlocker = Unlocker::new(contract, sender.clone());

        assert!(unlocker.execute(commitment()).await.is_err());
        assert!(sender.sent().is_empty());
    }
}
