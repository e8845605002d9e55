use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dac_challenge_interface::contracts::ChallengeContract;
use dac_challenge_interface::services::TxSender;
use dac_challenge_interface::CommitmentArg;
use tracing::debug;

use super::{ActionKind, ExecutionOutcome, Executor, CHALLENGE_PURPOSE};

/// Opens challenges, depositing the missing part of the bond first.
pub struct Challenger {
    contract: Arc<dyn ChallengeContract>,
    sender: Arc<dyn TxSender>,
}

impl Challenger {
    /// Challenges through `contract`, sending as `sender`.
    pub fn new(contract: Arc<dyn ChallengeContract>, sender: Arc<dyn TxSender>) -> Self {
        Self { contract, sender }
    }
}

#[async_trait]
impl Executor for Challenger {
    type Job = CommitmentArg;

    const KIND: ActionKind = ActionKind::Challenge;

    async fn execute(&self, commitment: CommitmentArg) -> anyhow::Result<ExecutionOutcome> {
        debug!(%commitment, "Attempting to challenge commitment");

        let bond_size = self
            .contract
            .bond_size()
            .await
            .context("failed to read bond size")?;
        let balance = self
            .contract
            .balance(self.sender.from())
            .await
            .context("failed to read bond balance")?;

        let mut candidates = Vec::with_capacity(2);
        if balance < bond_size {
            let top_up = bond_size - balance;
            debug!(%balance, %bond_size, "Depositing missing bond");
            candidates.push(
                self.contract
                    .deposit(top_up)
                    .context("failed to create candidate deposit tx")?,
            );
        }
        candidates.push(
            self.contract
                .challenge(&commitment)
                .await
                .context("failed to create candidate challenge tx")?,
        );

        self.sender
            .send_and_wait_simple(CHALLENGE_PURPOSE, candidates)
            .await
            .context("failed to challenge da commitment")?;
        Ok(ExecutionOutcome::Submitted)
    }
}
