use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dac_challenge_interface::contracts::WithdrawContract;
use dac_challenge_interface::services::TxSender;
use tracing::debug;

use super::{ActionKind, ExecutionOutcome, Executor, WITHDRAW_PURPOSE};

/// Withdraws unlocked bonds back to the sender.
///
/// Jobs carry the finalized block number that triggered the withdrawal.
pub struct Withdrawer {
    contract: Arc<dyn WithdrawContract>,
    sender: Arc<dyn TxSender>,
}

impl Withdrawer {
    /// Withdraws through `contract`, sending as `sender`.
    pub fn new(contract: Arc<dyn WithdrawContract>, sender: Arc<dyn TxSender>) -> Self {
        Self { contract, sender }
    }
}

#[async_trait]
impl Executor for Withdrawer {
    type Job = u64;

    const KIND: ActionKind = ActionKind::Withdraw;

    async fn execute(&self, height: u64) -> anyhow::Result<ExecutionOutcome> {
        let balance = self
            .contract
            .balance(self.sender.from())
            .await
            .context("failed to read bond balance")?;
        if balance.is_zero() {
            return Ok(ExecutionOutcome::Skipped);
        }
        debug!(height, %balance, "Attempting to withdraw bonds");

        let candidate = self
            .contract
            .withdraw()
            .await
            .context("failed to create candidate withdraw tx")?;
        self.sender
            .send_and_wait_simple(WITHDRAW_PURPOSE, vec![candidate])
            .await
            .context("failed to withdraw bonds")?;
        Ok(ExecutionOutcome::Submitted)
    }
}
