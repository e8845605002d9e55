use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dac_challenge_interface::contracts::ResolveContract;
use dac_challenge_interface::services::TxSender;
use dac_challenge_interface::ResolveData;
use tracing::debug;

use super::{ActionKind, ExecutionOutcome, Executor, RESOLVE_PURPOSE};

/// Supplies the data of actively challenged commitments.
pub struct Resolver {
    contract: Arc<dyn ResolveContract>,
    sender: Arc<dyn TxSender>,
}

impl Resolver {
    /// Resolves through `contract`, sending as `sender`.
    pub fn new(contract: Arc<dyn ResolveContract>, sender: Arc<dyn TxSender>) -> Self {
        Self { contract, sender }
    }
}

#[async_trait]
impl Executor for Resolver {
    type Job = ResolveData;

    const KIND: ActionKind = ActionKind::Resolve;

    async fn execute(&self, data: ResolveData) -> anyhow::Result<ExecutionOutcome> {
        debug!(commitment = %data.arg, blob_len = data.blob.len(), "Attempting to resolve challenge");

        let candidate = self
            .contract
            .resolve(&data.arg, &data.blob)
            .await
            .context("failed to create candidate resolve tx")?;
        self.sender
            .send_and_wait_simple(RESOLVE_PURPOSE, vec![candidate])
            .await
            .context("failed to resolve da challenge")?;
        Ok(ExecutionOutcome::Submitted)
    }
}
