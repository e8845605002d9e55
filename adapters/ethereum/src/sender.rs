use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use dac_challenge_interface::services::TxSender;
use dac_challenge_interface::{Address, TxCandidate};
use ethers_core::types::{TransactionRequest, U64};
use ethers_providers::Middleware;
use tracing::{debug, info};

/// Submits candidates through a signing middleware and waits for them to be confirmed.
///
/// Nonces, gas pricing and signing are left to the middleware stack.
#[derive(Debug)]
pub struct MiddlewareTxSender<M> {
    client: Arc<M>,
    from: Address,
    confirmations: usize,
}

impl<M: Middleware> MiddlewareTxSender<M> {
    /// Sends as the middleware's default sender.
    pub fn new(client: Arc<M>, confirmations: usize) -> anyhow::Result<Self> {
        let from = client
            .default_sender()
            .context("middleware has no default sender, a signer is required")?;
        Ok(Self {
            client,
            from,
            confirmations,
        })
    }
}

#[async_trait]
impl<M> TxSender for MiddlewareTxSender<M>
where
    M: Middleware + 'static,
{
    fn from(&self) -> Address {
        self.from
    }

    async fn send_and_wait_simple(
        &self,
        purpose: &str,
        candidates: Vec<TxCandidate>,
    ) -> anyhow::Result<()> {
        for candidate in candidates {
            let mut request = TransactionRequest::new()
                .from(self.from)
                .data(candidate.tx_data)
                .value(candidate.value);
            if let Some(to) = candidate.to {
                request = request.to(to);
            }
            if candidate.gas_limit > 0 {
                request = request.gas(candidate.gas_limit);
            }

            let pending = self
                .client
                .send_transaction(request, None)
                .await
                .map_err(anyhow::Error::new)
                .with_context(|| format!("failed to send {purpose} transaction"))?;
            let tx_hash = pending.tx_hash();
            debug!(purpose, ?tx_hash, "Sent transaction, waiting for confirmation");

            let receipt = pending
                .confirmations(self.confirmations)
                .await
                .with_context(|| format!("failed to confirm {purpose} transaction {tx_hash:?}"))?
                .with_context(|| format!("{purpose} transaction {tx_hash:?} was dropped"))?;
            if receipt.status != Some(U64::one()) {
                bail!("{purpose} transaction {tx_hash:?} reverted");
            }
            info!(
                purpose,
                ?tx_hash,
                block_number = ?receipt.block_number,
                "Transaction confirmed"
            );
        }
        Ok(())
    }
}
