use std::sync::Arc;

use async_trait::async_trait;
use dac_challenge_interface::{Address, Bytes};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::TransactionRequest;
use ethers_providers::{Middleware, MiddlewareError};
use thiserror::Error;

/// Errors returned by an [`L1Caller`].
#[derive(Debug, Error)]
pub enum CallError {
    /// The call executed and reverted.
    #[error("execution reverted: {0}")]
    Revert(String),
    /// The node could not be reached or returned an unrelated error.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Executes read-only calls against L1 at the latest block.
#[async_trait]
pub trait L1Caller: Send + Sync {
    /// Runs `data` against `to` with `eth_call`, optionally as `from`.
    async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, CallError>;
}

/// An [`L1Caller`] backed by an ethers middleware stack.
#[derive(Debug)]
pub struct EthersCaller<M> {
    client: Arc<M>,
}

impl<M> Clone for EthersCaller<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<M: Middleware> EthersCaller<M> {
    /// Wraps `client`.
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M> L1Caller for EthersCaller<M>
where
    M: Middleware + 'static,
{
    async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, CallError> {
        let mut request = TransactionRequest::new().to(to).data(data);
        if let Some(from) = from {
            request = request.from(from);
        }
        let tx: TypedTransaction = request.into();

        self.client.call(&tx, None).await.map_err(|err| {
            match err.as_error_response() {
                Some(response) if is_revert(response.code, &response.message) => {
                    CallError::Revert(response.message.clone())
                }
                _ => CallError::Transport(anyhow::Error::new(err)),
            }
        })
    }
}

/// Geth reports reverts with code 3, other clients only through the message.
fn is_revert(code: i64, message: &str) -> bool {
    code == 3 || message.contains("revert")
}

#[cfg(test)]
mod tests {
    use super::is_revert;

    #[test]
    fn detects_reverts() {
        assert!(is_revert(3, "execution reverted: ChallengeNotActive"));
        assert!(is_revert(-32000, "execution reverted"));
        assert!(!is_revert(-32000, "header not found"));
    }
}
