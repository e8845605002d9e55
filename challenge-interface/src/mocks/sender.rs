use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers_core::types::Address;
use tokio::sync::Semaphore;

use crate::services::TxSender;
use crate::TxCandidate;

/// One call to [`TxSender::send_and_wait_simple`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBatch {
    /// Purpose label passed by the caller.
    pub purpose: String,
    /// Candidates in submission order.
    pub candidates: Vec<TxCandidate>,
}

/// Records submitted transactions instead of sending them.
///
/// A sender created with [`MockTxSender::gated`] blocks every submission until a permit is
/// released with [`MockTxSender::release`], which lets tests hold a worker mid-flight.
pub struct MockTxSender {
    from: Address,
    sent: Mutex<Vec<SentBatch>>,
    failure: Mutex<Option<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockTxSender {
    /// A sender that confirms every submission immediately.
    pub fn new(from: Address) -> Self {
        Self {
            from,
            sent: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            gate: None,
        }
    }

    /// A sender that waits for [`MockTxSender::release`] before confirming each submission.
    pub fn gated(from: Address) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new(from)
        }
    }

    /// Lets `n` blocked submissions complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Makes every later submission fail with `reason`. `None` restores success.
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock().unwrap() = reason.map(str::to_string);
    }

    /// Everything confirmed so far.
    pub fn sent(&self) -> Vec<SentBatch> {
        self.sent.lock().unwrap().clone()
    }

    /// Purposes of everything confirmed so far.
    pub fn purposes(&self) -> Vec<String> {
        self.sent().into_iter().map(|batch| batch.purpose).collect()
    }
}

#[async_trait]
impl TxSender for MockTxSender {
    fn from(&self) -> Address {
        self.from
    }

    async fn send_and_wait_simple(
        &self,
        purpose: &str,
        candidates: Vec<TxCandidate>,
    ) -> anyhow::Result<()> {
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            anyhow::bail!("{purpose}: {reason}");
        }
        self.sent.lock().unwrap().push(SentBatch {
            purpose: purpose.to_string(),
            candidates,
        });
        Ok(())
    }
}
