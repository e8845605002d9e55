use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers_core::types::{Bytes, H256};

use crate::services::{
    BlobsFetcher, FinalizedHeadSource, IndexedBlobHash, L1FetchError, L1Fetcher, L1Transaction,
};
use crate::L1BlockRef;

/// Serves transactions of pre-registered blocks. Unknown blocks are reported as not found.
#[derive(Default)]
pub struct MockL1Fetcher {
    blocks: Mutex<HashMap<H256, Vec<L1Transaction>>>,
}

impl MockL1Fetcher {
    /// Creates a fetcher without blocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the transactions of block `hash`.
    pub fn insert_block(&self, hash: H256, txs: Vec<L1Transaction>) {
        self.blocks.lock().unwrap().insert(hash, txs);
    }
}

#[async_trait]
impl L1Fetcher for MockL1Fetcher {
    async fn txs_by_hash(&self, hash: H256) -> Result<Vec<L1Transaction>, L1FetchError> {
        self.blocks
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or(L1FetchError::NotFound(hash))
    }
}

/// Serves blob data keyed by versioned hash.
#[derive(Default)]
pub struct MockBlobsFetcher {
    blobs: Mutex<HashMap<H256, Bytes>>,
}

impl MockBlobsFetcher {
    /// Creates a fetcher without blobs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the data of the blob with versioned hash `hash`.
    pub fn insert_blob(&self, hash: H256, data: Bytes) {
        self.blobs.lock().unwrap().insert(hash, data);
    }
}

#[async_trait]
impl BlobsFetcher for MockBlobsFetcher {
    async fn get_blobs(
        &self,
        block: &L1BlockRef,
        hashes: &[IndexedBlobHash],
    ) -> anyhow::Result<Vec<Bytes>> {
        let blobs = self.blobs.lock().unwrap();
        hashes
            .iter()
            .map(|h| {
                blobs.get(&h.hash).cloned().ok_or_else(|| {
                    anyhow::anyhow!("blob {:?} missing in block {}", h.hash, block.number)
                })
            })
            .collect()
    }
}

/// Replays a list of finalized refs, repeating the last one once exhausted.
#[derive(Default)]
pub struct MockFinalizedHeadSource {
    refs: Mutex<VecDeque<L1BlockRef>>,
}

impl MockFinalizedHeadSource {
    /// Creates a source that replays `refs`.
    pub fn new(refs: Vec<L1BlockRef>) -> Self {
        Self {
            refs: Mutex::new(refs.into()),
        }
    }
}

#[async_trait]
impl FinalizedHeadSource for MockFinalizedHeadSource {
    async fn finalized_ref(&self) -> anyhow::Result<L1BlockRef> {
        let mut refs = self.refs.lock().unwrap();
        if refs.len() > 1 {
            return refs.pop_front().ok_or_else(|| anyhow::anyhow!("no finalized ref"));
        }
        refs.front()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no finalized ref"))
    }
}
