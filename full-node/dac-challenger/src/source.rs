//! Extracts batch inbox data from finalized L1 blocks and decodes the DA commitments in it.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dac_challenge_interface::services::{
    BlobsFetcher, IndexedBlobHash, L1FetchError, L1Fetcher, L1Transaction,
};
use dac_challenge_interface::{Address, Bytes, CommitmentData, L1BlockRef, TX_DATA_VERSION_1};
use thiserror::Error;
use tracing::{trace, warn};

/// Errors raised while reading a block's batch data.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The block is no longer known to the node. Derivation has to restart.
    #[error("failed to fetch block {0:?}, derivation must be reset")]
    Reset(dac_challenge_interface::H256),
    /// Fetching failed but may succeed later.
    #[error("temporary failure while reading batch data")]
    Temporary(#[source] anyhow::Error),
    /// An entry without even a version byte.
    #[error("not enough data")]
    NotEnoughData,
    /// Blob extraction is required at this block but no blob fetcher was configured.
    #[error("ecotone upgrade active at block {0} but beacon endpoint not configured")]
    MissingBlobsFetcher(u64),
}

impl From<L1FetchError> for DataSourceError {
    fn from(err: L1FetchError) -> Self {
        match err {
            L1FetchError::NotFound(hash) => DataSourceError::Reset(hash),
            L1FetchError::Other(err) => DataSourceError::Temporary(err),
        }
    }
}

/// Yields the batch inbox entries of one block, in transaction order.
#[async_trait]
pub trait DataIter: Send {
    /// The next entry, or `None` once the block is exhausted.
    async fn next(&mut self) -> Result<Option<Bytes>, DataSourceError>;
}

/// The parts of the rollup configuration needed to find batch data on L1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupConfig {
    /// Address batches are sent to.
    pub batch_inbox_address: Address,
    /// Accounts allowed to post batches.
    pub batcher_addresses: Vec<Address>,
    /// Activation time of blob batches. `None` if never active.
    pub ecotone_time: Option<u64>,
}

impl RollupConfig {
    /// Whether blob batches are active at `time`.
    pub fn is_ecotone(&self, time: u64) -> bool {
        self.ecotone_time.is_some_and(|activation| time >= activation)
    }

    fn is_batch(&self, tx: &L1Transaction) -> bool {
        tx.to == Some(self.batch_inbox_address) && self.batcher_addresses.contains(&tx.from)
    }
}

/// Opens the right [`DataIter`] for a block.
#[derive(Clone)]
pub struct DataSourceFactory {
    config: Arc<RollupConfig>,
    l1: Arc<dyn L1Fetcher>,
    blobs: Option<Arc<dyn BlobsFetcher>>,
}

impl DataSourceFactory {
    /// Reads blocks through `l1` and, once blob batches are active, blobs through `blobs`.
    pub fn new(
        config: RollupConfig,
        l1: Arc<dyn L1Fetcher>,
        blobs: Option<Arc<dyn BlobsFetcher>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            l1,
            blobs,
        }
    }

    /// The configuration sources are opened with.
    pub fn config(&self) -> &RollupConfig {
        &self.config
    }

    /// A source over the batch data of `block`.
    ///
    /// Fails with [`DataSourceError::MissingBlobsFetcher`] if blobs are needed and no fetcher is
    /// available. Nothing is fetched until the first call to [`DataIter::next`].
    pub fn open(&self, block: &L1BlockRef) -> Result<Box<dyn DataIter>, DataSourceError> {
        if self.config.is_ecotone(block.time) {
            let blobs = self
                .blobs
                .clone()
                .ok_or(DataSourceError::MissingBlobsFetcher(block.number))?;
            Ok(Box::new(BlobDataSource {
                config: self.config.clone(),
                l1: self.l1.clone(),
                blobs,
                block: *block,
                data: None,
            }))
        } else {
            Ok(Box::new(CalldataSource {
                config: self.config.clone(),
                l1: self.l1.clone(),
                block: *block,
                data: None,
            }))
        }
    }
}

/// Batch data carried in transaction calldata.
pub struct CalldataSource {
    config: Arc<RollupConfig>,
    l1: Arc<dyn L1Fetcher>,
    block: L1BlockRef,
    data: Option<VecDeque<Bytes>>,
}

#[async_trait]
impl DataIter for CalldataSource {
    async fn next(&mut self) -> Result<Option<Bytes>, DataSourceError> {
        if self.data.is_none() {
            let txs = self.l1.txs_by_hash(self.block.hash).await?;
            let data: VecDeque<Bytes> = txs
                .into_iter()
                .filter(|tx| self.config.is_batch(tx))
                .map(|tx| tx.input)
                .collect();
            trace!(block_number = self.block.number, entries = data.len(), "Loaded calldata batches");
            self.data = Some(data);
        }
        Ok(self.data.as_mut().and_then(VecDeque::pop_front))
    }
}

enum BlobEntry {
    Calldata(Bytes),
    Blob(usize),
}

/// Batch data carried in blobs, plus calldata batches of non-blob transactions.
pub struct BlobDataSource {
    config: Arc<RollupConfig>,
    l1: Arc<dyn L1Fetcher>,
    blobs: Arc<dyn BlobsFetcher>,
    block: L1BlockRef,
    data: Option<VecDeque<Bytes>>,
}

impl BlobDataSource {
    async fn load(&self) -> Result<VecDeque<Bytes>, DataSourceError> {
        let txs = self.l1.txs_by_hash(self.block.hash).await?;

        let mut entries = Vec::new();
        let mut hashes = Vec::new();
        // Indices count every blob in the block, not only those sent to the inbox.
        let mut blob_index = 0u64;
        for tx in txs {
            let is_batch = self.config.is_batch(&tx);
            if tx.blob_versioned_hashes.is_empty() {
                if is_batch {
                    entries.push(BlobEntry::Calldata(tx.input));
                }
                continue;
            }
            if is_batch && !tx.input.is_empty() {
                warn!(tx = ?tx.hash, "Blob tx has calldata, which will be ignored");
            }
            for hash in tx.blob_versioned_hashes {
                if is_batch {
                    entries.push(BlobEntry::Blob(hashes.len()));
                    hashes.push(IndexedBlobHash {
                        index: blob_index,
                        hash,
                    });
                }
                blob_index += 1;
            }
        }

        let mut blobs = if hashes.is_empty() {
            Vec::new()
        } else {
            self.blobs
                .get_blobs(&self.block, &hashes)
                .await
                .map_err(DataSourceError::Temporary)?
        };
        if blobs.len() != hashes.len() {
            return Err(DataSourceError::Temporary(anyhow::anyhow!(
                "requested {} blobs but received {}",
                hashes.len(),
                blobs.len()
            )));
        }

        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                BlobEntry::Calldata(data) => data,
                BlobEntry::Blob(i) => std::mem::take(&mut blobs[i]),
            })
            .collect())
    }
}

#[async_trait]
impl DataIter for BlobDataSource {
    async fn next(&mut self) -> Result<Option<Bytes>, DataSourceError> {
        if self.data.is_none() {
            let data = self.load().await?;
            trace!(block_number = self.block.number, entries = data.len(), "Loaded blob batches");
            self.data = Some(data);
        }
        Ok(self.data.as_mut().and_then(VecDeque::pop_front))
    }
}

/// Decodes the DA commitments out of a block's batch data.
pub struct CommitmentSource {
    inner: Box<dyn DataIter>,
}

impl CommitmentSource {
    /// Wraps `inner`.
    pub fn new(inner: Box<dyn DataIter>) -> Self {
        Self { inner }
    }

    /// The next commitment, or `None` once the block is exhausted.
    ///
    /// Entries without the DA version byte are plain batches and are skipped, as are
    /// commitments that fail to decode.
    pub async fn next(&mut self) -> Result<Option<CommitmentData>, DataSourceError> {
        loop {
            let Some(data) = self.inner.next().await? else {
                return Ok(None);
            };
            let Some((version, encoded)) = data.split_first() else {
                return Err(DataSourceError::NotEnoughData);
            };
            if *version != TX_DATA_VERSION_1 {
                continue;
            }
            match CommitmentData::decode(encoded) {
                Ok(commitment) => return Ok(Some(commitment)),
                Err(err) => {
                    warn!(commitment = %hex::encode(encoded), %err, "Invalid commitment");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dac_challenge_interface::mocks::{MockBlobsFetcher, MockL1Fetcher};
    use dac_challenge_interface::H256;

    use super::*;

    fn inbox() -> Address {
        Address::repeat_byte(0x1b)
    }

    fn batcher() -> Address {
        Address::repeat_byte(0xba)
    }

    fn config(ecotone_time: Option<u64>) -> RollupConfig {
        RollupConfig {
            batch_inbox_address: inbox(),
            batcher_addresses: vec![batcher()],
            ecotone_time,
        }
    }

    fn block(time: u64) -> L1BlockRef {
        L1BlockRef {
            hash: H256::repeat_byte(0x42),
            number: 100,
            parent_hash: H256::repeat_byte(0x41),
            time,
        }
    }

    fn tx(from: Address, to: Address, input: &[u8]) -> L1Transaction {
        L1Transaction {
            from,
            to: Some(to),
            input: Bytes::from(input.to_vec()),
            ..Default::default()
        }
    }

    async fn drain(iter: &mut dyn DataIter) -> Vec<Bytes> {
        let mut out = vec![];
        while let Some(data) = iter.next().await.unwrap() {
            out.push(data);
        }
        out
    }

    #[tokio::test]
    async fn calldata_keeps_batcher_txs_to_inbox() {
        let l1 = Arc::new(MockL1Fetcher::new());
        let stranger = Address::repeat_byte(0x05);
        l1.insert_block(
            H256::repeat_byte(0x42),
            vec![
                tx(batcher(), inbox(), b"one"),
                tx(stranger, inbox(), b"spam"),
                tx(batcher(), stranger, b"other"),
                tx(batcher(), inbox(), b"two"),
            ],
        );
        let factory = DataSourceFactory::new(config(None), l1, None);

        let mut source = factory.open(&block(1_000)).unwrap();

        assert_eq!(
            drain(source.as_mut()).await,
            vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]
        );
    }

    #[tokio::test]
    async fn unknown_block_requires_reset() {
        let factory = DataSourceFactory::new(config(None), Arc::new(MockL1Fetcher::new()), None);

        let mut source = factory.open(&block(1_000)).unwrap();

        assert!(matches!(
            source.next().await,
            Err(DataSourceError::Reset(_))
        ));
    }

    #[test]
    fn blobs_without_fetcher_are_fatal() {
        let factory = DataSourceFactory::new(config(Some(500)), Arc::new(MockL1Fetcher::new()), None);

        assert!(matches!(
            factory.open(&block(1_000)),
            Err(DataSourceError::MissingBlobsFetcher(100))
        ));
        assert!(factory.open(&block(499)).is_ok());
    }

    #[tokio::test]
    async fn blob_source_interleaves_calldata_and_blobs() {
        let l1 = Arc::new(MockL1Fetcher::new());
        let blobs = Arc::new(MockBlobsFetcher::new());
        let foreign_blob = L1Transaction {
            blob_versioned_hashes: vec![H256::repeat_byte(0xf0)],
            ..tx(Address::repeat_byte(0x07), Address::repeat_byte(0x08), b"")
        };
        let batch_blob = L1Transaction {
            blob_versioned_hashes: vec![H256::repeat_byte(0xb1), H256::repeat_byte(0xb2)],
            ..tx(batcher(), inbox(), b"")
        };
        l1.insert_block(
            H256::repeat_byte(0x42),
            vec![tx(batcher(), inbox(), b"calldata"), foreign_blob, batch_blob],
        );
        blobs.insert_blob(H256::repeat_byte(0xb1), Bytes::from_static(b"blob-1"));
        blobs.insert_blob(H256::repeat_byte(0xb2), Bytes::from_static(b"blob-2"));
        let factory = DataSourceFactory::new(config(Some(500)), l1, Some(blobs));

        let mut source = factory.open(&block(1_000)).unwrap();

        assert_eq!(
            drain(source.as_mut()).await,
            vec![
                Bytes::from_static(b"calldata"),
                Bytes::from_static(b"blob-1"),
                Bytes::from_static(b"blob-2"),
            ]
        );
    }

    struct Entries(VecDeque<Bytes>);

    #[async_trait]
    impl DataIter for Entries {
        async fn next(&mut self) -> Result<Option<Bytes>, DataSourceError> {
            Ok(self.0.pop_front())
        }
    }

    fn entry(version: u8, payload: &[u8]) -> Bytes {
        let mut data = vec![version];
        data.extend_from_slice(payload);
        Bytes::from(data)
    }

    #[tokio::test]
    async fn commitments_skip_plain_batches_and_garbage() {
        let commitment = CommitmentData::Keccak256(H256::repeat_byte(0x09));
        let entries = vec![
            entry(0x00, b"frame"),
            entry(TX_DATA_VERSION_1, &[0x00, 0x01, 0x02]),
            entry(TX_DATA_VERSION_1, &commitment.encode()),
        ];
        let mut source = CommitmentSource::new(Box::new(Entries(entries.into())));

        assert_eq!(source.next().await.unwrap(), Some(commitment));
        assert_eq!(source.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_entry_is_not_enough_data() {
        let mut source = CommitmentSource::new(Box::new(Entries(vec![Bytes::new()].into())));

        assert!(matches!(
            source.next().await,
            Err(DataSourceError::NotEnoughData)
        ));
    }
}
