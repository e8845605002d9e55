use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dac_challenge_interface::services::{
    FinalizedHeadSource, L1FetchError, L1Fetcher, L1Transaction,
};
use dac_challenge_interface::{L1BlockRef, H256};
use ethers_core::types::{BlockNumber, Transaction};
use ethers_providers::Middleware;

const BLOB_VERSIONED_HASHES: &str = "blobVersionedHashes";

/// Reads L1 blocks through an ethers middleware.
#[derive(Debug)]
pub struct EthersL1Fetcher<M> {
    client: Arc<M>,
}

impl<M> Clone for EthersL1Fetcher<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<M: Middleware> EthersL1Fetcher<M> {
    /// Wraps `client`.
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M> L1Fetcher for EthersL1Fetcher<M>
where
    M: Middleware + 'static,
{
    async fn txs_by_hash(&self, hash: H256) -> Result<Vec<L1Transaction>, L1FetchError> {
        let block = self
            .client
            .get_block_with_txs(hash)
            .await
            .map_err(|e| L1FetchError::Other(anyhow::Error::new(e)))?
            .ok_or(L1FetchError::NotFound(hash))?;

        block
            .transactions
            .into_iter()
            .map(|tx| l1_transaction(tx).map_err(L1FetchError::Other))
            .collect()
    }
}

#[async_trait]
impl<M> FinalizedHeadSource for EthersL1Fetcher<M>
where
    M: Middleware + 'static,
{
    async fn finalized_ref(&self) -> anyhow::Result<L1BlockRef> {
        let block = self
            .client
            .get_block(BlockNumber::Finalized)
            .await
            .context("failed to fetch the finalized block")?
            .context("node has no finalized block")?;

        Ok(L1BlockRef {
            hash: block.hash.context("finalized block has no hash")?,
            number: block
                .number
                .context("finalized block has no number")?
                .as_u64(),
            parent_hash: block.parent_hash,
            time: block.timestamp.as_u64(),
        })
    }
}

/// Keeps the fields the batch inbox filters need. Blob hashes are not part of the ethers
/// transaction type and are read from the extra fields.
fn l1_transaction(tx: Transaction) -> anyhow::Result<L1Transaction> {
    let blob_versioned_hashes = match tx.other.get_deserialized::<Vec<H256>>(BLOB_VERSIONED_HASHES)
    {
        Some(hashes) => hashes
            .with_context(|| format!("malformed blob hashes in transaction {:?}", tx.hash))?,
        None => Vec::new(),
    };

    Ok(L1Transaction {
        hash: tx.hash,
        from: tx.from,
        to: tx.to,
        input: tx.input,
        blob_versioned_hashes,
    })
}

#[cfg(test)]
mod tests {
    use dac_challenge_interface::{Address, Bytes};

    use super::*;

    fn transaction() -> Transaction {
        Transaction {
            hash: H256::repeat_byte(1),
            from: Address::repeat_byte(2),
            to: Some(Address::repeat_byte(3)),
            input: Bytes::from(vec![0x01, 0x00]),
            ..Default::default()
        }
    }

    #[test]
    fn calldata_transaction_has_no_blobs() {
        let tx = l1_transaction(transaction()).unwrap();

        assert_eq!(tx.hash, H256::repeat_byte(1));
        assert_eq!(tx.from, Address::repeat_byte(2));
        assert_eq!(tx.to, Some(Address::repeat_byte(3)));
        assert_eq!(tx.input.as_ref(), &[0x01, 0x00]);
        assert!(tx.blob_versioned_hashes.is_empty());
    }

    #[test]
    fn reads_blob_hashes_from_extra_fields() {
        let mut raw = transaction();
        raw.other.insert(
            BLOB_VERSIONED_HASHES.to_string(),
            serde_json::json!([H256::repeat_byte(0xaa), H256::repeat_byte(0xbb)]),
        );

        let tx = l1_transaction(raw).unwrap();

        assert_eq!(
            tx.blob_versioned_hashes,
            vec![H256::repeat_byte(0xaa), H256::repeat_byte(0xbb)]
        );
    }

    #[test]
    fn rejects_malformed_blob_hashes() {
        let mut raw = transaction();
        raw.other
            .insert(BLOB_VERSIONED_HASHES.to_string(), serde_json::json!("0x01"));

        assert!(l1_transaction(raw).is_err());
    }
}
