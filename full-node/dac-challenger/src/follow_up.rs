//! Bookkeeping for commitments that are looked at again on later finalized blocks.

use std::collections::BTreeMap;

use dac_challenge_interface::{CommitmentArg, CommitmentData, L1BlockRef};

type Key = (u64, Vec<u8>);

fn key(block_number: u64, commitment: &CommitmentData) -> Key {
    (block_number, commitment.encode().to_vec())
}

/// A commitment waiting to be re-evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    /// Block the commitment was posted in.
    pub block: L1BlockRef,
    /// The commitment.
    pub commitment: CommitmentData,
    /// Last finalized block at which re-evaluating can still lead to an action.
    pub deadline: u64,
    next_check: u64,
}

/// Commitments to re-evaluate every `retry_interval_blocks` until their window closes.
///
/// An interval of zero disables follow-ups entirely.
#[derive(Debug, Default)]
pub struct FollowUps {
    retry_interval_blocks: u64,
    entries: BTreeMap<Key, FollowUp>,
}

impl FollowUps {
    /// Creates an empty set.
    pub fn new(retry_interval_blocks: u64) -> Self {
        Self {
            retry_interval_blocks,
            entries: BTreeMap::new(),
        }
    }

    /// Whether anything is ever tracked.
    pub fn is_enabled(&self) -> bool {
        self.retry_interval_blocks > 0
    }

    /// Schedules `commitment` for re-evaluation `retry_interval_blocks` after `head`.
    ///
    /// Tracking an already tracked commitment replaces its entry.
    pub fn track(&mut self, head: u64, block: L1BlockRef, commitment: CommitmentData, deadline: u64) {
        if !self.is_enabled() {
            return;
        }
        let next_check = head.saturating_add(self.retry_interval_blocks);
        if next_check > deadline {
            return;
        }
        self.entries.insert(
            key(block.number, &commitment),
            FollowUp {
                block,
                commitment,
                deadline,
                next_check,
            },
        );
    }

    /// Removes and returns the follow-ups due at `head`, oldest commitment first.
    ///
    /// Entries whose deadline has passed are discarded.
    pub fn due(&mut self, head: u64) -> Vec<FollowUp> {
        self.entries.retain(|_, entry| entry.deadline >= head);

        let due_keys: Vec<Key> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.next_check <= head)
            .map(|(key, _)| key.clone())
            .collect();
        due_keys
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .collect()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of tracked commitments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Challenged commitments whose bonds still have to be unlocked.
#[derive(Debug, Default)]
pub struct PendingUnlocks {
    entries: BTreeMap<Key, (u64, CommitmentArg)>,
}

impl PendingUnlocks {
    /// Remembers that the bond for `commitment` can be unlocked once the head passes
    /// `unlockable_after`.
    pub fn insert(&mut self, block_number: u64, commitment: &CommitmentData, unlockable_after: u64) {
        self.entries.insert(
            key(block_number, commitment),
            (unlockable_after, CommitmentArg::new(block_number, commitment)),
        );
    }

    /// Bonds that may be unlocked at `head` with the block their commitment was posted in,
    /// oldest commitment first.
    pub fn eligible(&self, head: u64) -> Vec<(u64, CommitmentArg)> {
        self.entries
            .iter()
            .filter(|(_, (after, _))| head > *after)
            .map(|((block_number, _), (_, arg))| (*block_number, arg.clone()))
            .collect()
    }

    /// Forgets the bond of `arg`, posted in `block_number`.
    pub fn remove(&mut self, block_number: u64, arg: &CommitmentArg) {
        self.entries
            .remove(&(block_number, arg.challenged_commitment.to_vec()));
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of bonds waiting to be unlocked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no bond is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
