use std::fmt;

use ethers_core::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CommitmentData;

/// Identifies a commitment on the challenge contract.
///
/// Challenge records are keyed by the L1 block the commitment was posted in and the
/// type-prefixed commitment bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitmentArg {
    /// L1 block number in which the commitment was posted.
    pub challenged_block_number: U256,
    /// Encoded commitment, including its type byte.
    pub challenged_commitment: Bytes,
}

impl CommitmentArg {
    /// Builds the lookup key for `commitment` posted at `block_number`.
    pub fn new(block_number: u64, commitment: &CommitmentData) -> Self {
        Self {
            challenged_block_number: U256::from(block_number),
            challenged_commitment: commitment.encode(),
        }
    }
}

impl fmt::Display for CommitmentArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block={} commitment=0x{}",
            self.challenged_block_number,
            hex::encode(&self.challenged_commitment)
        )
    }
}

/// The state of a challenge relative to a reference L1 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeStatus {
    /// No challenge was ever opened for the commitment.
    Uninitialized,
    /// A challenge is open and its resolve window has not elapsed.
    Active,
    /// The data was supplied on-chain before the resolve window elapsed.
    Resolved,
    /// The resolve window elapsed without a resolution.
    Expired,
}

/// Returned when the contract reports a status outside the known range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown challenge status {0}")]
pub struct UnknownChallengeStatus(pub u64);

impl TryFrom<u64> for ChallengeStatus {
    type Error = UnknownChallengeStatus;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChallengeStatus::Uninitialized),
            1 => Ok(ChallengeStatus::Active),
            2 => Ok(ChallengeStatus::Resolved),
            3 => Ok(ChallengeStatus::Expired),
            other => Err(UnknownChallengeStatus(other)),
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChallengeStatus::Uninitialized => "uninitialized",
            ChallengeStatus::Active => "active",
            ChallengeStatus::Resolved => "resolved",
            ChallengeStatus::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// An on-chain challenge record. Records are never deleted; only the interpretation of
/// their status changes as the chain advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// The challenged commitment.
    pub arg: CommitmentArg,
    /// Account that opened the challenge.
    pub challenger: Address,
    /// Bond escrowed by the challenger.
    pub locked_bond: U256,
    /// L1 block in which the challenge was opened. Zero if no challenge exists.
    pub start_block: U256,
    /// L1 block in which the challenge was resolved. Zero while unresolved.
    pub resolved_block: U256,
}

impl Challenge {
    /// Derives the status of this record as seen at `reference_block`.
    ///
    /// Never cache the result without the reference block: an unresolved challenge turns from
    /// [`ChallengeStatus::Active`] into [`ChallengeStatus::Expired`] without any transaction.
    pub fn status_at(&self, reference_block: u64, resolve_window: u64) -> ChallengeStatus {
        if self.start_block.is_zero() {
            return ChallengeStatus::Uninitialized;
        }
        if !self.resolved_block.is_zero() {
            return ChallengeStatus::Resolved;
        }
        let deadline = self.start_block.saturating_add(U256::from(resolve_window));
        if U256::from(reference_block) <= deadline {
            ChallengeStatus::Active
        } else {
            ChallengeStatus::Expired
        }
    }
}

/// The payload of a resolve transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveData {
    /// The challenged commitment.
    pub arg: CommitmentArg,
    /// The previously missing input.
    pub blob: Bytes,
}

impl fmt::Display for ResolveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blob_len={}", self.arg, self.blob.len())
    }
}

/// A decision taken by the coordinator, alive only until it is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a challenge for a commitment whose data could not be retrieved.
    Challenge(CommitmentArg),
    /// Supply the data of an actively challenged commitment.
    Resolve(ResolveData),
}

impl Action {
    /// The commitment this action is about.
    pub fn commitment(&self) -> &CommitmentArg {
        match self {
            Action::Challenge(arg) => arg,
            Action::Resolve(data) => &data.arg,
        }
    }
}

/// A transaction prepared by a contract binding, ready to be signed and submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxCandidate {
    /// ABI encoded calldata.
    pub tx_data: Bytes,
    /// Destination. `None` only for contract creation.
    pub to: Option<Address>,
    /// Gas limit. Zero lets the sender estimate it.
    pub gas_limit: u64,
    /// Wei attached to the call.
    pub value: U256,
}

/// Reference to an L1 block, as delivered by the finalized head feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct L1BlockRef {
    /// Block hash.
    pub hash: H256,
    /// Block number.
    pub number: u64,
    /// Hash of the parent block.
    pub parent_hash: H256,
    /// Block timestamp in seconds.
    pub time: u64,
}

impl L1BlockRef {
    /// The identifying part of the ref.
    pub fn id(&self) -> BlockId {
        BlockId {
            hash: self.hash,
            number: self.number,
        }
    }
}

impl fmt::Display for L1BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.hash, self.number)
    }
}

/// Hash and number of an L1 block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    /// Block hash.
    pub hash: H256,
    /// Block number.
    pub number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(start_block: u64, resolved_block: u64) -> Challenge {
        Challenge {
            arg: CommitmentArg::new(100, &CommitmentData::Keccak256(H256([1; 32]))),
            challenger: Address::repeat_byte(0xaa),
            locked_bond: U256::from(1_000u64),
            start_block: U256::from(start_block),
            resolved_block: U256::from(resolved_block),
        }
    }

    #[test]
    fn status_depends_on_reference_block() {
        let record = challenge(110, 0);

        assert_eq!(record.status_at(110, 20), ChallengeStatus::Active);
        assert_eq!(record.status_at(130, 20), ChallengeStatus::Active);
        assert_eq!(record.status_at(131, 20), ChallengeStatus::Expired);
    }

    #[test]
    fn resolved_and_missing_records() {
        assert_eq!(
            challenge(110, 115).status_at(500, 20),
            ChallengeStatus::Resolved
        );
        assert_eq!(
            challenge(0, 0).status_at(500, 20),
            ChallengeStatus::Uninitialized
        );
    }

    #[test]
    fn commitment_arg_carries_type_byte() {
        let arg = CommitmentArg::new(100, &CommitmentData::Keccak256(H256([7; 32])));

        assert_eq!(arg.challenged_block_number, U256::from(100u64));
        assert_eq!(arg.challenged_commitment.len(), 33);
        assert_eq!(arg.challenged_commitment[0], 0x00);
    }

    #[test]
    fn status_from_contract_value() {
        assert_eq!(ChallengeStatus::try_from(1), Ok(ChallengeStatus::Active));
        assert_eq!(
            ChallengeStatus::try_from(9),
            Err(UnknownChallengeStatus(9))
        );
    }
}
