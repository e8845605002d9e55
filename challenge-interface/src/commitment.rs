use std::fmt;

use ethers_core::types::{Bytes, H256};
use ethers_core::utils::keccak256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version byte that prefixes a DA commitment in batch inbox data.
/// Any other leading byte marks the entry as plain L1 batch data.
pub const TX_DATA_VERSION_1: u8 = 0x01;

/// Selects the codec of an encoded commitment. Stored as the first byte of the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentType {
    /// A 32 byte keccak256 hash of the input.
    Keccak256,
    /// An opaque commitment interpreted by a DA-specific backend.
    Generic,
}

impl CommitmentType {
    /// The type byte used on the wire.
    pub const fn as_byte(self) -> u8 {
        match self {
            CommitmentType::Keccak256 => 0x00,
            CommitmentType::Generic => 0x01,
        }
    }
}

impl TryFrom<u8> for CommitmentType {
    type Error = CommitmentError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(CommitmentType::Keccak256),
            0x01 => Ok(CommitmentType::Generic),
            other => Err(CommitmentError::UnknownType(other)),
        }
    }
}

impl fmt::Display for CommitmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitmentType::Keccak256 => write!(f, "keccak256"),
            CommitmentType::Generic => write!(f, "generic"),
        }
    }
}

/// The backend behind a [`CommitmentType::Generic`] commitment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentKind {
    /// No backend selected. The only valid kind for keccak256 commitments.
    #[default]
    Undefined,
    /// EigenDA-backed generic commitments.
    #[serde(alias = "eigen_da")]
    EigenDA,
}

impl fmt::Display for CommitmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitmentKind::Undefined => write!(f, "undefined"),
            CommitmentKind::EigenDA => write!(f, "eigenda"),
        }
    }
}

/// Errors produced while decoding a commitment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitmentError {
    /// The encoded commitment was empty.
    #[error("empty commitment")]
    Empty,
    /// The leading type byte does not name a known codec.
    #[error("unknown commitment type byte {0:#04x}")]
    UnknownType(u8),
    /// A keccak256 commitment whose payload is not a 32 byte hash.
    #[error("invalid keccak256 commitment length {0}, expected 32")]
    InvalidKeccakLength(usize),
}

/// A decoded DA commitment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommitmentData {
    /// Hash of the committed input.
    Keccak256(H256),
    /// Backend-specific reference to the committed input.
    Generic(Vec<u8>),
}

impl CommitmentData {
    /// Commits to `input` with a keccak256 hash.
    pub fn keccak256_from_input(input: &[u8]) -> Self {
        CommitmentData::Keccak256(H256(keccak256(input)))
    }

    /// Decodes a type-prefixed commitment.
    pub fn decode(encoded: &[u8]) -> Result<Self, CommitmentError> {
        let (&type_byte, payload) = encoded.split_first().ok_or(CommitmentError::Empty)?;
        match CommitmentType::try_from(type_byte)? {
            CommitmentType::Keccak256 => {
                if payload.len() != 32 {
                    return Err(CommitmentError::InvalidKeccakLength(payload.len()));
                }
                Ok(CommitmentData::Keccak256(H256::from_slice(payload)))
            }
            CommitmentType::Generic => Ok(CommitmentData::Generic(payload.to_vec())),
        }
    }

    /// The type byte followed by the commitment payload.
    pub fn encode(&self) -> Bytes {
        let mut out = vec![self.commitment_type().as_byte()];
        match self {
            CommitmentData::Keccak256(hash) => out.extend_from_slice(hash.as_bytes()),
            CommitmentData::Generic(payload) => out.extend_from_slice(payload),
        }
        out.into()
    }

    /// The codec of this commitment.
    pub fn commitment_type(&self) -> CommitmentType {
        match self {
            CommitmentData::Keccak256(_) => CommitmentType::Keccak256,
            CommitmentData::Generic(_) => CommitmentType::Generic,
        }
    }

    /// Checks that `input` is the data behind this commitment.
    ///
    /// Generic commitments can only be verified by their backend, so they always pass here.
    pub fn verify(&self, input: &[u8]) -> bool {
        match self {
            CommitmentData::Keccak256(hash) => hash.0 == keccak256(input),
            CommitmentData::Generic(_) => true,
        }
    }
}

impl fmt::Display for CommitmentData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.encode()))
    }
}
