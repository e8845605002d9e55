//! This crate defines the core types and traits used by the DA challenge coordinator.
//! It specifies the interfaces which allow the same decision loop to drive different
//! on-chain challenge contracts, L1 clients and DA retrieval backends.

#![deny(missing_docs)]

mod commitment;
pub mod contracts;
pub mod services;
mod types;

#[cfg(feature = "mocks")]
pub mod mocks;

pub use commitment::*;
pub use ethers_core::types::{Address, Bytes, H256, U256};
pub use types::*;
