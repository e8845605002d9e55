#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod caller;
pub mod keccak256;
mod l1;
mod sender;

pub use caller::{CallError, EthersCaller, L1Caller};
pub use keccak256::{DaChallengeContractV1, SUPPORTED_VERSION};
pub use l1::EthersL1Fetcher;
pub use sender::MiddlewareTxSender;
