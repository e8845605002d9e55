//! Defines mock instantiations of the capability and collaborator traits, which are useful
//! for testing the coordinator without an L1 node, a DA server or a signer.

mod contract;
mod l1;
mod plasma;
mod sender;

pub use contract::MockDaChallengeContract;
pub use l1::{MockBlobsFetcher, MockFinalizedHeadSource, MockL1Fetcher};
pub use plasma::{MockInput, MockPlasmaFetcher};
pub use sender::{MockTxSender, SentBatch};
