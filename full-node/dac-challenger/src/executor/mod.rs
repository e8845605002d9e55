//! Executors turn one scheduled job into contract calls and submitted transactions.

mod challenger;
mod resolver;
mod unlocker;
mod withdrawer;

use std::fmt;

use async_trait::async_trait;
pub use challenger::Challenger;
pub use resolver::Resolver;
pub use unlocker::Unlocker;
pub use withdrawer::Withdrawer;

/// Purpose label of challenge transactions.
pub const CHALLENGE_PURPOSE: &str = "challenge da commitment";
/// Purpose label of resolve transactions.
pub const RESOLVE_PURPOSE: &str = "resolve da challenge";
/// Purpose label of bond unlock transactions.
pub const UNLOCK_PURPOSE: &str = "unlock bond";
/// Purpose label of withdraw transactions.
pub const WITHDRAW_PURPOSE: &str = "withdraw bonds";

/// The four kinds of on-chain actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Open a challenge.
    Challenge,
    /// Resolve a challenge.
    Resolve,
    /// Unlock a challenger bond.
    Unlock,
    /// Withdraw unlocked bonds.
    Withdraw,
}

impl ActionKind {
    /// Label used in logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionKind::Challenge => "challenge",
            ActionKind::Resolve => "resolve",
            ActionKind::Unlock => "unlock",
            ActionKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an executor did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// A transaction was submitted and confirmed.
    Submitted,
    /// There was nothing to do, e.g. the bond is still locked.
    Skipped,
}

/// Performs one kind of action.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Input of one execution.
    type Job: fmt::Display + Send + 'static;

    /// The action this executor performs.
    const KIND: ActionKind;

    /// Builds the transactions for `job` and waits for them to land.
    async fn execute(&self, job: Self::Job) -> anyhow::Result<ExecutionOutcome>;
}
