//! Maps a commitment type and kind to the challenge contract binding that arbitrates it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dac_challenge_interface::contracts::{
    ChallengeContract, ChallengeQueries, ContractError, DaChallengeContract, ResolveContract,
    UnlockContract, WithdrawContract,
};
use dac_challenge_interface::{Address, CommitmentKind, CommitmentType};
use dac_ethereum_adapter::{DaChallengeContractV1, L1Caller};
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;

/// The capability handles the coordinator needs, all bound to the same contract.
#[derive(Clone)]
pub struct Contracts {
    /// Opens challenges.
    pub challenge: Arc<dyn ChallengeContract>,
    /// Resolves challenges.
    pub resolve: Arc<dyn ResolveContract>,
    /// Unlocks bonds.
    pub unlock: Arc<dyn UnlockContract>,
    /// Withdraws balances.
    pub withdraw: Arc<dyn WithdrawContract>,
    /// Read-only queries, e.g. the protocol windows.
    pub queries: Arc<dyn ChallengeQueries>,
}

impl Contracts {
    /// Hands out every capability of a single binding.
    pub fn from_binding<T: DaChallengeContract + 'static>(binding: T) -> Self {
        let binding = Arc::new(binding);
        Self {
            challenge: binding.clone(),
            resolve: binding.clone(),
            unlock: binding.clone(),
            withdraw: binding.clone(),
            queries: binding,
        }
    }
}

impl fmt::Debug for Contracts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contracts").finish_non_exhaustive()
    }
}

/// Binds the contracts deployed at the given address.
pub type ContractConstructor =
    Arc<dyn Fn(Address) -> BoxFuture<'static, Result<Contracts, ContractError>> + Send + Sync>;

/// Errors returned by [`ContractRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Generic commitments need a kind to pick the backend.
    #[error("daKind is undefined")]
    MissingKind,
    /// A known commitment kind without an implementation.
    #[error("daKind {0} is currently unsupported")]
    Unsupported(CommitmentKind),
    /// Nothing was registered for the pair.
    #[error("no challenge contract registered for daType {ty} and daKind {kind}")]
    Unregistered {
        /// Commitment type looked up.
        ty: CommitmentType,
        /// Commitment kind looked up.
        kind: CommitmentKind,
    },
    /// The constructor failed to bind the contract.
    #[error("failed to bind challenge contract at {address:?}")]
    Contract {
        /// Contract address.
        address: Address,
        /// Underlying error.
        #[source]
        source: ContractError,
    },
}

/// An immutable table from `(commitment type, commitment kind)` to a contract constructor.
///
/// Built once with [`ContractRegistryBuilder`] and shared by reference afterwards.
#[derive(Clone, Default)]
pub struct ContractRegistry {
    constructors: HashMap<(CommitmentType, CommitmentKind), ContractConstructor>,
}

/// Collects the entries of a [`ContractRegistry`].
#[derive(Default)]
pub struct ContractRegistryBuilder {
    constructors: HashMap<(CommitmentType, CommitmentKind), ContractConstructor>,
}

impl ContractRegistryBuilder {
    /// Registers `constructor` for the pair, replacing any earlier entry.
    pub fn register(
        mut self,
        ty: CommitmentType,
        kind: CommitmentKind,
        constructor: ContractConstructor,
    ) -> Self {
        self.constructors.insert((ty, kind), constructor);
        self
    }

    /// Freezes the table.
    pub fn build(self) -> ContractRegistry {
        ContractRegistry {
            constructors: self.constructors,
        }
    }
}

impl ContractRegistry {
    /// Starts an empty registry.
    pub fn builder() -> ContractRegistryBuilder {
        ContractRegistryBuilder::default()
    }

    /// The registry with the `1.0.0` keccak256 challenge contract, called through `caller`.
    ///
    /// `from` is the account reads are simulated as, normally the transaction sender.
    pub fn standard<C>(caller: C, from: Option<Address>) -> Self
    where
        C: L1Caller + Clone + 'static,
    {
        let constructor: ContractConstructor = Arc::new(move |address: Address| {
            let caller = caller.clone();
            async move {
                let binding = DaChallengeContractV1::new(caller, address, from).await?;
                Ok::<_, ContractError>(Contracts::from_binding(binding))
            }
            .boxed()
        });
        Self::builder()
            .register(
                CommitmentType::Keccak256,
                CommitmentKind::Undefined,
                constructor,
            )
            .build()
    }

    /// Finds the constructor for the pair.
    pub fn lookup(
        &self,
        ty: CommitmentType,
        kind: CommitmentKind,
    ) -> Result<&ContractConstructor, RegistryError> {
        if let Some(constructor) = self.constructors.get(&(ty, kind)) {
            return Ok(constructor);
        }
        match (ty, kind) {
            (CommitmentType::Generic, CommitmentKind::Undefined) => Err(RegistryError::MissingKind),
            (_, CommitmentKind::EigenDA) => Err(RegistryError::Unsupported(kind)),
            _ => Err(RegistryError::Unregistered { ty, kind }),
        }
    }

    /// Looks up the pair and binds the contract deployed at `address`.
    pub async fn build_contracts(
        &self,
        ty: CommitmentType,
        kind: CommitmentKind,
        address: Address,
    ) -> Result<Contracts, RegistryError> {
        let constructor = self.lookup(ty, kind)?;
        constructor(address)
            .await
            .map_err(|source| RegistryError::Contract { address, source })
    }
}

impl fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("entries", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
