use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, U256};

use crate::contracts::{
    BondQueries, ChallengeContract, ChallengeQueries, ContractError, ResolveContract,
    UnlockContract, WithdrawContract,
};
use crate::{Challenge, ChallengeStatus, CommitmentArg, TxCandidate};

#[derive(Default)]
struct State {
    bond_size: U256,
    balances: HashMap<Address, U256>,
    challenges: HashMap<CommitmentArg, Challenge>,
    challenge_window: u64,
    resolve_window: u64,
    latest_block: u64,
    bond_locked: bool,
    failing: bool,
    calls: Vec<&'static str>,
}

/// In-memory challenge contract. Write methods return candidates whose calldata is the method
/// name followed by the commitment, which keeps assertions readable.
pub struct MockDaChallengeContract {
    address: Address,
    state: Mutex<State>,
}

impl MockDaChallengeContract {
    /// Creates a contract with the given windows, zero bond size and no challenges.
    pub fn new(address: Address, challenge_window: u64, resolve_window: u64) -> Self {
        Self {
            address,
            state: Mutex::new(State {
                challenge_window,
                resolve_window,
                ..Default::default()
            }),
        }
    }

    /// Address candidates are sent to.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sets the bond required to challenge.
    pub fn set_bond_size(&self, bond_size: U256) {
        self.state.lock().unwrap().bond_size = bond_size;
    }

    /// Sets the deposited balance of `addr`.
    pub fn set_balance(&self, addr: Address, balance: U256) {
        self.state.lock().unwrap().balances.insert(addr, balance);
    }

    /// Inserts or replaces a challenge record.
    pub fn insert_challenge(&self, challenge: Challenge) {
        self.state
            .lock()
            .unwrap()
            .challenges
            .insert(challenge.arg.clone(), challenge);
    }

    /// Sets the block used to derive statuses.
    pub fn set_latest_block(&self, block: u64) {
        self.state.lock().unwrap().latest_block = block;
    }

    /// While set, `unlock_bond` fails its simulation.
    pub fn set_bond_locked(&self, locked: bool) {
        self.state.lock().unwrap().bond_locked = locked;
    }

    /// While set, every call fails with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Names of the contract methods called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(&self, method: &'static str) -> Result<MutexGuard<'_, State>, ContractError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(method);
        if state.failing {
            return Err(ContractError::Call {
                method,
                source: anyhow::anyhow!("mock contract is failing"),
            });
        }
        Ok(state)
    }

    fn candidate(&self, method: &str, arg: Option<&CommitmentArg>, value: U256) -> TxCandidate {
        let mut tx_data = method.as_bytes().to_vec();
        if let Some(arg) = arg {
            tx_data.push(b':');
            tx_data.extend_from_slice(&arg.challenged_commitment);
        }
        TxCandidate {
            tx_data: tx_data.into(),
            to: Some(self.address),
            gas_limit: 0,
            value,
        }
    }
}

#[async_trait]
impl BondQueries for MockDaChallengeContract {
    async fn bond_size(&self) -> Result<U256, ContractError> {
        Ok(self.enter("bondSize")?.bond_size)
    }

    async fn balance(&self, addr: Address) -> Result<U256, ContractError> {
        let state = self.enter("balances")?;
        Ok(state.balances.get(&addr).copied().unwrap_or_default())
    }
}

#[async_trait]
impl ChallengeContract for MockDaChallengeContract {
    async fn challenge(&self, arg: &CommitmentArg) -> Result<TxCandidate, ContractError> {
        drop(self.enter("challenge")?);
        Ok(self.candidate("challenge", Some(arg), U256::zero()))
    }

    fn deposit(&self, value: U256) -> Result<TxCandidate, ContractError> {
        drop(self.enter("deposit")?);
        Ok(self.candidate("deposit", None, value))
    }
}

#[async_trait]
impl ResolveContract for MockDaChallengeContract {
    async fn resolve(
        &self,
        arg: &CommitmentArg,
        _blob: &Bytes,
    ) -> Result<TxCandidate, ContractError> {
        drop(self.enter("resolve")?);
        Ok(self.candidate("resolve", Some(arg), U256::zero()))
    }
}

#[async_trait]
impl UnlockContract for MockDaChallengeContract {
    async fn unlock_bond(&self, arg: &CommitmentArg) -> Result<TxCandidate, ContractError> {
        let state = self.enter("unlockBond")?;
        if state.bond_locked {
            return Err(ContractError::SimulationFailed {
                method: "unlockBond",
                reason: "execution reverted".to_string(),
            });
        }
        drop(state);
        Ok(self.candidate("unlockBond", Some(arg), U256::zero()))
    }
}

#[async_trait]
impl WithdrawContract for MockDaChallengeContract {
    async fn withdraw(&self) -> Result<TxCandidate, ContractError> {
        drop(self.enter("withdraw")?);
        Ok(self.candidate("withdraw", None, U256::zero()))
    }
}

#[async_trait]
impl ChallengeQueries for MockDaChallengeContract {
    async fn challenge_window(&self) -> Result<U256, ContractError> {
        Ok(self.enter("challengeWindow")?.challenge_window.into())
    }

    async fn resolve_window(&self) -> Result<U256, ContractError> {
        Ok(self.enter("resolveWindow")?.resolve_window.into())
    }

    async fn get_challenge(&self, arg: &CommitmentArg) -> Result<Challenge, ContractError> {
        let state = self.enter("getChallenge")?;
        Ok(state.challenges.get(arg).cloned().unwrap_or_else(|| Challenge {
            arg: arg.clone(),
            challenger: Address::zero(),
            locked_bond: U256::zero(),
            start_block: U256::zero(),
            resolved_block: U256::zero(),
        }))
    }

    async fn get_challenge_status(
        &self,
        arg: &CommitmentArg,
    ) -> Result<ChallengeStatus, ContractError> {
        let state = self.enter("getChallengeStatus")?;
        Ok(state
            .challenges
            .get(arg)
            .map(|c| c.status_at(state.latest_block, state.resolve_window))
            .unwrap_or(ChallengeStatus::Uninitialized))
    }

    async fn validate_commitment(&self, commitment: &Bytes) -> Result<bool, ContractError> {
        drop(self.enter("validateCommitment")?);
        Ok(crate::CommitmentData::decode(commitment).is_ok())
    }
}
