//! Binding for the `DataAvailabilityChallenge` contract that arbitrates keccak256 commitments.

use async_trait::async_trait;
use dac_challenge_interface::contracts::{
    BondQueries, ChallengeContract, ChallengeQueries, ContractError, ResolveContract,
    UnlockContract, WithdrawContract,
};
use dac_challenge_interface::{
    Address, Bytes, Challenge, ChallengeStatus, CommitmentArg, TxCandidate, U256,
};
use ethers_contract::BaseContract;
use ethers_core::abi::{parse_abi, Detokenize, Tokenize};
use tracing::debug;

use crate::caller::{CallError, L1Caller};

/// The only contract version this binding understands.
pub const SUPPORTED_VERSION: &str = "1.0.0";

const DA_CHALLENGE_ABI: &[&str] = &[
    "function version() external view returns (string)",
    "function challengeWindow() external view returns (uint256)",
    "function resolveWindow() external view returns (uint256)",
    "function bondSize() external view returns (uint256)",
    "function balances(address) external view returns (uint256)",
    "function deposit() external payable",
    "function withdraw() external",
    "function getChallenge(uint256 challengedBlockNumber, bytes challengedCommitment) external view returns (address challenger, uint256 lockedBond, uint256 startBlock, uint256 resolvedBlock)",
    "function getChallengeStatus(uint256 challengedBlockNumber, bytes challengedCommitment) external view returns (uint8)",
    "function validateCommitment(bytes commitment) external pure",
    "function challenge(uint256 challengedBlockNumber, bytes challengedCommitment) external payable",
    "function resolve(uint256 challengedBlockNumber, bytes challengedCommitment, bytes resolveData) external",
    "function unlockBond(uint256 challengedBlockNumber, bytes challengedCommitment) external",
];

/// Version `1.0.0` of the challenge contract.
///
/// Reads are executed with `eth_call` as `from`, so `unlockBond` simulations see the same
/// bond accounting as the transaction that follows.
pub struct DaChallengeContractV1<C> {
    caller: C,
    address: Address,
    from: Option<Address>,
    abi: BaseContract,
}

impl<C: L1Caller> DaChallengeContractV1<C> {
    /// Binds the contract at `address` and checks its version.
    pub async fn new(
        caller: C,
        address: Address,
        from: Option<Address>,
    ) -> Result<Self, ContractError> {
        let abi = parse_abi(DA_CHALLENGE_ABI).map_err(|e| ContractError::Encode {
            method: "version",
            reason: e.to_string(),
        })?;
        let contract = Self {
            caller,
            address,
            from,
            abi: BaseContract::from(abi),
        };

        let version: String = contract.query("version", ()).await?;
        if version != SUPPORTED_VERSION {
            return Err(ContractError::UnsupportedVersion {
                found: version,
                expected: SUPPORTED_VERSION,
            });
        }
        debug!(%address, %version, "Bound DA challenge contract");
        Ok(contract)
    }

    /// Address of the bound contract.
    pub fn address(&self) -> Address {
        self.address
    }

    fn encode<T: Tokenize>(&self, method: &'static str, args: T) -> Result<Bytes, ContractError> {
        self.abi
            .encode(method, args)
            .map_err(|e| ContractError::Encode {
                method,
                reason: e.to_string(),
            })
    }

    async fn call(&self, method: &'static str, data: Bytes) -> Result<Bytes, ContractError> {
        self.caller
            .call(self.from, self.address, data)
            .await
            .map_err(|err| match err {
                CallError::Revert(reason) => ContractError::SimulationFailed { method, reason },
                CallError::Transport(source) => ContractError::Call { method, source },
            })
    }

    async fn query<T: Tokenize + Send, D: Detokenize>(
        &self,
        method: &'static str,
        args: T,
    ) -> Result<D, ContractError> {
        let data = self.encode(method, args)?;
        let output = self.call(method, data).await?;
        self.abi
            .decode_output(method, output)
            .map_err(|e| ContractError::Decode {
                method,
                reason: e.to_string(),
            })
    }

    fn candidate<T: Tokenize>(
        &self,
        method: &'static str,
        args: T,
        value: U256,
    ) -> Result<TxCandidate, ContractError> {
        Ok(TxCandidate {
            tx_data: self.encode(method, args)?,
            to: Some(self.address),
            gas_limit: 0,
            value,
        })
    }
}

fn commitment_tokens(arg: &CommitmentArg) -> (U256, Bytes) {
    (arg.challenged_block_number, arg.challenged_commitment.clone())
}

#[async_trait]
impl<C: L1Caller> BondQueries for DaChallengeContractV1<C> {
    async fn bond_size(&self) -> Result<U256, ContractError> {
        self.query("bondSize", ()).await
    }

    async fn balance(&self, addr: Address) -> Result<U256, ContractError> {
        self.query("balances", addr).await
    }
}

#[async_trait]
impl<C: L1Caller> ChallengeContract for DaChallengeContractV1<C> {
    async fn challenge(&self, arg: &CommitmentArg) -> Result<TxCandidate, ContractError> {
        self.candidate("challenge", commitment_tokens(arg), U256::zero())
    }

    fn deposit(&self, value: U256) -> Result<TxCandidate, ContractError> {
        self.candidate("deposit", (), value)
    }
}

#[async_trait]
impl<C: L1Caller> ResolveContract for DaChallengeContractV1<C> {
    async fn resolve(
        &self,
        arg: &CommitmentArg,
        blob: &Bytes,
    ) -> Result<TxCandidate, ContractError> {
        let (block_number, commitment) = commitment_tokens(arg);
        self.candidate(
            "resolve",
            (block_number, commitment, blob.clone()),
            U256::zero(),
        )
    }
}

#[async_trait]
impl<C: L1Caller> UnlockContract for DaChallengeContractV1<C> {
    async fn unlock_bond(&self, arg: &CommitmentArg) -> Result<TxCandidate, ContractError> {
        let candidate = self.candidate("unlockBond", commitment_tokens(arg), U256::zero())?;
        // A revert here means the bond is still locked.
        self.call("unlockBond", candidate.tx_data.clone()).await?;
        Ok(candidate)
    }
}

#[async_trait]
impl<C: L1Caller> WithdrawContract for DaChallengeContractV1<C> {
    async fn withdraw(&self) -> Result<TxCandidate, ContractError> {
        self.candidate("withdraw", (), U256::zero())
    }
}

#[async_trait]
impl<C: L1Caller> ChallengeQueries for DaChallengeContractV1<C> {
    async fn challenge_window(&self) -> Result<U256, ContractError> {
        self.query("challengeWindow", ()).await
    }

    async fn resolve_window(&self) -> Result<U256, ContractError> {
        self.query("resolveWindow", ()).await
    }

    async fn get_challenge(&self, arg: &CommitmentArg) -> Result<Challenge, ContractError> {
        let (challenger, locked_bond, start_block, resolved_block): (Address, U256, U256, U256) =
            self.query("getChallenge", commitment_tokens(arg)).await?;
        Ok(Challenge {
            arg: arg.clone(),
            challenger,
            locked_bond,
            start_block,
            resolved_block,
        })
    }

    async fn get_challenge_status(
        &self,
        arg: &CommitmentArg,
    ) -> Result<ChallengeStatus, ContractError> {
        let status: u8 = self
            .query("getChallengeStatus", commitment_tokens(arg))
            .await?;
        ChallengeStatus::try_from(u64::from(status)).map_err(|e| ContractError::Decode {
            method: "getChallengeStatus",
            reason: e.to_string(),
        })
    }

    async fn validate_commitment(&self, commitment: &Bytes) -> Result<bool, ContractError> {
        let data = self.encode("validateCommitment", commitment.clone())?;
        match self.call("validateCommitment", data).await {
            Ok(_) => Ok(true),
            Err(ContractError::SimulationFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use dac_challenge_interface::CommitmentData;
    use ethers_core::abi::{encode, Token};
    use ethers_core::types::H256;
    use ethers_core::utils::id;

    use super::*;

    #[derive(Default)]
    struct FakeCaller {
        responses: HashMap<[u8; 4], Result<Bytes, String>>,
        calls: Mutex<Vec<(Option<Address>, Address, Bytes)>>,
    }

    impl FakeCaller {
        fn respond(mut self, signature: &str, tokens: &[Token]) -> Self {
            self.responses
                .insert(id(signature), Ok(encode(tokens).into()));
            self
        }

        fn revert(mut self, signature: &str) -> Self {
            self.responses
                .insert(id(signature), Err("execution reverted".to_string()));
            self
        }
    }

    #[async_trait]
    impl L1Caller for FakeCaller {
        async fn call(
            &self,
            from: Option<Address>,
            to: Address,
            data: Bytes,
        ) -> Result<Bytes, CallError> {
            self.calls.lock().unwrap().push((from, to, data.clone()));
            let mut selector = [0u8; 4];
            selector.copy_from_slice(&data[..4]);
            match self.responses.get(&selector) {
                Some(Ok(output)) => Ok(output.clone()),
                Some(Err(reason)) => Err(CallError::Revert(reason.clone())),
                None => Err(CallError::Transport(anyhow::anyhow!("no response"))),
            }
        }
    }

    fn contract_address() -> Address {
        Address::repeat_byte(0xda)
    }

    fn sender() -> Address {
        Address::repeat_byte(0x11)
    }

    fn versioned(caller: FakeCaller) -> FakeCaller {
        caller.respond("version()", &[Token::String(SUPPORTED_VERSION.to_string())])
    }

    fn arg() -> CommitmentArg {
        CommitmentArg::new(100, &CommitmentData::Keccak256(H256([0x42; 32])))
    }

    #[tokio::test]
    async fn rejects_unknown_version() {
        let caller = FakeCaller::default().respond("version()", &[Token::String("2.0.0".into())]);

        let result = DaChallengeContractV1::new(caller, contract_address(), None).await;

        match result {
            Err(ContractError::UnsupportedVersion { found, expected }) => {
                assert_eq!(found, "2.0.0");
                assert_eq!(expected, "1.0.0");
            }
            _ => panic!("expected an unsupported version error"),
        }
    }

    #[tokio::test]
    async fn reads_windows_and_bonds() {
        let caller = versioned(FakeCaller::default())
            .respond("challengeWindow()", &[Token::Uint(U256::from(16))])
            .respond("resolveWindow()", &[Token::Uint(U256::from(32))])
            .respond("balances(address)", &[Token::Uint(U256::from(7))]);
        let contract = DaChallengeContractV1::new(caller, contract_address(), Some(sender()))
            .await
            .unwrap();

        assert_eq!(contract.challenge_window().await.unwrap(), U256::from(16));
        assert_eq!(contract.resolve_window().await.unwrap(), U256::from(32));
        assert_eq!(contract.balance(sender()).await.unwrap(), U256::from(7));

        let calls = contract.caller.calls.lock().unwrap();
        assert!(calls
            .iter()
            .all(|(from, to, _)| *from == Some(sender()) && *to == contract_address()));
    }

    #[tokio::test]
    async fn decodes_challenge_record() {
        let caller = versioned(FakeCaller::default()).respond(
            "getChallenge(uint256,bytes)",
            &[
                Token::Address(Address::repeat_byte(0xcc)),
                Token::Uint(U256::from(1_000)),
                Token::Uint(U256::from(105)),
                Token::Uint(U256::zero()),
            ],
        );
        let contract = DaChallengeContractV1::new(caller, contract_address(), None)
            .await
            .unwrap();

        let challenge = contract.get_challenge(&arg()).await.unwrap();

        assert_eq!(challenge.arg, arg());
        assert_eq!(challenge.challenger, Address::repeat_byte(0xcc));
        assert_eq!(challenge.locked_bond, U256::from(1_000));
        assert_eq!(challenge.start_block, U256::from(105));
        assert!(challenge.resolved_block.is_zero());
    }

    #[tokio::test]
    async fn rejects_out_of_range_status() {
        let caller = versioned(FakeCaller::default())
            .respond("getChallengeStatus(uint256,bytes)", &[Token::Uint(U256::from(9))]);
        let contract = DaChallengeContractV1::new(caller, contract_address(), None)
            .await
            .unwrap();

        assert!(matches!(
            contract.get_challenge_status(&arg()).await,
            Err(ContractError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn builds_challenge_and_deposit_candidates() {
        let contract = DaChallengeContractV1::new(
            versioned(FakeCaller::default()),
            contract_address(),
            None,
        )
        .await
        .unwrap();

        let challenge = contract.challenge(&arg()).await.unwrap();
        assert_eq!(challenge.to, Some(contract_address()));
        assert_eq!(&challenge.tx_data[..4], &id("challenge(uint256,bytes)"));

        let deposit = contract.deposit(U256::from(500)).unwrap();
        assert_eq!(deposit.value, U256::from(500));
        assert_eq!(deposit.tx_data.as_ref(), &id("deposit()"));
    }

    #[tokio::test]
    async fn unlock_bond_reports_locked_bond_as_simulation_failure() {
        let caller = versioned(FakeCaller::default()).revert("unlockBond(uint256,bytes)");
        let contract = DaChallengeContractV1::new(caller, contract_address(), Some(sender()))
            .await
            .unwrap();

        assert!(matches!(
            contract.unlock_bond(&arg()).await,
            Err(ContractError::SimulationFailed {
                method: "unlockBond",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unlock_bond_returns_candidate_once_unlockable() {
        let caller = versioned(FakeCaller::default()).respond("unlockBond(uint256,bytes)", &[]);
        let contract = DaChallengeContractV1::new(caller, contract_address(), Some(sender()))
            .await
            .unwrap();

        let candidate = contract.unlock_bond(&arg()).await.unwrap();
        assert_eq!(&candidate.tx_data[..4], &id("unlockBond(uint256,bytes)"));
    }

    #[tokio::test]
    async fn invalid_commitment_reverts() {
        let caller = versioned(FakeCaller::default()).revert("validateCommitment(bytes)");
        let contract = DaChallengeContractV1::new(caller, contract_address(), None)
            .await
            .unwrap();

        assert!(!contract
            .validate_commitment(&Bytes::from(vec![0x00, 0x01]))
            .await
            .unwrap());
    }
}
