use async_trait::async_trait;
use ethers::{
    abi::{self, ParamType},
    contract::{ContractCall, ContractError},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, TransactionReceipt, H256, U256},
};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::{
    config::Config,
    error::{AppError, Result},
};

ethers::contract::abigen!(
    CyberSystem,
    r#"[
        function mineArtifact(address recipient)
        function salvageArtifact(address user, uint256 tokenId, uint256 amount)
        function equipItem(address user, uint256 itemId)
        function buySoftware(address user, uint256 itemId)
        function enchantItem(address user, uint256 targetItemId, uint256 materialId)
        function useItem(address user, uint256 itemId)
        function stakeItem(address user, uint256 itemId, uint256 amount)
        function unstakeItem(address user, uint256 itemId, uint256 amount)
        function claimReward(address user)
        function adminReward(address user, uint256 amount)
        function getPlayerStats(address user) view returns (uint256[5])
        function getItemLevel(address user, uint256 itemId) view returns (uint256)
        function balanceOfBatch(address[] accounts, uint256[] ids) view returns (uint256[])
        function stakedAmount(address user, uint256 itemId) view returns (uint256)
        function pendingReward(address user) view returns (uint256)
        function hashToken() view returns (address)
        event MiningResult(address indexed user, uint256 tokenId, uint256 rng, bool isEquipment)
        event EnchantResult(address indexed user, uint256 itemId, uint256 newLevel, bool success)
    ]"#
);

ethers::contract::abigen!(
    Erc20,
    r#"[
        function balanceOf(address account) view returns (uint256)
        event Transfer(address indexed from, address indexed to, uint256 value)
    ]"#
);

/// Selector of the standard `Error(string)` revert payload.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

type RelayerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// A mutating call on the game contract, on behalf of `user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameCall {
    Mine { user: Address },
    Salvage { user: Address, token_id: U256, amount: U256 },
    Equip { user: Address, item_id: U256 },
    BuySoftware { user: Address, item_id: U256 },
    Enchant { user: Address, target_id: U256, material_id: U256 },
    UseItem { user: Address, item_id: U256 },
    Stake { user: Address, item_id: U256, amount: U256 },
    Unstake { user: Address, item_id: U256, amount: U256 },
    ClaimYield { user: Address },
    AdminReward { user: Address, amount: U256 },
}

impl GameCall {
    pub fn label(&self) -> &'static str {
        match self {
            GameCall::Mine { .. } => "mineArtifact",
            GameCall::Salvage { .. } => "salvageArtifact",
            GameCall::Equip { .. } => "equipItem",
            GameCall::BuySoftware { .. } => "buySoftware",
            GameCall::Enchant { .. } => "enchantItem",
            GameCall::UseItem { .. } => "useItem",
            GameCall::Stake { .. } => "stakeItem",
            GameCall::Unstake { .. } => "unstakeItem",
            GameCall::ClaimYield { .. } => "claimReward",
            GameCall::AdminReward { .. } => "adminReward",
        }
    }

    pub fn user(&self) -> Address {
        match self {
            GameCall::Mine { user }
            | GameCall::Salvage { user, .. }
            | GameCall::Equip { user, .. }
            | GameCall::BuySoftware { user, .. }
            | GameCall::Enchant { user, .. }
            | GameCall::UseItem { user, .. }
            | GameCall::Stake { user, .. }
            | GameCall::Unstake { user, .. }
            | GameCall::ClaimYield { user }
            | GameCall::AdminReward { user, .. } => *user,
        }
    }
}

/// Raw failure reported by the chain port, before classification.
#[derive(Debug, Clone, Error)]
pub enum ChainFailure {
    #[error("execution reverted: {message}")]
    Reverted {
        /// Decoded `Error(string)` payload, when the node returned revert data.
        reason: Option<String>,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
}

/// Port over the deployed game contract, as seen from the relayer account.
#[async_trait]
pub trait GameChain: Send + Sync {
    /// `eth_call` dry run against the latest block.
    async fn simulate(&self, call: &GameCall) -> std::result::Result<(), ChainFailure>;

    /// Signs and broadcasts; returns once the node accepted the transaction.
    async fn send(&self, call: &GameCall, gas_limit: u64) -> std::result::Result<H256, ChainFailure>;

    async fn receipt(
        &self,
        tx_hash: H256,
    ) -> std::result::Result<Option<TransactionReceipt>, ChainFailure>;

    /// Address of the HASH ERC-20 used for rewards and purchases.
    async fn hash_token(&self) -> std::result::Result<Address, ChainFailure>;
}

pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    abi::decode(&[ParamType::String], &data[4..])
        .ok()?
        .into_iter()
        .next()?
        .into_string()
}

fn failure_from_contract_error(err: ContractError<RelayerClient>) -> ChainFailure {
    let message = err.to_string();
    if let Some(data) = err.as_revert() {
        return ChainFailure::Reverted {
            reason: decode_revert_reason(data),
            message,
        };
    }
    if message.to_ascii_lowercase().contains("revert") {
        return ChainFailure::Reverted {
            reason: None,
            message,
        };
    }
    ChainFailure::Transport(message)
}

pub fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|_| AppError::BadRequest(format!("Invalid address: {}", value)))
}

/// ethers-backed implementation of [`GameChain`] plus the read-only views.
pub struct EvmGameChain {
    client: Arc<RelayerClient>,
    game: CyberSystem<RelayerClient>,
    hash_token: OnceCell<Address>,
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerStats {
    pub cooldown: U256,
    pub luck: U256,
    pub gpu_id: U256,
    pub vpn_id: U256,
    pub buff_time: U256,
}

impl EvmGameChain {
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| AppError::Internal(format!("Invalid RPC URL: {}", e)))?;
        let wallet = LocalWallet::from_str(config.relayer_private_key.trim().trim_start_matches("0x"))
            .map_err(|e| AppError::Internal(format!("Invalid relayer key: {}", e)))?
            .with_chain_id(config.chain_id);
        let contract = Address::from_str(config.game_contract_address.trim())
            .map_err(|_| AppError::Internal("Invalid GAME_CONTRACT_ADDRESS".to_string()))?;

        tracing::info!("Relayer account: {:#x}", wallet.address());

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let game = CyberSystem::new(contract, client.clone());

        Ok(Self {
            client,
            game,
            hash_token: OnceCell::new(),
        })
    }

    fn contract_call(&self, call: &GameCall) -> ContractCall<RelayerClient, ()> {
        match call.clone() {
            GameCall::Mine { user } => self.game.mine_artifact(user),
            GameCall::Salvage {
                user,
                token_id,
                amount,
            } => self.game.salvage_artifact(user, token_id, amount),
            GameCall::Equip { user, item_id } => self.game.equip_item(user, item_id),
            GameCall::BuySoftware { user, item_id } => self.game.buy_software(user, item_id),
            GameCall::Enchant {
                user,
                target_id,
                material_id,
            } => self.game.enchant_item(user, target_id, material_id),
            GameCall::UseItem { user, item_id } => self.game.use_item(user, item_id),
            GameCall::Stake {
                user,
                item_id,
                amount,
            } => self.game.stake_item(user, item_id, amount),
            GameCall::Unstake {
                user,
                item_id,
                amount,
            } => self.game.unstake_item(user, item_id, amount),
            GameCall::ClaimYield { user } => self.game.claim_reward(user),
            GameCall::AdminReward { user, amount } => self.game.admin_reward(user, amount),
        }
    }

    pub async fn block_number(&self) -> Result<u64> {
        self.client
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn player_stats(&self, user: Address) -> Result<PlayerStats> {
        let stats = self
            .game
            .get_player_stats(user)
            .call()
            .await
            .map_err(|e| AppError::Chain(e.to_string()))?;
        Ok(PlayerStats {
            cooldown: stats[0],
            luck: stats[1],
            gpu_id: stats[2],
            vpn_id: stats[3],
            buff_time: stats[4],
        })
    }

    pub async fn item_level(&self, user: Address, item_id: U256) -> Result<U256> {
        self.game
            .get_item_level(user, item_id)
            .call()
            .await
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn balances(&self, user: Address, ids: &[u64]) -> Result<Vec<U256>> {
        let accounts = vec![user; ids.len()];
        let ids = ids.iter().map(|id| U256::from(*id)).collect();
        self.game
            .balance_of_batch(accounts, ids)
            .call()
            .await
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn staked_amount(&self, user: Address, item_id: U256) -> Result<U256> {
        self.game
            .staked_amount(user, item_id)
            .call()
            .await
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn pending_reward(&self, user: Address) -> Result<U256> {
        self.game
            .pending_reward(user)
            .call()
            .await
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn hash_balance(&self, user: Address) -> Result<U256> {
        let token = GameChain::hash_token(self)
            .await
            .map_err(|e| AppError::Chain(e.to_string()))?;
        Erc20::new(token, self.client.clone())
            .balance_of(user)
            .call()
            .await
            .map_err(|e| AppError::Chain(e.to_string()))
    }
}

#[async_trait]
impl GameChain for EvmGameChain {
    async fn simulate(&self, call: &GameCall) -> std::result::Result<(), ChainFailure> {
        self.contract_call(call)
            .call()
            .await
            .map_err(failure_from_contract_error)
    }

    async fn send(&self, call: &GameCall, gas_limit: u64) -> std::result::Result<H256, ChainFailure> {
        let contract_call = self.contract_call(call).gas(gas_limit);
        let pending = contract_call
            .send()
            .await
            .map_err(failure_from_contract_error)?;
        Ok(pending.tx_hash())
    }

    async fn receipt(
        &self,
        tx_hash: H256,
    ) -> std::result::Result<Option<TransactionReceipt>, ChainFailure> {
        self.client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ChainFailure::Transport(e.to_string()))
    }

    async fn hash_token(&self) -> std::result::Result<Address, ChainFailure> {
        self.hash_token
            .get_or_try_init(|| async {
                let token = self
                    .game
                    .hash_token()
                    .call()
                    .await
                    .map_err(failure_from_contract_error)?;
                tracing::info!("HASH token linked: {:#x}", token);
                Ok(token)
            })
            .await
            .copied()
    }
}
