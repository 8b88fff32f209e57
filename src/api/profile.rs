use axum::{
    extract::{Path, State},
    Json,
};
use ethers::types::{Address, U256};
use serde::Serialize;

use crate::{
    constants::INVENTORY_ITEM_IDS,
    error::Result,
    models::{item_metadata, ApiResponse, ItemMeta},
    services::leaderboard_cache::wei_to_decimal,
    services::onchain::EvmGameChain,
};

use super::{path_address, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatsView {
    pub cooldown: u64,
    pub luck: u64,
    pub buff_time: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RigSlot {
    pub item_id: u64,
    pub name: String,
    pub level: u64,
    pub staked: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RigView {
    pub gpu: Option<RigSlot>,
    pub vpn: Option<RigSlot>,
    pub pending_reward: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub address: String,
    /// HASH, one decimal place.
    pub balance: String,
    pub stats: PlayerStatsView,
    pub rig: RigView,
}

#[derive(Debug, Serialize)]
pub struct InventoryItem {
    pub id: u64,
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub qty: u64,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub items: Vec<InventoryItem>,
}

fn clamp_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

fn format_hash(wei: U256) -> String {
    format!("{:.1}", wei_to_decimal(wei))
}

async fn rig_slot(chain: &EvmGameChain, user: Address, item_id: U256) -> Result<Option<RigSlot>> {
    if item_id.is_zero() {
        return Ok(None);
    }
    let (level, staked) = tokio::try_join!(
        chain.item_level(user, item_id),
        chain.staked_amount(user, item_id)
    )?;
    let id = clamp_u64(item_id);
    let level = clamp_u64(level);
    Ok(Some(RigSlot {
        item_id: id,
        name: format!("{} (+{})", item_metadata(id).name, level),
        level,
        staked: clamp_u64(staked),
    }))
}

fn owned_items(ids: &[u64], balances: &[U256]) -> Vec<InventoryItem> {
    ids.iter()
        .zip(balances)
        .filter(|(_, qty)| !qty.is_zero())
        .map(|(id, qty)| InventoryItem {
            id: *id,
            meta: item_metadata(*id),
            qty: clamp_u64(*qty),
        })
        .collect()
}

/// GET /profile/{address}
pub async fn get_profile(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<ProfileResponse>>> {
    let (address, user) = path_address(&address)?;
    let chain = state.chain.as_ref();

    let (stats, balance_wei, pending) = tokio::try_join!(
        chain.player_stats(user),
        chain.hash_balance(user),
        chain.pending_reward(user)
    )?;
    let (gpu, vpn) = tokio::try_join!(
        rig_slot(chain, user, stats.gpu_id),
        rig_slot(chain, user, stats.vpn_id)
    )?;

    // Refresh the cached balance the leaderboard ranks on
    state.leaderboard.upsert(&address, balance_wei).await?;

    Ok(Json(ApiResponse::success(ProfileResponse {
        address,
        balance: format_hash(balance_wei),
        stats: PlayerStatsView {
            cooldown: clamp_u64(stats.cooldown),
            luck: clamp_u64(stats.luck),
            buff_time: clamp_u64(stats.buff_time),
        },
        rig: RigView {
            gpu,
            vpn,
            pending_reward: format_hash(pending),
        },
    })))
}

/// GET /inventory/{address}
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<InventoryResponse>>> {
    let (_, user) = path_address(&address)?;

    let balances = state.chain.balances(user, &INVENTORY_ITEM_IDS).await?;
    Ok(Json(ApiResponse::success(InventoryResponse {
        items: owned_items(&INVENTORY_ITEM_IDS, &balances),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_omits_empty_slots() {
        let ids = [1, 5, 101];
        let balances = [U256::from(3), U256::zero(), U256::one()];
        let items = owned_items(&ids, &balances);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[0].qty, 3);
        assert_eq!(items[1].meta.name, "Integrated Chip");

        let json = serde_json::to_value(&items[1]).unwrap();
        assert_eq!(json["type"], "GPU");
        assert_eq!(json["qty"], 1);
    }

    #[test]
    fn hash_is_formatted_to_one_decimal() {
        let wei = U256::from(12_345_000_000_000_000_000u128);
        assert_eq!(format_hash(wei), "12.3");
        assert_eq!(format_hash(U256::zero()), "0.0");
    }
}
