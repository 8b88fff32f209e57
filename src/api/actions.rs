use axum::{extract::State, Json};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{ACTION_BUY, ACTION_ENCHANT, ACTION_EQUIP, ACTION_MINE, ACTION_SALVAGE, ACTION_USE},
    error::{AppError, Result},
    models::{item_metadata, ApiResponse, ItemMeta},
    services::onchain::GameCall,
    services::relayer::GameEvent,
};

use super::{ActionReceipt, AppState, SignedEnvelope};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MineRequest {
    #[serde(flatten)]
    pub auth: SignedEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnchantRequest {
    #[serde(flatten)]
    pub auth: SignedEnvelope,
    pub target_id: u64,
    pub material_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalvageRequest {
    #[serde(flatten)]
    pub auth: SignedEnvelope,
    pub token_id: u64,
    pub amount: u64,
}

/// Body for endpoints acting on a single item.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    #[serde(flatten)]
    pub auth: SignedEnvelope,
    pub item_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedArtifact {
    pub token_id: String,
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub is_equipment: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MineResponse {
    #[serde(flatten)]
    pub receipt: ActionReceipt,
    pub artifact: Option<MinedArtifact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnchantResponse {
    #[serde(flatten)]
    pub receipt: ActionReceipt,
    pub upgraded: bool,
    pub level: u64,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalvageResponse {
    #[serde(flatten)]
    pub receipt: ActionReceipt,
    pub message: String,
}

fn u256_to_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

fn mined_artifact(events: &[GameEvent]) -> Option<MinedArtifact> {
    events.iter().find_map(|e| match e {
        GameEvent::MiningResult {
            token_id,
            is_equipment,
            ..
        } => Some(MinedArtifact {
            token_id: token_id.to_string(),
            meta: item_metadata(u256_to_u64(*token_id)),
            is_equipment: *is_equipment,
        }),
        _ => None,
    })
}

fn enchant_result(events: &[GameEvent]) -> (bool, u64) {
    events
        .iter()
        .find_map(|e| match e {
            GameEvent::EnchantResult {
                success, new_level, ..
            } => Some((*success, u256_to_u64(*new_level))),
            _ => None,
        })
        .unwrap_or((false, 0))
}

fn require_positive(value: u64, field: &str) -> Result<U256> {
    if value == 0 {
        return Err(AppError::BadRequest(format!("{} must be greater than 0", field)));
    }
    Ok(U256::from(value))
}

/// POST /mine
pub async fn mine(
    State(state): State<AppState>,
    Json(req): Json<MineRequest>,
) -> Result<Json<ApiResponse<MineResponse>>> {
    let (actor, user) = state.authorize(ACTION_MINE, &req.auth).await?;

    let outcome = state.relay_action(actor, GameCall::Mine { user }).await?;
    let artifact = mined_artifact(&outcome.events);
    if artifact.is_none() {
        tracing::warn!("Mine {} confirmed without MiningResult", outcome.tx_hash_hex());
    }

    Ok(Json(ApiResponse::success(MineResponse {
        receipt: ActionReceipt::from(&outcome),
        artifact,
    })))
}

/// POST /workshop/enchant
pub async fn enchant(
    State(state): State<AppState>,
    Json(req): Json<EnchantRequest>,
) -> Result<Json<ApiResponse<EnchantResponse>>> {
    let (actor, user) = state.authorize(ACTION_ENCHANT, &req.auth).await?;

    let call = GameCall::Enchant {
        user,
        target_id: U256::from(req.target_id),
        material_id: U256::from(req.material_id),
    };
    let outcome = state.relay_action(actor, call).await?;
    let (upgraded, level) = enchant_result(&outcome.events);

    let message = if upgraded {
        "Upgrade Successful!"
    } else {
        "Upgrade Failed (Chip Burned)"
    };

    Ok(Json(ApiResponse::success(EnchantResponse {
        receipt: ActionReceipt::from(&outcome),
        upgraded,
        level,
        message: message.to_string(),
    })))
}

/// POST /salvage
pub async fn salvage(
    State(state): State<AppState>,
    Json(req): Json<SalvageRequest>,
) -> Result<Json<ApiResponse<SalvageResponse>>> {
    let amount = require_positive(req.amount, "amount")?;
    let (actor, user) = state.authorize(ACTION_SALVAGE, &req.auth).await?;

    let call = GameCall::Salvage {
        user,
        token_id: U256::from(req.token_id),
        amount,
    };
    let outcome = state.relay_action(actor, call).await?;

    Ok(Json(ApiResponse::success(SalvageResponse {
        receipt: ActionReceipt::from(&outcome),
        message: "Salvage Complete".to_string(),
    })))
}

/// POST /equip
pub async fn equip(
    State(state): State<AppState>,
    Json(req): Json<ItemRequest>,
) -> Result<Json<ApiResponse<ActionReceipt>>> {
    let (actor, user) = state.authorize(ACTION_EQUIP, &req.auth).await?;

    let call = GameCall::Equip {
        user,
        item_id: U256::from(req.item_id),
    };
    let outcome = state.relay_action(actor, call).await?;
    Ok(Json(ApiResponse::success(ActionReceipt::from(&outcome))))
}

/// POST /shop/software
pub async fn buy_software(
    State(state): State<AppState>,
    Json(req): Json<ItemRequest>,
) -> Result<Json<ApiResponse<ActionReceipt>>> {
    let (actor, user) = state.authorize(ACTION_BUY, &req.auth).await?;

    let call = GameCall::BuySoftware {
        user,
        item_id: U256::from(req.item_id),
    };
    let outcome = state.relay_action(actor, call).await?;
    Ok(Json(ApiResponse::success(ActionReceipt::from(&outcome))))
}

/// POST /use
pub async fn use_item(
    State(state): State<AppState>,
    Json(req): Json<ItemRequest>,
) -> Result<Json<ApiResponse<ActionReceipt>>> {
    let (actor, user) = state.authorize(ACTION_USE, &req.auth).await?;

    let call = GameCall::UseItem {
        user,
        item_id: U256::from(req.item_id),
    };
    let outcome = state.relay_action(actor, call).await?;
    Ok(Json(ApiResponse::success(ActionReceipt::from(&outcome))))
}
