use axum::{extract::State, Json};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{ACTION_CLAIM_YIELD, ACTION_STAKE, ACTION_UNSTAKE},
    error::{AppError, Result},
    models::ApiResponse,
    services::onchain::GameCall,
};

use super::{hash_received, ActionReceipt, AppState, SignedEnvelope};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRequest {
    #[serde(flatten)]
    pub auth: SignedEnvelope,
    pub item_id: u64,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimYieldRequest {
    #[serde(flatten)]
    pub auth: SignedEnvelope,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimYieldResponse {
    #[serde(flatten)]
    pub receipt: ActionReceipt,
    /// HASH credited by this claim.
    pub claimed: String,
}

fn stake_amount(amount: u64) -> Result<U256> {
    if amount == 0 {
        return Err(AppError::BadRequest("amount must be greater than 0".to_string()));
    }
    Ok(U256::from(amount))
}

/// POST /rig/stake
pub async fn stake(
    State(state): State<AppState>,
    Json(req): Json<StakeRequest>,
) -> Result<Json<ApiResponse<ActionReceipt>>> {
    let amount = stake_amount(req.amount)?;
    let (actor, user) = state.authorize(ACTION_STAKE, &req.auth).await?;

    let call = GameCall::Stake {
        user,
        item_id: U256::from(req.item_id),
        amount,
    };
    let outcome = state.relay_action(actor, call).await?;
    Ok(Json(ApiResponse::success(ActionReceipt::from(&outcome))))
}

/// POST /rig/unstake
pub async fn unstake(
    State(state): State<AppState>,
    Json(req): Json<StakeRequest>,
) -> Result<Json<ApiResponse<ActionReceipt>>> {
    let amount = stake_amount(req.amount)?;
    let (actor, user) = state.authorize(ACTION_UNSTAKE, &req.auth).await?;

    let call = GameCall::Unstake {
        user,
        item_id: U256::from(req.item_id),
        amount,
    };
    let outcome = state.relay_action(actor, call).await?;
    Ok(Json(ApiResponse::success(ActionReceipt::from(&outcome))))
}

/// POST /rig/claim
pub async fn claim_yield(
    State(state): State<AppState>,
    Json(req): Json<ClaimYieldRequest>,
) -> Result<Json<ApiResponse<ClaimYieldResponse>>> {
    let (actor, user) = state.authorize(ACTION_CLAIM_YIELD, &req.auth).await?;

    let outcome = state.relay_action(actor, GameCall::ClaimYield { user }).await?;
    Ok(Json(ApiResponse::success(ClaimYieldResponse {
        claimed: hash_received(&outcome, user),
        receipt: ActionReceipt::from(&outcome),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_body_parses() {
        let req: StakeRequest = serde_json::from_str(
            r#"{"userAddress":"0xabc","signature":"0x01","nonce":7,"itemId":102,"amount":1}"#,
        )
        .unwrap();
        assert_eq!(req.item_id, 102);
        assert_eq!(stake_amount(req.amount).unwrap(), U256::one());
        assert!(stake_amount(0).is_err());
    }
}
