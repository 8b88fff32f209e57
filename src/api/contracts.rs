use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    constants::ACTION_CLAIM_MISSION,
    error::Result,
    models::{ApiResponse, MissionInstance, MissionStatus},
    services::claim_processor::ClaimReceipt,
    services::mission_ledger::{describe, utc_today},
};

use super::{path_address, AppState, SignedEnvelope};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionView {
    pub id: i64,
    pub type_tag: String,
    pub description: String,
    pub target: i32,
    pub progress: i32,
    pub reward: i64,
    pub status: MissionStatus,
    pub date: NaiveDate,
}

impl MissionView {
    pub fn from_instance(mission: &MissionInstance) -> Result<Self> {
        let key = mission.key()?;
        Ok(Self {
            id: mission.id,
            description: describe(&key.type_tag, mission.target),
            type_tag: key.type_tag,
            target: mission.target,
            progress: mission.progress,
            reward: key.reward,
            status: mission.status(),
            date: mission.date,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMissionRequest {
    #[serde(flatten)]
    pub auth: SignedEnvelope,
    pub mission_id: i64,
}

/// GET /contracts/{address}
pub async fn list_missions(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<Vec<MissionView>>>> {
    let (address, _) = path_address(&address)?;

    let missions = state.ledger.list(&address, utc_today()).await?;
    let views = missions
        .iter()
        .map(MissionView::from_instance)
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(ApiResponse::success(views)))
}

/// POST /contracts/claim
pub async fn claim_mission(
    State(state): State<AppState>,
    Json(req): Json<ClaimMissionRequest>,
) -> Result<Json<ApiResponse<ClaimReceipt>>> {
    let (actor, _) = state.authorize(ACTION_CLAIM_MISSION, &req.auth).await?;

    let receipt = state.claims.claim(&actor, req.mission_id).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn view_renders_description_and_status() {
        let mission = MissionInstance {
            id: 9,
            address: "0xabc".into(),
            mission_key: "SALVAGE:4:50".into(),
            target: 4,
            progress: 4,
            claimed: false,
            claim_locked_at: Some(Utc::now()),
            claim_tx_hash: Some("0x01".into()),
            claim_dispatched: true,
            date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        };

        let view = MissionView::from_instance(&mission).unwrap();
        assert_eq!(view.description, "Salvage 4 artifacts");
        assert_eq!(view.reward, 50);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["typeTag"], "SALVAGE");
        assert_eq!(json["status"], "CLAIM_IN_FLIGHT");
        assert_eq!(json["date"], "2026-10-18");
    }

    #[test]
    fn claim_body_parses() {
        let req: ClaimMissionRequest = serde_json::from_str(
            r#"{"userAddress":"0xabc","signature":"0x01","nonce":1,"missionId":12}"#,
        )
        .unwrap();
        assert_eq!(req.mission_id, 12);
    }
}
