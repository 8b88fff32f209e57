use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ==================== PLAYER ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAccount {
    pub address: String,
    pub hash_balance: Decimal,
    pub last_seen: Option<DateTime<Utc>>,
    pub joined_seq: i64,
}

// ==================== API RESPONSE ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_success_sets_flag() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, "ok");
    }

    #[test]
    fn player_account_serializes_camel_case() {
        let player = PlayerAccount {
            address: "0xabc".into(),
            hash_balance: Decimal::new(125, 1),
            last_seen: None,
            joined_seq: 1,
        };
        let json = serde_json::to_value(&player).unwrap();
        assert!(json.get("hashBalance").is_some());
        assert!(json.get("joinedSeq").is_some());
    }
}
