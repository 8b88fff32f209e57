/// Application constants

// Action tags (signed message prefix, one per endpoint)
pub const ACTION_MINE: &str = "MINE_ACTION";
pub const ACTION_ENCHANT: &str = "ENCHANT_ACTION";
pub const ACTION_SALVAGE: &str = "SALVAGE_ACTION";
pub const ACTION_EQUIP: &str = "EQUIP_ACTION";
pub const ACTION_BUY: &str = "BUY_ACTION";
pub const ACTION_USE: &str = "USE_ACTION";
pub const ACTION_STAKE: &str = "STAKE_ACTION";
pub const ACTION_UNSTAKE: &str = "UNSTAKE_ACTION";
pub const ACTION_CLAIM_YIELD: &str = "CLAIM_YIELD_ACTION";
pub const ACTION_CLAIM_MISSION: &str = "CLAIM_MISSION_ACTION";

// Items
pub const RARE_ARTIFACT_ID: u64 = 5; // Genesis Block
pub const INVENTORY_ITEM_IDS: [u64; 15] = [
    1, 2, 3, 4, 5, 99, 101, 102, 103, 201, 202, 203, 301, 302, 401,
];

// HASH token
pub const HASH_DECIMALS: u32 = 18;

// Missions
pub const MIN_DAILY_MISSIONS: usize = 3;
pub const MAX_DAILY_MISSIONS: usize = 5;

// Leaderboard
pub const LEADERBOARD_DEFAULT_SIZE: i64 = 20;
pub const LEADERBOARD_MAX_SIZE: i64 = 100;

// Relayer defaults
pub const DEFAULT_RELAYER_GAS_LIMIT: u64 = 500_000;
pub const DEFAULT_RELAYER_CONFIRM_TIMEOUT_SECS: u64 = 60;

// Signed-action nonce window
pub const DEFAULT_SIGNATURE_MAX_AGE_SECS: u64 = 300;
pub const NONCE_KEY_PREFIX: &str = "cyberrng:nonce";

// Claim reservation lease / reconciler
pub const DEFAULT_CLAIM_LEASE_SECS: u64 = 600;
pub const DEFAULT_CLAIM_RECONCILE_INTERVAL_SECS: u64 = 60;
pub const CLAIM_TX_RECORD_ATTEMPTS: u32 = 3;
pub const CLAIM_TX_RECORD_BACKOFF_MS: u64 = 50;

// Progress gates kept in memory before idle ones are pruned
pub const PROGRESS_GATE_PRUNE_THRESHOLD: usize = 4_096;
