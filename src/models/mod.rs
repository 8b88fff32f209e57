// src/models/mod.rs
pub mod item;
pub mod mission;
pub mod user;

pub use item::{item_metadata, ItemMeta};
pub use mission::{MissionDraft, MissionInstance, MissionKey, MissionStatus};
pub use user::{ApiResponse, PlayerAccount};
