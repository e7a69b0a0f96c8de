use serde::{Deserialize, Serialize};

/// Public-room directory entry, as returned by `GetPublicRooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicRoomInfo {
    pub room_id: String,
    pub creator_name: String,
    pub member_count: usize,
}
