use std::collections::HashMap;

use uuid::Uuid;

use scrawl_common::lobby::PublicRoomInfo;

use crate::room::{Room, Visibility};

/// Process-wide room table. The only shared mutable structure; everything
/// else is private to one room.
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Allocate a room with the creator as its sole member. The caller has
    /// already checked the id is unused; creating over an existing id is a
    /// join, handled upstream.
    pub fn create_room(
        &mut self,
        id: &str,
        creator_name: &str,
        creator_conn: Uuid,
        visibility: Visibility,
    ) -> &mut Room {
        tracing::info!("Room '{}' created by '{}'", id, creator_name);
        self.rooms.entry(id.to_string()).or_insert_with(|| {
            Room::new(
                id.to_string(),
                creator_name.to_string(),
                creator_conn,
                visibility,
            )
        })
    }

    pub fn get(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    /// Destroy a room, cancelling its timer. Idempotent: removing a room
    /// that is already gone is a no-op.
    pub fn remove(&mut self, id: &str) -> Option<Room> {
        let mut room = self.rooms.remove(id)?;
        room.cancel_timer();
        room.game.close();
        tracing::info!("Room '{}' destroyed", id);
        Some(room)
    }

    pub fn list_public(&self) -> Vec<PublicRoomInfo> {
        self.rooms
            .values()
            .filter(|r| r.visibility == Visibility::Public)
            .map(Room::public_info)
            .collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
