use std::collections::HashMap;

use tokio::task::JoinHandle;
use uuid::Uuid;

use scrawl_common::canvas::{ChatEntry, Stroke};
use scrawl_common::game::{Departure, GameError, GameState};
use scrawl_common::lobby::PublicRoomInfo;
use scrawl_common::protocol::RoomSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// One game session: the rotation state machine plus the replayable stroke
/// and chat logs, the member connection map, and the room's single live
/// timer.
pub struct Room {
    pub id: String,
    pub visibility: Visibility,
    pub creator_name: String,
    pub game: GameState,
    pub strokes: Vec<Stroke>,
    pub chat: Vec<ChatEntry>,
    conns: HashMap<String, Uuid>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every timer cancellation. A timer callback that observes a
    /// different epoch than it was spawned with must not touch the room.
    pub timer_epoch: u64,
}

impl Room {
    pub fn new(id: String, creator_name: String, creator_conn: Uuid, visibility: Visibility) -> Self {
        Self {
            id,
            visibility,
            game: GameState::new(&creator_name),
            conns: HashMap::from([(creator_name.clone(), creator_conn)]),
            creator_name,
            strokes: Vec::new(),
            chat: Vec::new(),
            timer: None,
            timer_epoch: 0,
        }
    }

    pub fn add_member(&mut self, name: &str, conn: Uuid) -> Result<(), GameError> {
        self.game.add_member(name)?;
        self.conns.insert(name.to_string(), conn);
        Ok(())
    }

    pub fn remove_member(&mut self, name: &str) -> Departure {
        self.conns.remove(name);
        self.game.remove_member(name)
    }

    pub fn conn_of(&self, name: &str) -> Option<Uuid> {
        self.conns.get(name).copied()
    }

    /// Connection ids of all current members, in join order.
    pub fn member_conns(&self) -> Vec<Uuid> {
        self.game
            .members
            .iter()
            .filter_map(|m| self.conns.get(m).copied())
            .collect()
    }

    /// Member connections except the one named (room-minus-sender fan-out).
    pub fn member_conns_except(&self, name: &str) -> Vec<Uuid> {
        self.game
            .members
            .iter()
            .filter(|m| m.as_str() != name)
            .filter_map(|m| self.conns.get(m).copied())
            .collect()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            members: self.game.members.clone(),
            drawer: self.game.current_drawer.clone(),
            strokes: self.strokes.clone(),
            chat: self.chat.clone(),
        }
    }

    pub fn public_info(&self) -> PublicRoomInfo {
        PublicRoomInfo {
            room_id: self.id.clone(),
            creator_name: self.creator_name.clone(),
            member_count: self.game.members.len(),
        }
    }

    /// Abort the live timer, if any, and invalidate callbacks already in
    /// flight. Every phase transition calls this before scheduling anew.
    pub fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        self.timer_epoch += 1;
    }

    /// Store the newly scheduled timer. The caller cancels the previous one
    /// first so the room never has two live timers.
    pub fn store_timer(&mut self, handle: JoinHandle<()>) {
        debug_assert!(self.timer.is_none());
        self.timer = Some(handle);
    }

    /// Drop the timer handle without aborting it. Used by a timer callback
    /// on itself once its epoch check passed; aborting here would kill the
    /// callback mid-flight.
    pub fn disarm_timer(&mut self) {
        self.timer = None;
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}
