//! Round orchestration: phase transitions and the per-room timers.
//!
//! Transitions are synchronous and run under the registry write lock; they
//! mutate the room and push targeted messages into an outbox the caller
//! delivers after dropping the lock. Timer callbacks re-fetch the room by id
//! and compare the timer epoch before acting, so a timer firing after
//! teardown (or after the phase already moved on) is a silent no-op.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use scrawl_common::game::{
    RoomPhase, RoundConclusion, GUESSING_SECS, SELECTION_SECS, TEARDOWN_SECS, WORD_CHOICES,
};
use scrawl_common::protocol::ServerMessage;

use crate::handler::{deliver, Outbound};
use crate::room::Room;
use crate::server::SharedState;

/// Enter `WordSelection`: rotate the drawer, sample the word choices, reset
/// the canvas, and arm the selection-timeout timer.
pub(crate) fn begin_round(state: &SharedState, room: &mut Room, outbox: &mut Vec<Outbound>) {
    room.cancel_timer();

    let mut rng = StdRng::from_entropy();
    let choices = state.words.sample(WORD_CHOICES, &mut rng);
    let drawer = match room.game.begin_round(choices.clone(), &mut rng) {
        Ok(drawer) => drawer,
        Err(e) => {
            // Guarded by the callers; an exhausted rotation here is a bug,
            // not a reason to take the registry down.
            tracing::error!("Room '{}': cannot begin round: {}", room.id, e);
            return;
        }
    };
    tracing::debug!("Room '{}': new round, drawer '{}'", room.id, drawer);

    room.strokes.clear();
    let everyone = room.member_conns();
    outbox.push(Outbound::Many(
        everyone.clone(),
        ServerMessage::NewRound {
            drawer,
            word_choices: choices,
            members: room.game.members.clone(),
        },
    ));
    outbox.push(Outbound::Many(everyone, ServerMessage::ResetCanvas));

    let epoch = room.timer_epoch;
    let task_state = state.clone();
    let room_id = room.id.clone();
    room.store_timer(tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(SELECTION_SECS)).await;
        selection_timeout(task_state, room_id, epoch).await;
    }));
}

/// Enter `Guessing` with the chosen (or fallback) word: the drawer alone
/// learns the literal word, everyone gets the countdown.
pub(crate) fn start_guessing(
    state: &SharedState,
    room: &mut Room,
    word: &str,
    outbox: &mut Vec<Outbound>,
) {
    room.cancel_timer();

    let drawer = room.game.current_drawer.clone().unwrap_or_default();
    let others = room.member_conns_except(&drawer);
    if let Some(conn) = room.conn_of(&drawer) {
        outbox.push(Outbound::One(
            conn,
            ServerMessage::WordSelected {
                word: Some(word.to_string()),
            },
        ));
        outbox.push(Outbound::One(
            conn,
            ServerMessage::StartGuessing {
                word: Some(word.to_string()),
                countdown: GUESSING_SECS,
            },
        ));
    }
    outbox.push(Outbound::Many(
        others.clone(),
        ServerMessage::WordSelected { word: None },
    ));
    outbox.push(Outbound::Many(
        others,
        ServerMessage::StartGuessing {
            word: None,
            countdown: GUESSING_SECS,
        },
    ));

    let epoch = room.timer_epoch;
    let task_state = state.clone();
    let room_id = room.id.clone();
    room.store_timer(tokio::spawn(guess_countdown(task_state, room_id, epoch)));
}

/// Leave `RoundEnd`: either the next rotation or the final scoreboard.
pub(crate) fn advance(state: &SharedState, room: &mut Room, outbox: &mut Vec<Outbound>) {
    match room.game.conclude_round() {
        Ok(RoundConclusion::NextRound) => begin_round(state, room, outbox),
        Ok(RoundConclusion::GameOver) => enter_game_end(state, room, outbox),
        Err(e) => tracing::warn!("Room '{}': cannot conclude round: {}", room.id, e),
    }
}

/// The current drawer left mid-round: end the round early and move on.
/// Outside an active round (the teardown countdown, say) the departure has
/// no phase effect and the live timer must stay armed.
pub(crate) fn drawer_left(state: &SharedState, room: &mut Room, outbox: &mut Vec<Outbound>) {
    if !matches!(
        room.game.phase,
        RoomPhase::WordSelection | RoomPhase::Guessing
    ) {
        return;
    }
    room.cancel_timer();
    if room.game.end_round().is_ok() {
        tracing::debug!("Room '{}': drawer left, ending round early", room.id);
        advance(state, room, outbox);
    }
}

/// Enter `GameEnd`: broadcast the scoreboard and arm the teardown countdown.
fn enter_game_end(state: &SharedState, room: &mut Room, outbox: &mut Vec<Outbound>) {
    room.cancel_timer();
    let scores = room.game.scores();
    tracing::info!("Room '{}': game over, scores {:?}", room.id, scores);
    let everyone = room.member_conns();
    outbox.push(Outbound::Many(
        everyone.clone(),
        ServerMessage::EndGame { scores },
    ));
    // Announce the full window; the spawned task ticks from here down.
    outbox.push(Outbound::Many(
        everyone,
        ServerMessage::LeaveRoomCountdown {
            countdown: TEARDOWN_SECS,
        },
    ));

    let epoch = room.timer_epoch;
    let task_state = state.clone();
    let room_id = room.id.clone();
    room.store_timer(tokio::spawn(teardown_countdown(task_state, room_id, epoch)));
}

/// Word-selection window expired: the first offered word is the word.
async fn selection_timeout(state: SharedState, room_id: String, epoch: u64) {
    let mut outbox = Vec::new();
    {
        let mut registry = state.registry.write().await;
        let Some(room) = registry.get_mut(&room_id) else {
            return;
        };
        if room.timer_epoch != epoch {
            return;
        }
        room.disarm_timer();
        let Ok(word) = room.game.choose_fallback_word() else {
            return;
        };
        tracing::debug!("Room '{}': selection timed out, falling back to first word", room_id);
        start_guessing(&state, room, &word, &mut outbox);
    }
    deliver(&state, outbox).await;
}

/// Ticks the guessing countdown once per second; at zero the round ends as
/// if the word had never been guessed. The opening value rides on
/// `StartGuessing`, so the first tick here is one below it.
async fn guess_countdown(state: SharedState, room_id: String, epoch: u64) {
    let mut remaining = GUESSING_SECS;
    while remaining > 0 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        remaining -= 1;

        let mut outbox = Vec::new();
        {
            let mut registry = state.registry.write().await;
            let Some(room) = registry.get_mut(&room_id) else {
                return;
            };
            if room.timer_epoch != epoch {
                return;
            }
            outbox.push(Outbound::Many(
                room.member_conns(),
                ServerMessage::UpdateCountdown {
                    countdown: remaining,
                },
            ));
            if remaining == 0 {
                room.disarm_timer();
                if room.game.end_round().is_ok() {
                    tracing::debug!("Room '{}': guessing timed out", room_id);
                    advance(&state, room, &mut outbox);
                }
            }
        }
        deliver(&state, outbox).await;
    }
}

/// Post-game countdown; at zero (or earlier, if the room already emptied and
/// was destroyed) the room is torn down and members are told to leave.
async fn teardown_countdown(state: SharedState, room_id: String, epoch: u64) {
    let mut remaining = TEARDOWN_SECS;
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        remaining -= 1;

        let mut outbox = Vec::new();
        let mut evicted: Vec<uuid::Uuid> = Vec::new();
        {
            let mut registry = state.registry.write().await;
            let Some(room) = registry.get_mut(&room_id) else {
                return;
            };
            if room.timer_epoch != epoch {
                return;
            }
            let everyone = room.member_conns();
            outbox.push(Outbound::Many(
                everyone.clone(),
                ServerMessage::LeaveRoomCountdown {
                    countdown: remaining,
                },
            ));
            if remaining == 0 {
                room.disarm_timer();
                registry.remove(&room_id);
                outbox.push(Outbound::Many(everyone.clone(), ServerMessage::LeaveRoom));
                evicted = everyone;
            }
        }
        deliver(&state, outbox).await;

        if remaining == 0 {
            let mut conns = state.connections.write().await;
            for id in evicted {
                if let Some(conn) = conns.get_mut(&id) {
                    if conn.room_id.as_deref() == Some(room_id.as_str()) {
                        conn.room_id = None;
                    }
                }
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use scrawl_common::words::WordBank;

    use crate::connection::ConnectionHandle;
    use crate::room::Visibility;
    use crate::server::ServerState;

    fn words() -> WordBank {
        WordBank::new(vec![
            "cat".into(),
            "dog".into(),
            "fish".into(),
            "bird".into(),
            "owl".into(),
        ])
        .unwrap()
    }

    /// A registered room with one connection per member, all marked as
    /// members of that room. Receivers are returned so tests can assert on
    /// delivered messages (and so the channels stay open).
    async fn state_with_room(
        room_id: &str,
        names: &[&str],
    ) -> (SharedState, Vec<Uuid>, Vec<mpsc::Receiver<ServerMessage>>) {
        let state = ServerState::shared(words(), 10);
        let mut conn_ids = Vec::new();
        let mut receivers = Vec::new();
        {
            let mut conns = state.connections.write().await;
            let mut registry = state.registry.write().await;
            for (i, name) in names.iter().enumerate() {
                let (tx, rx) = mpsc::channel(256);
                let conn_id = Uuid::new_v4();
                conns.insert(
                    conn_id,
                    ConnectionHandle {
                        display_name: name.to_string(),
                        tx,
                        room_id: Some(room_id.to_string()),
                    },
                );
                if i == 0 {
                    registry.create_room(room_id, name, conn_id, Visibility::Public);
                } else {
                    let room = registry.get_mut(room_id).unwrap();
                    room.add_member(name, conn_id).unwrap();
                }
                conn_ids.push(conn_id);
                receivers.push(rx);
            }
        }
        (state, conn_ids, receivers)
    }

    async fn start_round(state: &SharedState, room_id: &str) {
        let mut outbox = Vec::new();
        {
            let mut registry = state.registry.write().await;
            let room = registry.get_mut(room_id).unwrap();
            begin_round(state, room, &mut outbox);
        }
        deliver(state, outbox).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_timeout_falls_back_to_first_word() {
        let (state, _conns, _rx) = state_with_room("r1", &["A", "B"]).await;
        start_round(&state, "r1").await;

        let offered = {
            let registry = state.registry.read().await;
            let room = registry.get("r1").unwrap();
            assert_eq!(room.game.phase, RoomPhase::WordSelection);
            room.game.word_choices.clone()
        };

        tokio::time::sleep(Duration::from_secs(SELECTION_SECS + 1)).await;

        let registry = state.registry.read().await;
        let room = registry.get("r1").unwrap();
        assert_eq!(room.game.phase, RoomPhase::Guessing);
        assert_eq!(room.game.current_word, offered.first().cloned());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_selection_timer_does_not_fire() {
        let (state, _conns, _rx) = state_with_room("r1", &["A", "B"]).await;
        start_round(&state, "r1").await;

        {
            let mut registry = state.registry.write().await;
            registry.get_mut("r1").unwrap().cancel_timer();
        }

        tokio::time::sleep(Duration::from_secs(SELECTION_SECS + 5)).await;

        let registry = state.registry.read().await;
        assert_eq!(
            registry.get("r1").unwrap().game.phase,
            RoomPhase::WordSelection
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_callback_is_a_noop() {
        let (state, _conns, _rx) = state_with_room("r1", &["A", "B"]).await;
        start_round(&state, "r1").await;

        // Wrong epoch: the callback must leave the room untouched.
        selection_timeout(state.clone(), "r1".into(), 999).await;
        {
            let registry = state.registry.read().await;
            assert_eq!(
                registry.get("r1").unwrap().game.phase,
                RoomPhase::WordSelection
            );
        }

        // Room already destroyed: nothing to act on.
        selection_timeout(state.clone(), "gone".into(), 0).await;
        let registry = state.registry.read().await;
        assert!(registry.get("gone").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guess_countdown_expiry_ends_the_round() {
        let (state, _conns, _rx) = state_with_room("r1", &["A", "B"]).await;
        start_round(&state, "r1").await;

        // Selection falls back, then the full guessing window passes with no
        // correct guess: one member has now drawn, so the next rotation
        // begins instead of the scoreboard.
        tokio::time::sleep(Duration::from_secs(SELECTION_SECS + GUESSING_SECS + 2)).await;

        let registry = state.registry.read().await;
        let room = registry.get("r1").unwrap();
        assert_eq!(room.game.phase, RoomPhase::WordSelection);
        assert_eq!(room.game.has_drawn.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unattended_game_times_out_and_tears_down() {
        let (state, conn_ids, _rx) = state_with_room("r1", &["A", "B"]).await;
        start_round(&state, "r1").await;

        // Two full untouched rotations plus the teardown window.
        let full_game = 2 * (SELECTION_SECS + GUESSING_SECS) + TEARDOWN_SECS;
        tokio::time::sleep(Duration::from_secs(full_game + 10)).await;

        {
            let registry = state.registry.read().await;
            assert!(registry.get("r1").is_none());
        }
        let conns = state.connections.read().await;
        for id in &conn_ids {
            assert_eq!(conns.get(id).unwrap().room_id, None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_end_announces_full_teardown_window() {
        let (state, _conns, mut receivers) = state_with_room("r1", &["A", "B"]).await;

        let mut outbox = Vec::new();
        {
            let mut registry = state.registry.write().await;
            let room = registry.get_mut("r1").unwrap();
            // Everyone has drawn and the round just closed.
            for name in room.game.members.clone() {
                room.game.has_drawn.insert(name);
            }
            room.game.phase = RoomPhase::RoundEnd;
            advance(&state, room, &mut outbox);
        }
        deliver(&state, outbox).await;

        let rx = &mut receivers[0];
        let first = rx.try_recv().unwrap();
        assert!(matches!(first, ServerMessage::EndGame { .. }));
        let second = rx.try_recv().unwrap();
        match second {
            ServerMessage::LeaveRoomCountdown { countdown } => {
                assert_eq!(countdown, TEARDOWN_SECS)
            }
            other => panic!("expected the opening countdown, got {:?}", other),
        }
    }
}
