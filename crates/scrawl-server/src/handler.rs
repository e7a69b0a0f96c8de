use uuid::Uuid;

use scrawl_common::canvas::ChatEntry;
use scrawl_common::game::{GameError, GuessOutcome, RoomPhase};
use scrawl_common::protocol::{ClientMessage, ErrorCode, ServerMessage};

use crate::registry::RoomRegistry;
use crate::room::Visibility;
use crate::round;
use crate::server::SharedState;

/// A message addressed to one connection or fanned out to several. Handlers
/// and timer callbacks fill an outbox while holding the registry lock, then
/// deliver it after the lock is dropped.
pub(crate) enum Outbound {
    One(Uuid, ServerMessage),
    Many(Vec<Uuid>, ServerMessage),
}

pub async fn handle_message(
    conn_id: Uuid,
    msg: ClientMessage,
    state: &SharedState,
) -> anyhow::Result<()> {
    match msg {
        ClientMessage::CreateRoom {
            room_id,
            display_name,
            is_public,
        } => {
            let mut outbox = Vec::new();
            let joined;
            {
                let mut registry = state.registry.write().await;
                if registry.get(&room_id).is_some() {
                    // Creating over an existing id degrades to a join.
                    joined = join_room_locked(
                        &mut registry,
                        &room_id,
                        &display_name,
                        conn_id,
                        &mut outbox,
                    );
                } else {
                    let visibility = if is_public {
                        Visibility::Public
                    } else {
                        Visibility::Private
                    };
                    let room = registry.create_room(&room_id, &display_name, conn_id, visibility);
                    outbox.push(Outbound::One(
                        conn_id,
                        ServerMessage::RoomCreated {
                            room_id: room.id.clone(),
                            members: room.game.members.clone(),
                        },
                    ));
                    joined = true;
                }
            }
            if joined {
                leave_previous_room(state, conn_id, &room_id).await;
                record_membership(state, conn_id, &room_id, &display_name).await;
            }
            deliver(state, outbox).await;
        }

        ClientMessage::JoinRoom {
            room_id,
            display_name,
        } => {
            let mut outbox = Vec::new();
            let joined = {
                let mut registry = state.registry.write().await;
                join_room_locked(&mut registry, &room_id, &display_name, conn_id, &mut outbox)
            };
            if joined {
                leave_previous_room(state, conn_id, &room_id).await;
                record_membership(state, conn_id, &room_id, &display_name).await;
            }
            deliver(state, outbox).await;
        }

        ClientMessage::LeaveRoom {
            room_id,
            display_name,
        } => {
            leave_room(state, &room_id, &display_name, Some(conn_id)).await;
        }

        ClientMessage::GetPublicRooms => {
            let rooms = state.registry.read().await.list_public();
            let outbox = vec![Outbound::One(
                conn_id,
                ServerMessage::PublicRooms { rooms },
            )];
            deliver(state, outbox).await;
        }

        ClientMessage::StartGame { room_id } => {
            let mut outbox = Vec::new();
            {
                let mut registry = state.registry.write().await;
                match registry.get_mut(&room_id) {
                    None => outbox.push(Outbound::One(
                        conn_id,
                        error(ErrorCode::RoomNotFound, "Room not found"),
                    )),
                    Some(room) => match room.game.can_start() {
                        Ok(()) => round::begin_round(state, room, &mut outbox),
                        Err(GameError::NotEnoughPlayers) => outbox.push(Outbound::One(
                            conn_id,
                            error(ErrorCode::NotEnoughPlayers, "Need at least 2 players"),
                        )),
                        // Already started: a benign client race, not an error.
                        Err(_) => {}
                    },
                }
            }
            deliver(state, outbox).await;
        }

        ClientMessage::WordChosen {
            room_id,
            display_name,
            word,
        } => {
            let mut outbox = Vec::new();
            {
                let mut registry = state.registry.write().await;
                if let Some(room) = registry.get_mut(&room_id) {
                    // Out-of-turn or unoffered choices are dropped silently.
                    if let Ok(word) = room.game.choose_word(&display_name, &word) {
                        round::start_guessing(state, room, &word, &mut outbox);
                    }
                }
            }
            deliver(state, outbox).await;
        }

        ClientMessage::Drawing {
            room_id,
            display_name,
            stroke,
        } => {
            let mut outbox = Vec::new();
            {
                let mut registry = state.registry.write().await;
                if let Some(room) = registry.get_mut(&room_id) {
                    // Strokes from anyone but the drawer are stale or racing
                    // clients; drop them without comment.
                    if room.game.is_drawer(&display_name) {
                        room.strokes.push(stroke.clone());
                        outbox.push(Outbound::Many(
                            room.member_conns_except(&display_name),
                            ServerMessage::Drawing { stroke },
                        ));
                    }
                }
            }
            deliver(state, outbox).await;
        }

        ClientMessage::Guess {
            room_id,
            display_name,
            text,
        } => {
            let mut outbox = Vec::new();
            {
                let mut registry = state.registry.write().await;
                if let Some(room) = registry.get_mut(&room_id) {
                    if room.game.is_member(&display_name) {
                        // Guesses are visible chat even when wrong.
                        let entry = ChatEntry::new(&display_name, &text);
                        let at = entry.at;
                        room.chat.push(entry);
                        outbox.push(Outbound::Many(
                            room.member_conns(),
                            ServerMessage::Guess {
                                display_name: display_name.clone(),
                                text: text.clone(),
                                at,
                            },
                        ));
                        if let GuessOutcome::Correct { word } =
                            room.game.evaluate_guess(&display_name, &text)
                        {
                            tracing::info!(
                                "Room '{}': '{}' guessed the word",
                                room_id,
                                display_name
                            );
                            outbox.push(Outbound::Many(
                                room.member_conns(),
                                ServerMessage::CorrectGuess {
                                    display_name: display_name.clone(),
                                    word,
                                },
                            ));
                            round::advance(state, room, &mut outbox);
                        }
                    }
                }
            }
            deliver(state, outbox).await;
        }

        ClientMessage::ClearCanvas { room_id } => {
            let sender = {
                let conns = state.connections.read().await;
                conns.get(&conn_id).map(|c| c.display_name.clone())
            };
            let Some(sender) = sender else {
                return Ok(());
            };
            let mut outbox = Vec::new();
            {
                let mut registry = state.registry.write().await;
                if let Some(room) = registry.get_mut(&room_id) {
                    let allowed = match room.game.phase {
                        RoomPhase::Lobby => room.game.is_member(&sender),
                        _ => room.game.is_drawer(&sender),
                    };
                    if allowed {
                        room.strokes.clear();
                        outbox.push(Outbound::Many(
                            room.member_conns(),
                            ServerMessage::ResetCanvas,
                        ));
                    }
                }
            }
            deliver(state, outbox).await;
        }

        ClientMessage::Ping => {
            deliver(state, vec![Outbound::One(conn_id, ServerMessage::Pong)]).await;
        }

        ClientMessage::Disconnect => {
            handle_disconnect(conn_id, state).await;
        }

        // A second Hello after the handshake has nothing to do.
        ClientMessage::Hello { .. } => {}
    }

    Ok(())
}

pub async fn handle_disconnect(conn_id: Uuid, state: &SharedState) {
    let membership = {
        let conns = state.connections.read().await;
        conns
            .get(&conn_id)
            .map(|c| (c.room_id.clone(), c.display_name.clone()))
    };

    if let Some((Some(room_id), name)) = membership {
        leave_room(state, &room_id, &name, None).await;
    }

    state.connections.write().await.remove(&conn_id);
}

/// Shared join path for `JoinRoom` and create-over-existing-id. Returns
/// whether the join succeeded.
fn join_room_locked(
    registry: &mut RoomRegistry,
    room_id: &str,
    name: &str,
    conn_id: Uuid,
    outbox: &mut Vec<Outbound>,
) -> bool {
    let Some(room) = registry.get_mut(room_id) else {
        outbox.push(Outbound::One(
            conn_id,
            error(ErrorCode::RoomNotFound, "Room not found"),
        ));
        return false;
    };
    match room.add_member(name, conn_id) {
        Ok(()) => {
            tracing::info!("'{}' joined room '{}'", name, room_id);
            outbox.push(Outbound::One(
                conn_id,
                ServerMessage::RoomJoined {
                    room_id: room.id.clone(),
                    room_state: room.snapshot(),
                },
            ));
            outbox.push(Outbound::Many(
                room.member_conns_except(name),
                ServerMessage::UserJoined {
                    display_name: name.to_string(),
                    members: room.game.members.clone(),
                },
            ));
            true
        }
        Err(_) => {
            outbox.push(Outbound::One(
                conn_id,
                error(
                    ErrorCode::NameTaken,
                    "Display name already taken in this room",
                ),
            ));
            false
        }
    }
}

/// Remove a member; destroy the room if it emptied, end the round early if
/// the drawer left. `conn_id` is the leaver's connection when it is still
/// alive (a voluntary leave rather than a disconnect).
async fn leave_room(state: &SharedState, room_id: &str, name: &str, conn_id: Option<Uuid>) {
    let mut outbox = Vec::new();
    {
        let mut registry = state.registry.write().await;
        let mut departure = None;
        if let Some(room) = registry.get_mut(room_id) {
            let d = room.remove_member(name);
            if d.was_member {
                tracing::info!("'{}' left room '{}'", name, room_id);
                outbox.push(Outbound::Many(
                    room.member_conns(),
                    ServerMessage::UserLeft {
                        display_name: name.to_string(),
                        members: room.game.members.clone(),
                    },
                ));
                departure = Some(d);
            }
        }
        if let Some(d) = departure {
            if d.now_empty {
                registry.remove(room_id);
            } else if d.was_drawer {
                if let Some(room) = registry.get_mut(room_id) {
                    round::drawer_left(state, room, &mut outbox);
                }
            }
        }
    }

    if let Some(conn_id) = conn_id {
        outbox.push(Outbound::One(conn_id, ServerMessage::LeaveRoom));
        let mut conns = state.connections.write().await;
        if let Some(conn) = conns.get_mut(&conn_id) {
            if conn.room_id.as_deref() == Some(room_id) {
                conn.room_id = None;
            }
        }
    }

    deliver(state, outbox).await;
}

/// A connection is a member of at most one room: before binding it to the
/// room it just created or joined, run the leave path for the previous one
/// so that room does not keep a ghost member with a dead channel.
async fn leave_previous_room(state: &SharedState, conn_id: Uuid, new_room_id: &str) {
    let previous = {
        let conns = state.connections.read().await;
        conns.get(&conn_id).and_then(|c| {
            c.room_id
                .clone()
                .map(|room_id| (room_id, c.display_name.clone()))
        })
    };
    if let Some((room_id, name)) = previous {
        if room_id != new_room_id {
            leave_room(state, &room_id, &name, None).await;
        }
    }
}

/// Bind a connection to the room it just created or joined.
async fn record_membership(state: &SharedState, conn_id: Uuid, room_id: &str, name: &str) {
    let mut conns = state.connections.write().await;
    if let Some(conn) = conns.get_mut(&conn_id) {
        conn.room_id = Some(room_id.to_string());
        conn.display_name = name.to_string();
    }
}

fn error(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error {
        code,
        message: message.to_string(),
    }
}

/// Send every outbox entry. Sends are fire-and-forget and never wait: a
/// full or closed per-connection channel drops the message for that client
/// only, so one stalled client cannot hold up the connection table.
pub(crate) async fn deliver(state: &SharedState, outbox: Vec<Outbound>) {
    if outbox.is_empty() {
        return;
    }
    let conns = state.connections.read().await;
    let mut push = |id: Uuid, msg: ServerMessage| {
        if let Some(conn) = conns.get(&id) {
            if conn.tx.try_send(msg).is_err() {
                tracing::debug!("Dropping message for slow or closed connection {}", id);
            }
        }
    };
    for out in outbox {
        match out {
            Outbound::One(id, msg) => push(id, msg),
            Outbound::Many(ids, msg) => {
                for id in ids {
                    push(id, msg.clone());
                }
            }
        }
    }
}
