use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::canvas::{ChatEntry, Stroke};
use crate::lobby::PublicRoomInfo;

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(64 * 1024)
        .new_framed(stream)
}

// -- Client -> Server Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    // Handshake
    Hello {
        display_name: String,
        version: String,
    },

    // Rooms
    CreateRoom {
        room_id: String,
        display_name: String,
        is_public: bool,
    },
    JoinRoom {
        room_id: String,
        display_name: String,
    },
    LeaveRoom {
        room_id: String,
        display_name: String,
    },
    GetPublicRooms,

    // Gameplay
    StartGame {
        room_id: String,
    },
    WordChosen {
        room_id: String,
        display_name: String,
        word: String,
    },
    Drawing {
        room_id: String,
        display_name: String,
        stroke: Stroke,
    },
    Guess {
        room_id: String,
        display_name: String,
        text: String,
    },
    ClearCanvas {
        room_id: String,
    },

    // Connection
    Ping,
    Disconnect,
}

// -- Server -> Client Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    // Handshake
    Welcome {
        server_version: String,
    },
    HandshakeError {
        reason: String,
    },

    // Rooms
    RoomCreated {
        room_id: String,
        members: Vec<String>,
    },
    RoomJoined {
        room_id: String,
        room_state: RoomSnapshot,
    },
    UserJoined {
        display_name: String,
        members: Vec<String>,
    },
    UserLeft {
        display_name: String,
        members: Vec<String>,
    },
    PublicRooms {
        rooms: Vec<PublicRoomInfo>,
    },

    // Round flow
    NewRound {
        drawer: String,
        word_choices: Vec<String>,
        members: Vec<String>,
    },
    /// `word` is populated only in the copy sent to the drawer.
    WordSelected {
        word: Option<String>,
    },
    /// `word` is populated only in the copy sent to the drawer.
    StartGuessing {
        word: Option<String>,
        countdown: u64,
    },
    UpdateCountdown {
        countdown: u64,
    },
    CorrectGuess {
        display_name: String,
        word: String,
    },
    EndGame {
        scores: Vec<(String, u32)>,
    },
    LeaveRoomCountdown {
        countdown: u64,
    },
    LeaveRoom,

    // Canvas / chat fan-out
    Drawing {
        stroke: Stroke,
    },
    ResetCanvas,
    Guess {
        display_name: String,
        text: String,
        at: i64,
    },

    // Errors
    Error {
        code: ErrorCode,
        message: String,
    },

    // Connection
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NameTaken,
    RoomNotFound,
    NotEnoughPlayers,
}

/// Everything a late joiner needs to catch up: membership, the current
/// drawer, and the full stroke and chat history in append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub members: Vec<String>,
    pub drawer: Option<String>,
    pub strokes: Vec<Stroke>,
    pub chat: Vec<ChatEntry>,
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Point;

    fn stroke() -> Stroke {
        Stroke {
            color: "#224488".into(),
            thickness: 2.5,
            path: vec![Point { x: 1.0, y: 2.0 }, Point { x: 3.0, y: 4.0 }],
        }
    }

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::CreateRoom {
            room_id: "r1".into(),
            display_name: "Alice".into(),
            is_public: true,
        };
        let bytes = serialize_message(&msg).unwrap();
        let deserialized: ClientMessage = deserialize_message(&bytes).unwrap();
        match deserialized {
            ClientMessage::CreateRoom {
                room_id,
                display_name,
                is_public,
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(display_name, "Alice");
                assert!(is_public);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_drawer_only_word_serialization() {
        let to_drawer = ServerMessage::StartGuessing {
            word: Some("cat".into()),
            countdown: 120,
        };
        let to_room = ServerMessage::StartGuessing {
            word: None,
            countdown: 120,
        };
        let drawer_json = String::from_utf8(serialize_message(&to_drawer).unwrap().to_vec()).unwrap();
        let room_json = String::from_utf8(serialize_message(&to_room).unwrap().to_vec()).unwrap();
        assert!(drawer_json.contains("cat"));
        assert!(!room_json.contains("cat"));
    }

    #[test]
    fn test_room_snapshot_round_trip() {
        let msg = ServerMessage::RoomJoined {
            room_id: "r1".into(),
            room_state: RoomSnapshot {
                room_id: "r1".into(),
                members: vec!["A".into(), "B".into()],
                drawer: Some("A".into()),
                strokes: vec![stroke()],
                chat: vec![ChatEntry::new("B", "hello")],
            },
        };
        let bytes = serialize_message(&msg).unwrap();
        let deserialized: ServerMessage = deserialize_message(&bytes).unwrap();
        match deserialized {
            ServerMessage::RoomJoined { room_state, .. } => {
                assert_eq!(room_state.members, vec!["A", "B"]);
                assert_eq!(room_state.drawer.as_deref(), Some("A"));
                assert_eq!(room_state.strokes.len(), 1);
                assert_eq!(room_state.chat.len(), 1);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_all_client_messages_serialize() {
        let messages = vec![
            ClientMessage::Hello {
                display_name: "Test".into(),
                version: "0.1.0".into(),
            },
            ClientMessage::CreateRoom {
                room_id: "r1".into(),
                display_name: "A".into(),
                is_public: false,
            },
            ClientMessage::JoinRoom {
                room_id: "r1".into(),
                display_name: "B".into(),
            },
            ClientMessage::LeaveRoom {
                room_id: "r1".into(),
                display_name: "B".into(),
            },
            ClientMessage::GetPublicRooms,
            ClientMessage::StartGame {
                room_id: "r1".into(),
            },
            ClientMessage::WordChosen {
                room_id: "r1".into(),
                display_name: "A".into(),
                word: "cat".into(),
            },
            ClientMessage::Drawing {
                room_id: "r1".into(),
                display_name: "A".into(),
                stroke: stroke(),
            },
            ClientMessage::Guess {
                room_id: "r1".into(),
                display_name: "B".into(),
                text: "cat".into(),
            },
            ClientMessage::ClearCanvas {
                room_id: "r1".into(),
            },
            ClientMessage::Ping,
            ClientMessage::Disconnect,
        ];

        for msg in &messages {
            let bytes = serialize_message(msg).unwrap();
            let _: ClientMessage = deserialize_message(&bytes).unwrap();
        }
    }
}
