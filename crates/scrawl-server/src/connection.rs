use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use scrawl_common::protocol::{
    self, ClientMessage, ServerMessage, framed_transport, serialize_message,
};

use crate::handler;
use crate::server::SharedState;

pub struct ConnectionHandle {
    /// Display name from the handshake, replaced by the name used on a
    /// successful create/join.
    pub display_name: String,
    pub tx: mpsc::Sender<ServerMessage>,
    /// The room this connection is a member of, if any.
    pub room_id: Option<String>,
}

pub async fn handle_connection(stream: TcpStream, state: SharedState) -> anyhow::Result<()> {
    let mut transport = framed_transport(stream);

    // Step 1: Handshake -- expect Hello
    let hello: ClientMessage = match protocol::recv_message(&mut transport).await? {
        Some(msg) => msg,
        None => return Ok(()),
    };

    let (conn_id, display_name) = match hello {
        ClientMessage::Hello {
            display_name,
            version,
        } => {
            tracing::info!(
                "Client '{}' connected (client version: {})",
                display_name,
                version
            );
            protocol::send_message(
                &mut transport,
                &ServerMessage::Welcome {
                    server_version: env!("CARGO_PKG_VERSION").to_string(),
                },
            )
            .await?;
            (Uuid::new_v4(), display_name)
        }
        _ => {
            protocol::send_message(
                &mut transport,
                &ServerMessage::HandshakeError {
                    reason: "Expected Hello message".into(),
                },
            )
            .await?;
            return Ok(());
        }
    };

    // Step 2: Create mpsc channel for outbound messages
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // Register connection
    {
        let handle = ConnectionHandle {
            display_name: display_name.clone(),
            tx: tx.clone(),
            room_id: None,
        };
        state.connections.write().await.insert(conn_id, handle);
    }

    // Step 3: Split transport for independent read/write
    let (mut sink, mut stream) = transport.split();

    // Writer task: drains rx and writes to sink
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serialize_message(&msg) {
                Ok(bytes) => {
                    if sink.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    // Step 4: Reader loop
    loop {
        match stream.next().await {
            Some(Ok(frame)) => {
                match protocol::deserialize_message::<ClientMessage>(&frame) {
                    Ok(msg) => {
                        if let Err(e) = handler::handle_message(conn_id, msg, &state).await {
                            tracing::error!("Handler error for {}: {}", display_name, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse message from {}: {}", display_name, e);
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Read error from {}: {}", display_name, e);
                break;
            }
            None => {
                tracing::info!("Client '{}' disconnected", display_name);
                break;
            }
        }
    }

    // Cleanup
    handler::handle_disconnect(conn_id, &state).await;
    write_task.abort();
    Ok(())
}
