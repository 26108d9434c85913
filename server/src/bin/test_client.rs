use futures_util::{SinkExt, StreamExt};
use shared::{ClientMessage, Point, ServerMessage};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = "ws://127.0.0.1:6789";
    println!("Connecting to {}", url);

    let (ws_stream, _) = connect_async(url).await?;
    let (mut sender, mut receiver) = ws_stream.split();

    // The first message is the roster; our own entry carries owner=true.
    let mut own_id = None;
    while let Some(frame) = receiver.next().await {
        if let Message::Text(text) = frame? {
            match ServerMessage::from_json(&text) {
                Ok(ServerMessage::Connections { users }) => {
                    println!("Roster: {:?}", users);
                    own_id = users.iter().find(|u| u.owner).map(|u| u.id);
                    break;
                }
                Ok(other) => println!("Before roster: {:?}", other),
                Err(e) => println!("Undecodable frame: {}", e),
            }
        }
    }

    let id = match own_id {
        Some(id) => id,
        None => {
            println!("Never received a roster, giving up");
            return Ok(());
        }
    };
    println!("Connected with id {}", id);

    // Walk a small diagonal and watch the acknowledged snapshots come back.
    for seq_id in 1..=10u32 {
        let msg = ClientMessage::PlayerPosition {
            id,
            seq_id,
            position: Point::new(seq_id as f32, seq_id as f32 * 0.5),
        };
        println!("Sending intent seq {}", seq_id);
        sender.send(Message::Text(msg.to_json()?)).await?;

        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                Ok(ServerMessage::WorldState(snapshot)) => {
                    for state in snapshot.values() {
                        println!(
                            "  Entity {}: pos=({}, {}), last ack={:?}",
                            state.id, state.position.x, state.position.y,
                            state.last_processed_input
                        );
                    }
                }
                Ok(other) => println!("  Event: {:?}", other),
                Err(e) => println!("  Undecodable frame: {}", e),
            },
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                println!("Connection error: {}", e);
                break;
            }
            None => {
                println!("Server closed the connection");
                break;
            }
        }

        sleep(Duration::from_millis(250)).await;
    }

    println!("Closing");
    sender.send(Message::Close(None)).await?;
    Ok(())
}
