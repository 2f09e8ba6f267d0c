//! Scripted client: lists tracks, joins the first joinable one and prints
//! every event until the race is settled.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use shared::{ClientEvent, JoinRequest, ServerEvent, TrackStatus};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Auth token sent with the handshake
    #[arg(short = 't', long, default_value = "demo-alice")]
    token: String,

    /// Join this track instead of the first awaiting one
    #[arg(long)]
    track: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let url = format!("ws://{}/tracks?token={}", args.server, args.token);
    println!("Connecting to {}", url);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(ClientEvent::GetTracks.to_json()?))
        .await?;

    let mut joined = false;
    while let Some(message) = stream.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                println!("Server closed the connection: {:?}", frame);
                break;
            }
            _ => continue,
        };

        let event = match ServerEvent::from_json(&text) {
            Ok(event) => event,
            Err(e) => {
                println!("Unreadable frame {}: {}", text, e);
                continue;
            }
        };
        println!("<- {}: {}", event.name(), text);

        match event {
            ServerEvent::InitTracks(list) if !joined => {
                let target = args.track.clone().or_else(|| {
                    list.tracks
                        .iter()
                        .find(|t| t.status == TrackStatus::Awaiting)
                        .map(|t| t.id.clone())
                });
                let Some(track_id) = target else {
                    println!("No joinable track listed");
                    break;
                };

                println!("-> joinTrack {}", track_id);
                let join = ClientEvent::JoinTrack(JoinRequest {
                    track_id,
                    fuel: vec![],
                });
                sink.send(Message::Text(join.to_json()?)).await?;
                joined = true;
            }
            ServerEvent::Gameover(results) => {
                for standing in results {
                    println!(
                        "#{} {} score {:.1} prize {}",
                        standing.position + 1,
                        standing.name,
                        standing.score,
                        standing.prize
                    );
                }
                break;
            }
            ServerEvent::Error(err) => println!("Server error: {}", err.message),
            _ => {}
        }
    }

    sink.close().await?;
    Ok(())
}
