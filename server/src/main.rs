use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use server::lobby::RoomRegistry;
use server::network;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the WebSocket listener to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "2567")]
    port: u16,

    /// Maximum clients per room (0 = unbounded)
    #[arg(short, long, default_value = "0")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let registry = RoomRegistry::new(args.max_clients);
    let public = RoomRegistry::bootstrap_public(&registry).await;
    info!("Public room ready: {}", public.room_id);

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Office server listening on {}", address);

    tokio::select! {
        result = network::serve(listener, registry) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
