use clap::Parser;
use log::{error, info};
use server::config::ExtensionConfig;
use server::network::{Server, ServerMessage};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "20")]
    tick_rate: u32,
    /// Maximum number of connected players
    #[clap(short, long, default_value = "32")]
    max_clients: usize,
    /// Seconds between sweeps of expired duel challenges
    #[clap(long, default_value = "10")]
    sweep_interval: u64,
    /// Seconds before an unanswered duel challenge expires
    #[clap(long, default_value = "30")]
    request_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config =
        ExtensionConfig::from_flags(args.tick_rate, args.sweep_interval, args.request_timeout);
    config.validate()?;

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, args.max_clients, config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if let Err(e) = shutdown.send(ServerMessage::Shutdown) {
                error!("Failed to signal shutdown: {}", e);
            }
        }
    });

    server.run().await
}
