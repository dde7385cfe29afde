use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use tokio::net::TcpListener;
use tracing::{info, warn};

use sum_server::{
    cli::{Cli, Command},
    client,
    server::SumServer,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            let listener = TcpListener::bind(args.listen).await?;
            let server = SumServer::new(listener);
            let addr = server.local_addr()?;
            info!("sum server listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("sum server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => {
            let operands = {
                let mut rng = rand::thread_rng();
                (rng.gen_range(1..=10), rng.gen_range(1..=10))
            };
            let read_timeout = Duration::from_secs(args.read_timeout_secs);
            client::run_session(&args.server, read_timeout, operands).await?;
            info!("warm-up session finished");
        }
    }

    Ok(())
}
