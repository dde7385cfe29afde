use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer `<int>+<int>` requests over TCP.
    Server(ServerArgs),
    /// Run the scripted warm-up conversation against a server.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address to bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:1301")]
    pub listen: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server, as `host:port`.
    #[arg(long, default_value = "127.0.0.1:1301")]
    pub server: String,

    /// Seconds to wait for each response before giving up.
    #[arg(long, default_value_t = 100)]
    pub read_timeout_secs: u64,
}
