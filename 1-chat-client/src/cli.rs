use std::time::Duration;

use clap::Parser;

use crate::connection::ConnectionConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Host name or IP address of the chat server.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// TCP port of the chat server.
    #[arg(long, default_value_t = 1300)]
    pub port: u16,

    /// Username sent in the login handshake.
    #[arg(long)]
    pub username: String,

    /// Print server events as JSON lines instead of chat text.
    #[arg(long)]
    pub json: bool,

    /// Give up connecting after this many seconds.
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    /// Drop the connection if the server stays silent this long.
    #[arg(long)]
    pub read_timeout_secs: Option<u64>,
}

impl Cli {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
        }
    }
}
