use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::protocol::{Reply, respond};

/// Stateless request/response server; one task per accepted connection.
pub struct SumServer {
    listener: TcpListener,
}

impl SumServer {
    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let SumServer { listener } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("sum server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr) {
    tokio::spawn(async move {
        debug!(%peer, "client connected");
        match handle_connection(stream).await {
            Ok(()) => debug!(%peer, "client finished"),
            Err(err) => warn!(%peer, error = ?err, "client connection closed with error"),
        }
    });
}

async fn handle_connection(stream: TcpStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(request) = lines.next_line().await? {
        match respond(&request) {
            Reply::Line(response) => {
                debug!(%request, %response, "answering");
                write_line(&mut writer, &response).await?;
            }
            Reply::Close => {
                debug!("game over requested");
                writer.shutdown().await?;
                break;
            }
        }
    }

    Ok(())
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
