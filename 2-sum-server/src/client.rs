//! Warm-up client: a scripted conversation with the sum server.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tracing::info;

use crate::protocol::{ERROR_RESPONSE, GAME_OVER};

/// Request sent to provoke an `error` reply.
pub const INVALID_REQUEST: &str = "bla+bla";

pub struct SumClient {
    reader: BufReader<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    read_timeout: Duration,
}

impl SumClient {
    pub async fn connect(server: &str, read_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(server)
            .await
            .with_context(|| format!("failed to connect to {server}"))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer: Some(writer),
            read_timeout,
        })
    }

    /// Sends one request line. Fails for empty requests and closed connections.
    pub async fn send_request(&mut self, request: &str) -> Result<()> {
        ensure!(!request.is_empty(), "refusing to send an empty request");
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("connection is closed"))?;
        writer.write_all(request.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Waits for one response line, with the newline stripped.
    pub async fn read_response(&mut self) -> Result<String> {
        let mut line = String::new();
        let bytes = timeout(self.read_timeout, self.reader.read_line(&mut line))
            .await
            .with_context(|| format!("no response within {:?}", self.read_timeout))?
            .context("failed to read response")?;
        if bytes == 0 {
            bail!("server closed the connection");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.context("failed to close connection")?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

/// Runs the full warm-up conversation: a valid sum, an invalid request, then
/// `game over` and a send attempt that must fail on the closed connection.
pub async fn run_session(server: &str, read_timeout: Duration, operands: (i64, i64)) -> Result<()> {
    let mut client = SumClient::connect(server, read_timeout).await?;
    info!("connection to the server established");

    let (a, b) = operands;
    let request = format!("{a}+{b}");
    client.send_request(&request).await?;
    info!(%request, "sent");
    let response = client.read_response().await?;
    info!(%response, "server responded");
    ensure!(
        response == (a + b).to_string(),
        "expected {} for {request}, got '{response}'",
        a + b
    );

    client.send_request(INVALID_REQUEST).await?;
    info!(request = INVALID_REQUEST, "sent");
    let response = client.read_response().await?;
    info!(%response, "server responded");
    ensure!(
        response == ERROR_RESPONSE,
        "expected '{ERROR_RESPONSE}' for {INVALID_REQUEST}, got '{response}'"
    );

    client.send_request(GAME_OVER).await?;
    client.close().await?;
    info!("game over, connection closed");

    ensure!(
        client.send_request("2+2").await.is_err(),
        "sending after closing the connection did not fail"
    );
    info!("sending after close failed as expected");
    Ok(())
}
