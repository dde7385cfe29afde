use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use sum_server::{
    client::{SumClient, run_session},
    protocol::GAME_OVER,
    server::SumServer,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

const READ_TIMEOUT: Duration = Duration::from_secs(1);

async fn start_server() -> Result<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let server = SumServer::new(listener);
    let addr = server.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = server.run_until(shutdown).await;
    });

    Ok((addr, shutdown_tx, task))
}

#[tokio::test]
async fn answers_sums_and_errors_on_one_connection() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut client = SumClient::connect(&addr.to_string(), READ_TIMEOUT).await?;

    client.send_request("2+3").await?;
    assert_eq!(client.read_response().await?, "5");

    client.send_request("bla+bla").await?;
    assert_eq!(client.read_response().await?, "error");

    client.send_request("-40 + 2").await?;
    assert_eq!(client.read_response().await?, "-38");

    client.send_request(GAME_OVER).await?;
    assert!(client.read_response().await.is_err(), "server should hang up");

    client.close().await?;
    assert!(client.is_closed());
    assert!(client.send_request("2+2").await.is_err());

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn serves_clients_concurrently() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let addr = addr.to_string();

    let mut first = SumClient::connect(&addr, READ_TIMEOUT).await?;
    let mut second = SumClient::connect(&addr, READ_TIMEOUT).await?;

    // The second client is answered while the first stays connected and idle.
    second.send_request("10+10").await?;
    assert_eq!(second.read_response().await?, "20");
    first.send_request("1+1").await?;
    assert_eq!(first.read_response().await?, "2");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn scripted_session_succeeds() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;

    run_session(&addr.to_string(), READ_TIMEOUT, (4, 9)).await?;

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn empty_requests_are_refused_locally() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut client = SumClient::connect(&addr.to_string(), READ_TIMEOUT).await?;

    assert!(client.send_request("").await.is_err());
    client.send_request("1+2").await?;
    assert_eq!(client.read_response().await?, "3");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}
