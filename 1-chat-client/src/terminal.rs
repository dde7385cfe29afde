//! Interactive terminal front-end: stdin in, rendered events out.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    select,
    sync::mpsc,
};
use tracing::warn;

use crate::{cli::Cli, client::ChatClient, codec::ServerEvent};

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
pub enum UserInput {
    Public(String),
    Private { recipient: String, text: String },
    Users,
    Help,
    Quit,
    Empty,
}

impl UserInput {
    /// `/users`, `/help`, `/quit` and `/msg <user> <text>` are commands;
    /// anything else is said to the whole room.
    pub fn parse(line: &str) -> Self {
        let text = line.trim_end();
        if text.trim().is_empty() {
            return Self::Empty;
        }

        let Some(command) = text.strip_prefix('/') else {
            return Self::Public(text.to_string());
        };
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        match name.to_ascii_lowercase().as_str() {
            "users" => Self::Users,
            "help" => Self::Help,
            "quit" => Self::Quit,
            "msg" => {
                let (recipient, text) = rest.trim_start().split_once(' ').unwrap_or((rest, ""));
                Self::Private {
                    recipient: recipient.to_string(),
                    text: text.to_string(),
                }
            }
            _ => Self::Public(text.to_string()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Rendered {
    Stdout(String),
    Stderr(String),
}

pub fn render_event(event: &ServerEvent) -> Rendered {
    match event {
        ServerEvent::LoginResult { success: true, .. } => Rendered::Stdout("*** logged in".into()),
        ServerEvent::LoginResult {
            success: false,
            message,
        } => Rendered::Stderr(format!("!!! login failed: {message}")),
        ServerEvent::Disconnected => Rendered::Stdout("*** disconnected".into()),
        ServerEvent::UserList { usernames } => {
            Rendered::Stdout(format!("*** currently online: {}", usernames.join(", ")))
        }
        ServerEvent::MessageReceived {
            private: false,
            sender,
            text,
        } => Rendered::Stdout(format!("<{sender}> {text}")),
        ServerEvent::MessageReceived {
            private: true,
            sender,
            text,
        } => Rendered::Stdout(format!("*{sender}* {text}")),
        ServerEvent::MessageError { reason } => {
            Rendered::Stderr(format!("!!! message not delivered: {reason}"))
        }
        ServerEvent::CommandError { reason } => Rendered::Stderr(format!("!!! {reason}")),
        ServerEvent::SupportedCommands { names } => {
            Rendered::Stdout(format!("*** supported commands: {}", names.join(", ")))
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let client = ChatClient::with_config(args.connection_config());
    if !client.connect(&args.host, args.port).await {
        bail!(client.last_error());
    }

    let (events_tx, mut events) = mpsc::unbounded_channel();
    client.add_listener(Arc::new(events_tx));
    client.start_listening();

    if !client.try_login(&args.username).await {
        client.disconnect().await;
        bail!("login failed: {}", client.last_error());
    }

    let mut stdin = BufReader::new(io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                write_event(&event, args.json).await?;
                if event == ServerEvent::Disconnected {
                    return Ok(());
                }
            }
            bytes_read = stdin.read_line(&mut input) => {
                let bytes_read = bytes_read.context("failed to read stdin")?;
                if bytes_read == 0 || !handle_input(&client, UserInput::parse(&input)).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

async fn handle_input(client: &ChatClient, input: UserInput) -> Result<bool> {
    let sent = match input {
        UserInput::Empty => return Ok(true),
        UserInput::Quit => {
            write_stdout("*** leaving chat").await?;
            return Ok(false);
        }
        UserInput::Public(text) => client.send_public_message(&text).await,
        UserInput::Private { recipient, text } => client.send_private_message(&recipient, &text).await,
        UserInput::Users => client.refresh_user_list().await,
        UserInput::Help => client.ask_supported_commands().await,
    };

    if !sent {
        write_stderr(&format!("!!! {}", client.last_error())).await?;
    }
    Ok(client.is_connection_active())
}

async fn write_event(event: &ServerEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(event).context("failed to encode event")?;
        return Ok(write_stdout(&line).await?);
    }
    match render_event(event) {
        Rendered::Stdout(line) => write_stdout(&line).await?,
        Rendered::Stderr(line) => write_stderr(&line).await?,
    }
    Ok(())
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
