//! User-facing chat operations layered on top of [`Connection`].
//!
//! Every operation validates its input before touching the network. Rejected
//! input returns `false` and leaves a human-readable reason in
//! [`ChatClient::last_error`].

use std::sync::Arc;

use tracing::debug;

use crate::{
    codec::{LINE_ENDINGS, OutboundCommand},
    connection::{Connection, ConnectionConfig},
    listener::ChatListener,
};

pub const EMPTY_USERNAME: &str = "Username was empty.";
pub const EMPTY_MESSAGE: &str = "Message was empty.";
pub const MISSING_RECIPIENT_OR_MESSAGE: &str = "Recipient or message not specified.";
pub const LINE_BREAK_IN_INPUT: &str = "Message contains a line break.";

#[derive(Default)]
pub struct ChatClient {
    connection: Connection,
}

impl ChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            connection: Connection::with_config(config),
        }
    }

    pub async fn connect(&self, host: &str, port: u16) -> bool {
        self.connection.connect(host, port).await
    }

    pub async fn disconnect(&self) -> bool {
        self.connection.disconnect().await
    }

    pub fn is_connection_active(&self) -> bool {
        self.connection.is_active()
    }

    pub async fn try_login(&self, username: &str) -> bool {
        if username.is_empty() {
            return self.reject(EMPTY_USERNAME);
        }
        self.send(OutboundCommand::Login {
            username: username.to_string(),
        })
        .await
    }

    pub async fn send_public_message(&self, message: &str) -> bool {
        if message.is_empty() {
            return self.reject(EMPTY_MESSAGE);
        }
        self.send(OutboundCommand::PublicMessage {
            text: message.to_string(),
        })
        .await
    }

    pub async fn send_private_message(&self, recipient: &str, message: &str) -> bool {
        // A space in the recipient would shift the text boundary on the wire.
        if recipient.is_empty() || recipient.contains(' ') || message.is_empty() {
            return self.reject(MISSING_RECIPIENT_OR_MESSAGE);
        }
        self.send(OutboundCommand::PrivateMessage {
            recipient: recipient.to_string(),
            text: message.to_string(),
        })
        .await
    }

    /// Asks for the current user list; the answer arrives as a `UserList` event.
    pub async fn refresh_user_list(&self) -> bool {
        self.send(OutboundCommand::UsersQuery).await
    }

    /// Asks for the commands the server supports (`SupportedCommands` event).
    pub async fn ask_supported_commands(&self) -> bool {
        self.send(OutboundCommand::HelpQuery).await
    }

    pub fn start_listening(&self) -> bool {
        self.connection.start_listening()
    }

    pub fn add_listener(&self, listener: Arc<dyn ChatListener>) -> bool {
        self.connection.listeners().register(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ChatListener>) -> bool {
        self.connection.listeners().unregister(listener)
    }

    pub fn last_error(&self) -> String {
        self.connection.last_error()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn send(&self, command: OutboundCommand) -> bool {
        let line = command.encode();
        if line.contains(LINE_ENDINGS) {
            return self.reject(LINE_BREAK_IN_INPUT);
        }
        self.connection.send_line(&line).await
    }

    fn reject(&self, reason: &str) -> bool {
        debug!(reason, "rejected before sending");
        self.connection.record_error(reason);
        false
    }
}
