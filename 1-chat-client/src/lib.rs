//! Client engine for a line-oriented chat protocol.
//!
//! One TCP connection, one background task reading server lines, and a set of
//! observers that receive every decoded event in the order the server sent it.
//!
//! - [`codec`] maps user intents to command lines and server lines to
//!   [`codec::ServerEvent`]s. Pure, no I/O.
//! - [`connection`] owns the socket, its lifecycle, and the listen loop.
//! - [`listener`] is the observer registry with snapshot fan-out.
//! - [`client`] is the intent-level API (login, messages, queries) with input
//!   validation.
//! - [`cli`] and [`terminal`] make up the interactive front-end binary.

pub mod cli;
pub mod client;
pub mod codec;
pub mod connection;
pub mod listener;
pub mod terminal;

pub use client::ChatClient;
pub use codec::{DecodeError, OutboundCommand, ServerEvent};
pub use connection::{Connection, ConnectionClosed, ConnectionConfig, LinkState};
pub use listener::{ChatListener, ListenerRegistry};
