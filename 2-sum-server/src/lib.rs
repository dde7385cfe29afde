//! Companion sum server for exercising raw TCP request/response handling.
//!
//! - [`protocol`] parses `<int>+<int>` / `game over` requests.
//! - [`server`] accepts connections and answers each on its own task.
//! - [`client`] runs the scripted warm-up conversation.
//! - [`cli`] parses the server and client subcommands.

pub mod cli;
pub mod client;
pub mod protocol;
pub mod server;
