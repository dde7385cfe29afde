//! Line codec for the chat protocol.
//!
//! Every command and every response is a single line of UTF-8 text. The first
//! space-separated word is the keyword; the remainder is a keyword-specific
//! payload. Everything in this module is pure so it can be called from the
//! listen loop, the caller's task, or a test server alike.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Characters that terminate a protocol line; never part of a payload.
pub(crate) const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Reason attached to [`ServerEvent::CommandError`] for unknown keywords.
pub const UNRECOGNIZED_RESPONSE: &str = "unrecognized response";

/// Requests a client can send to the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    Login { username: String },
    PublicMessage { text: String },
    PrivateMessage { recipient: String, text: String },
    UsersQuery,
    HelpQuery,
}

impl OutboundCommand {
    /// Encodes the command as one protocol line, without the terminator.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parses a client command line the way a server would read it.
    ///
    /// Returns `None` for unknown keywords or missing arguments.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(LINE_ENDINGS);
        let (keyword, rest) = split_keyword(line);
        match (keyword, rest) {
            ("login", Some(username)) if !username.is_empty() => Some(Self::Login {
                username: username.to_string(),
            }),
            ("msg", Some(text)) if !text.is_empty() => Some(Self::PublicMessage {
                text: text.to_string(),
            }),
            ("privmsg", Some(rest)) => {
                let (recipient, text) = rest.split_once(' ')?;
                if recipient.is_empty() || text.is_empty() {
                    return None;
                }
                Some(Self::PrivateMessage {
                    recipient: recipient.to_string(),
                    text: text.to_string(),
                })
            }
            ("users", _) => Some(Self::UsersQuery),
            ("help", _) => Some(Self::HelpQuery),
            _ => None,
        }
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username } => write!(f, "login {username}"),
            Self::PublicMessage { text } => write!(f, "msg {text}"),
            Self::PrivateMessage { recipient, text } => write!(f, "privmsg {recipient} {text}"),
            Self::UsersQuery => f.write_str("users"),
            Self::HelpQuery => f.write_str("help"),
        }
    }
}

/// Everything the server can tell us, plus the local end-of-connection event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    LoginResult { success: bool, message: String },
    Disconnected,
    UserList { usernames: Vec<String> },
    MessageReceived { private: bool, sender: String, text: String },
    MessageError { reason: String },
    CommandError { reason: String },
    SupportedCommands { names: Vec<String> },
}

impl ServerEvent {
    /// Encodes the event as the server would send it.
    ///
    /// `Disconnected` never travels over the wire and yields `None`.
    pub fn to_line(&self) -> Option<String> {
        let line = match self {
            Self::LoginResult { success: true, .. } => "loginok".to_string(),
            Self::LoginResult {
                success: false,
                message,
            } => format!("loginerr {message}"),
            Self::Disconnected => return None,
            Self::UserList { usernames } => format!("users {}", usernames.join(" ")),
            Self::MessageReceived {
                private,
                sender,
                text,
            } => {
                let keyword = if *private { "privmsg" } else { "msg" };
                format!("{keyword} {sender} {text}")
            }
            Self::MessageError { reason } => format!("msgerr {reason}"),
            Self::CommandError { reason } => format!("cmderror {reason}"),
            Self::SupportedCommands { names } => format!("supported {}", names.join(" ")),
        };
        Some(line)
    }
}

/// Why an inbound line could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unrecognized response")]
    UnknownKeyword(String),

    #[error("malformed '{keyword}' response: missing text")]
    MissingText { keyword: &'static str },

    #[error("malformed '{keyword}' response: expected at least one name")]
    EmptyNameList { keyword: &'static str },

    #[error("malformed '{keyword}' response: expected a sender and a text")]
    MissingSenderOrText { keyword: &'static str },
}

/// Payload shape expected after a keyword, with the constructor for the event.
enum Rule {
    Bare(fn() -> ServerEvent),
    Text(fn(String) -> ServerEvent),
    Names(fn(Vec<String>) -> ServerEvent),
    Addressed(fn(String, String) -> ServerEvent),
}

fn rule_for(keyword: &str) -> Option<(&'static str, Rule)> {
    let rule = match keyword {
        "loginok" => (
            "loginok",
            Rule::Bare(|| ServerEvent::LoginResult {
                success: true,
                message: String::new(),
            }),
        ),
        "loginerr" => (
            "loginerr",
            Rule::Text(|message| ServerEvent::LoginResult {
                success: false,
                message,
            }),
        ),
        "users" => (
            "users",
            Rule::Names(|usernames| ServerEvent::UserList { usernames }),
        ),
        "msg" => (
            "msg",
            Rule::Addressed(|sender, text| ServerEvent::MessageReceived {
                private: false,
                sender,
                text,
            }),
        ),
        "privmsg" => (
            "privmsg",
            Rule::Addressed(|sender, text| ServerEvent::MessageReceived {
                private: true,
                sender,
                text,
            }),
        ),
        "msgerr" => (
            "msgerr",
            Rule::Text(|reason| ServerEvent::MessageError { reason }),
        ),
        "cmderror" => (
            "cmderror",
            Rule::Text(|reason| ServerEvent::CommandError { reason }),
        ),
        "supported" => (
            "supported",
            Rule::Names(|names| ServerEvent::SupportedCommands { names }),
        ),
        _ => return None,
    };
    Some(rule)
}

/// Decodes one inbound line, rejecting payloads that do not fit the keyword.
pub fn decode(line: &str) -> Result<ServerEvent, DecodeError> {
    let line = line.trim_end_matches(LINE_ENDINGS);
    let (keyword, rest) = split_keyword(line);
    let Some((keyword, rule)) = rule_for(keyword) else {
        return Err(DecodeError::UnknownKeyword(keyword.to_string()));
    };
    let rest = rest.unwrap_or_default();

    match rule {
        Rule::Bare(build) => Ok(build()),
        Rule::Text(build) => {
            if rest.is_empty() {
                return Err(DecodeError::MissingText { keyword });
            }
            Ok(build(rest.to_string()))
        }
        Rule::Names(build) => {
            let names: Vec<String> = rest
                .split(' ')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            if names.is_empty() {
                return Err(DecodeError::EmptyNameList { keyword });
            }
            Ok(build(names))
        }
        Rule::Addressed(build) => match rest.split_once(' ') {
            Some((sender, text)) if !sender.is_empty() && !text.is_empty() => {
                Ok(build(sender.to_string(), text.to_string()))
            }
            _ => Err(DecodeError::MissingSenderOrText { keyword }),
        },
    }
}

/// Decodes one inbound line, folding protocol errors into `CommandError`.
pub fn decode_event(line: &str) -> ServerEvent {
    decode(line).unwrap_or_else(|error| ServerEvent::CommandError {
        reason: error.to_string(),
    })
}

fn split_keyword(line: &str) -> (&str, Option<&str>) {
    match line.split_once(' ') {
        Some((keyword, rest)) => (keyword, Some(rest)),
        None => (line, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_every_command() {
        let cases = [
            (
                OutboundCommand::Login {
                    username: "bob".into(),
                },
                "login bob",
            ),
            (
                OutboundCommand::PublicMessage {
                    text: "hi everyone".into(),
                },
                "msg hi everyone",
            ),
            (
                OutboundCommand::PrivateMessage {
                    recipient: "alice".into(),
                    text: "see you".into(),
                },
                "privmsg alice see you",
            ),
            (OutboundCommand::UsersQuery, "users"),
            (OutboundCommand::HelpQuery, "help"),
        ];

        for (command, expected) in cases {
            assert_eq!(command.encode(), expected);
        }
    }

    #[test]
    fn decodes_login_results() {
        assert_eq!(
            decode("loginok"),
            Ok(ServerEvent::LoginResult {
                success: true,
                message: String::new()
            })
        );
        assert_eq!(
            decode("loginerr bad password"),
            Ok(ServerEvent::LoginResult {
                success: false,
                message: "bad password".into()
            })
        );
    }

    #[test]
    fn loginok_ignores_trailing_payload() {
        assert!(matches!(
            decode("loginok welcome aboard"),
            Ok(ServerEvent::LoginResult { success: true, message }) if message.is_empty()
        ));
    }

    #[test]
    fn decodes_user_and_command_lists() {
        assert_eq!(
            decode("users alice bob carol"),
            Ok(ServerEvent::UserList {
                usernames: vec!["alice".into(), "bob".into(), "carol".into()]
            })
        );
        assert_eq!(
            decode("supported login msg privmsg users help"),
            Ok(ServerEvent::SupportedCommands {
                names: vec![
                    "login".into(),
                    "msg".into(),
                    "privmsg".into(),
                    "users".into(),
                    "help".into()
                ]
            })
        );
    }

    #[test]
    fn decodes_messages_keeping_inner_spaces() {
        assert_eq!(
            decode("msg alice hello there"),
            Ok(ServerEvent::MessageReceived {
                private: false,
                sender: "alice".into(),
                text: "hello there".into()
            })
        );
        assert_eq!(
            decode("privmsg bob see you"),
            Ok(ServerEvent::MessageReceived {
                private: true,
                sender: "bob".into(),
                text: "see you".into()
            })
        );
    }

    #[test]
    fn decodes_error_responses() {
        assert_eq!(
            decode("msgerr user not found"),
            Ok(ServerEvent::MessageError {
                reason: "user not found".into()
            })
        );
        assert_eq!(
            decode("cmderror unknown command"),
            Ok(ServerEvent::CommandError {
                reason: "unknown command".into()
            })
        );
    }

    #[test]
    fn strips_line_terminators() {
        assert_eq!(
            decode("msgerr nope\r\n"),
            Ok(ServerEvent::MessageError {
                reason: "nope".into()
            })
        );
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert_eq!(
            decode("users"),
            Err(DecodeError::EmptyNameList { keyword: "users" })
        );
        assert_eq!(
            decode("supported "),
            Err(DecodeError::EmptyNameList {
                keyword: "supported"
            })
        );
        assert_eq!(
            decode("msg"),
            Err(DecodeError::MissingSenderOrText { keyword: "msg" })
        );
        assert_eq!(
            decode("privmsg alice"),
            Err(DecodeError::MissingSenderOrText { keyword: "privmsg" })
        );
        assert_eq!(
            decode("loginerr"),
            Err(DecodeError::MissingText {
                keyword: "loginerr"
            })
        );
    }

    #[test]
    fn unknown_keywords_become_command_errors() {
        assert_eq!(
            decode_event("banana split"),
            ServerEvent::CommandError {
                reason: UNRECOGNIZED_RESPONSE.into()
            }
        );
        assert!(matches!(
            decode_event("msg alice"),
            ServerEvent::CommandError { reason } if reason.contains("msg")
        ));
    }

    #[test]
    fn server_lines_decode_back_to_the_same_event() {
        let events = [
            ServerEvent::LoginResult {
                success: false,
                message: "name taken".into(),
            },
            ServerEvent::UserList {
                usernames: vec!["alice".into(), "bob".into()],
            },
            ServerEvent::MessageReceived {
                private: true,
                sender: "carol".into(),
                text: "psst, over here".into(),
            },
        ];

        for event in events {
            let line = event.to_line().expect("wire event");
            assert_eq!(decode(&line), Ok(event));
        }
        assert_eq!(ServerEvent::Disconnected.to_line(), None);
    }

    #[test]
    fn parses_client_commands() {
        let login = OutboundCommand::Login {
            username: "bob".into(),
        };
        assert_eq!(OutboundCommand::parse(&login.encode()), Some(login));
        assert_eq!(
            OutboundCommand::parse("privmsg alice see you\n"),
            Some(OutboundCommand::PrivateMessage {
                recipient: "alice".into(),
                text: "see you".into()
            })
        );
        assert_eq!(OutboundCommand::parse("privmsg alice"), None);
        assert_eq!(OutboundCommand::parse("msg"), None);
        assert_eq!(OutboundCommand::parse("dance"), None);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&ServerEvent::MessageError {
            reason: "offline".into(),
        })
        .expect("serialize event");
        assert_eq!(json, r#"{"type":"message_error","reason":"offline"}"#);
    }
}
