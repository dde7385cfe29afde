//! Request parsing for the sum protocol.
//!
//! A request is one line: either `<int>+<int>`, answered with the decimal sum,
//! or the literal `game over`, which ends the conversation without a reply.
//! Anything else is answered with the literal line `error`.

use thiserror::Error;

pub const GAME_OVER: &str = "game over";
pub const ERROR_RESPONSE: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Sum(i64, i64),
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("expected '<int>+<int>'")]
    NotAnAddition,

    #[error("invalid operand '{0}'")]
    InvalidOperand(String),
}

/// What the server does after reading a request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    Close,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let line = line.trim();
        if line == GAME_OVER {
            return Ok(Self::GameOver);
        }

        let (left, right) = line.split_once('+').ok_or(RequestError::NotAnAddition)?;
        Ok(Self::Sum(parse_operand(left)?, parse_operand(right)?))
    }
}

fn parse_operand(raw: &str) -> Result<i64, RequestError> {
    let raw = raw.trim();
    raw.parse()
        .map_err(|_| RequestError::InvalidOperand(raw.to_string()))
}

/// Computes the reply for one request line. Sums that overflow are errors.
pub fn respond(line: &str) -> Reply {
    match Request::parse(line) {
        Ok(Request::GameOver) => Reply::Close,
        Ok(Request::Sum(a, b)) => match a.checked_add(b) {
            Some(sum) => Reply::Line(sum.to_string()),
            None => Reply::Line(ERROR_RESPONSE.to_string()),
        },
        Err(_) => Reply::Line(ERROR_RESPONSE.to_string()),
    }
}
