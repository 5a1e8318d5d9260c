//! Chat transport boundary.
//!
//! The core talks to the chat service through [`ChatTransport`] and receives
//! [`Inbound`] events from the adapter. Delivery failures arrive already
//! classified: the permanent/transient split is the adapter's call, the core
//! never inspects error text.

use crate::model::{Identity, Status};

/// Delivery failure, classified at the adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The recipient blocked the sender or no longer exists. Subscribers
    /// failing this way are pruned.
    #[error("recipient unreachable: {0}")]
    Permanent(String),

    /// Anything else: network trouble, rate limits, service errors. Logged
    /// and retried on the next broadcast, never prunes.
    #[error("delivery failed: {0}")]
    Transient(String),
}

/// Handle to a previously sent message, for in-place menu edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: Identity,
    pub message: i64,
}

/// One selectable menu entry: a human label plus an opaque callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub payload: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound operations the core needs from the chat service.
pub trait ChatTransport {
    fn send_text(&self, to: Identity, text: &str) -> Result<(), SendError>;

    fn send_menu(&self, to: Identity, text: &str, choices: &[Choice]) -> Result<(), SendError>;

    fn edit_menu(&self, message: MessageRef, text: &str, choices: &[Choice])
    -> Result<(), SendError>;
}

/// Inbound event, already stripped down to what the dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A typed `/command` (name without the slash, lower-cased).
    Command { from: Identity, name: String },
    /// Free text, interpreted against the sender's wizard session.
    Text { from: Identity, body: String },
    /// A menu button press carrying an encoded [`Action`].
    Callback {
        from: Identity,
        message: MessageRef,
        payload: String,
    },
}

/// Transport-imposed ceiling on callback payload bytes.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Structured callback payload: `(action, item, status)` round-tripped
/// through short codes so display labels never need to be parsed back into
/// identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Select an item to edit: `p:<NAME>`.
    Pick(String),
    /// Set an item to an explicit status: `s:<code>:<NAME>`.
    Set(String, Status),
    /// Advance an item along the toggle cycle: `t:<NAME>`.
    Toggle(String),
    /// Delete an item: `d:<NAME>`.
    Delete(String),
    /// Abandon the current wizard: `x`.
    Cancel,
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Self::Pick(name) => format!("p:{name}"),
            Self::Set(name, status) => format!("s:{}:{name}", status.code()),
            Self::Toggle(name) => format!("t:{name}"),
            Self::Delete(name) => format!("d:{name}"),
            Self::Cancel => "x".to_string(),
        }
    }

    pub fn decode(payload: &str) -> Option<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return None;
        }
        if payload == "x" {
            return Some(Self::Cancel);
        }
        let (tag, rest) = payload.split_once(':')?;
        match tag {
            "p" if !rest.is_empty() => Some(Self::Pick(rest.to_string())),
            "t" if !rest.is_empty() => Some(Self::Toggle(rest.to_string())),
            "d" if !rest.is_empty() => Some(Self::Delete(rest.to_string())),
            "s" => {
                let (code, name) = rest.split_once(':')?;
                let mut chars = code.chars();
                let letter = chars.next()?;
                if chars.next().is_some() || name.is_empty() {
                    return None;
                }
                Some(Self::Set(name.to_string(), Status::from_code(letter)?))
            }
            _ => None,
        }
    }
}
