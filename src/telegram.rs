//! Telegram Bot API adapter.
//!
//! Implements [`ChatTransport`] over the HTTP API and long-polls
//! `getUpdates` for the serve loop. This is the one place delivery
//! failures are classified: HTTP 403 (the recipient blocked the bot or
//! the chat is gone) is the explicit permanent signal, everything else is
//! transient.

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::model::Identity;
use crate::transport::{ChatTransport, Choice, Inbound, MessageRef, SendError};

/// Per-send request timeout. Bounds how long one slow recipient can stall
/// a fan-out pass.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Long-poll timeout, larger than the poll window passed to `getUpdates`.
const POLL_TIMEOUT: Duration = Duration::from_secs(50);

#[derive(Clone)]
pub struct TelegramTransport {
    api: String,
    agent: ureq::Agent,
    poll_agent: ureq::Agent,
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The api string embeds the token; don't leak it through logs.
        f.debug_struct("TelegramTransport").finish_non_exhaustive()
    }
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(SEND_TIMEOUT))
            .build()
            .new_agent();
        let poll_agent = ureq::Agent::config_builder()
            .timeout_global(Some(POLL_TIMEOUT))
            .build()
            .new_agent();
        Self {
            api: format!("https://api.telegram.org/bot{token}"),
            agent,
            poll_agent,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api)
    }

    fn call(&self, method: &str, payload: &serde_json::Value) -> Result<(), SendError> {
        match self.agent.post(&self.method_url(method)).send_json(payload) {
            Ok(_) => Ok(()),
            Err(e) => Err(classify(&e)),
        }
    }

    /// Long-poll for updates past `offset`.
    pub fn fetch_updates(&self, offset: i64, timeout_secs: u64) -> anyhow::Result<Vec<Update>> {
        let payload = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let mut response = self
            .poll_agent
            .post(&self.method_url("getUpdates"))
            .send_json(&payload)
            .context("getUpdates request")?;
        let envelope: ApiEnvelope<Vec<Update>> = response
            .body_mut()
            .read_json()
            .context("getUpdates response body")?;
        if !envelope.ok {
            anyhow::bail!(
                "getUpdates rejected: {}",
                envelope.description.unwrap_or_default()
            );
        }
        Ok(envelope.result.unwrap_or_default())
    }

    /// Ack a button press so the client stops showing a spinner. Best
    /// effort; failures are logged only.
    pub fn answer_callback(&self, callback_id: &str) {
        let payload = serde_json::json!({ "callback_query_id": callback_id });
        if let Err(e) = self.call("answerCallbackQuery", &payload) {
            tracing::debug!(error = %e, "answerCallbackQuery failed");
        }
    }
}

impl ChatTransport for TelegramTransport {
    fn send_text(&self, to: Identity, text: &str) -> Result<(), SendError> {
        let payload = serde_json::json!({ "chat_id": to, "text": text });
        self.call("sendMessage", &payload)
    }

    fn send_menu(&self, to: Identity, text: &str, choices: &[Choice]) -> Result<(), SendError> {
        let mut payload = serde_json::json!({ "chat_id": to, "text": text });
        if !choices.is_empty() {
            payload["reply_markup"] = keyboard(choices);
        }
        self.call("sendMessage", &payload)
    }

    fn edit_menu(
        &self,
        message: MessageRef,
        text: &str,
        choices: &[Choice],
    ) -> Result<(), SendError> {
        let mut payload = serde_json::json!({
            "chat_id": message.chat,
            "message_id": message.message,
            "text": text,
        });
        if !choices.is_empty() {
            payload["reply_markup"] = keyboard(choices);
        }
        self.call("editMessageText", &payload)
    }
}

/// One choice per row keeps labels readable on narrow clients.
fn keyboard(choices: &[Choice]) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = choices
        .iter()
        .map(|c| serde_json::json!([{ "text": c.label, "callback_data": c.payload }]))
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

fn classify(e: &ureq::Error) -> SendError {
    match e {
        ureq::Error::StatusCode(code) => classify_status(*code),
        other => SendError::Transient(other.to_string()),
    }
}

/// 403 means the recipient blocked the bot or the chat no longer exists;
/// every other status (429, 5xx, odd 4xx) is worth retrying next pass.
fn classify_status(code: u16) -> SendError {
    if code == 403 {
        SendError::Permanent("blocked or deactivated (HTTP 403)".to_string())
    } else {
        SendError::Transient(format!("api status {code}"))
    }
}

// ---------------------------------------------------------------------------
// Update JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    message_id: i64,
    #[serde(default)]
    from: Option<User>,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    #[serde(default)]
    message: Option<IncomingMessage>,
    #[serde(default)]
    data: Option<String>,
}

impl Update {
    /// Callback query id needing an ack, if this update is a button press.
    pub fn callback_id(&self) -> Option<&str> {
        self.callback_query.as_ref().map(|cb| cb.id.as_str())
    }
}

/// Strip an update down to the dispatcher's [`Inbound`]. Updates without
/// anything actionable (joins, edits, stickers) map to `None`.
pub fn to_inbound(update: Update) -> Option<Inbound> {
    if let Some(cb) = update.callback_query {
        let message = cb.message?;
        let payload = cb.data?;
        return Some(Inbound::Callback {
            from: cb.from.id,
            message: MessageRef {
                chat: message.chat.id,
                message: message.message_id,
            },
            payload,
        });
    }

    let msg = update.message?;
    let from = msg.from.map_or(msg.chat.id, |u| u.id);
    let text = msg.text?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match parse_command(trimmed) {
        Some(name) => Some(Inbound::Command { from, name }),
        None => Some(Inbound::Text {
            from,
            body: trimmed.to_string(),
        }),
    }
}

/// `/name`, `/name args`, and the group form `/name@botname` all yield
/// `name` lower-cased. Non-commands yield `None`.
fn parse_command(text: &str) -> Option<String> {
    let rest = text.strip_prefix('/')?;
    let word = rest.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        None
    } else {
        Some(name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Command parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parse_command_variants() {
        assert_eq!(parse_command("/status"), Some("status".to_string()));
        assert_eq!(parse_command("/Status"), Some("status".to_string()));
        assert_eq!(parse_command("/edit@checkpost_bot"), Some("edit".to_string()));
        assert_eq!(parse_command("/add North Gate"), Some("add".to_string()));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/@bot"), None);
    }

    // -----------------------------------------------------------------------
    // Failure classification
    // -----------------------------------------------------------------------

    #[test]
    fn forbidden_is_permanent() {
        assert!(matches!(classify_status(403), SendError::Permanent(_)));
    }

    #[test]
    fn other_statuses_are_transient() {
        for code in [400, 404, 429, 500, 502] {
            assert!(
                matches!(classify_status(code), SendError::Transient(_)),
                "status {code}"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Update mapping
    // -----------------------------------------------------------------------

    fn update_from(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn text_update_maps_to_text() {
        let update = update_from(
            r#"{"update_id": 5, "message": {"message_id": 9, "from": {"id": 42},
                "chat": {"id": 42}, "text": "  hello there "}}"#,
        );
        assert_eq!(
            to_inbound(update),
            Some(Inbound::Text {
                from: 42,
                body: "hello there".to_string()
            })
        );
    }

    #[test]
    fn command_update_maps_to_command() {
        let update = update_from(
            r#"{"update_id": 6, "message": {"message_id": 9, "from": {"id": 42},
                "chat": {"id": 42}, "text": "/Edit@some_bot"}}"#,
        );
        assert_eq!(
            to_inbound(update),
            Some(Inbound::Command {
                from: 42,
                name: "edit".to_string()
            })
        );
    }

    #[test]
    fn callback_update_maps_to_callback() {
        let update = update_from(
            r#"{"update_id": 7, "callback_query": {"id": "cb1", "from": {"id": 42},
                "message": {"message_id": 3, "chat": {"id": -100}}, "data": "p:MAIN GATE"}}"#,
        );
        assert_eq!(update.callback_id(), Some("cb1"));
        assert_eq!(
            to_inbound(update),
            Some(Inbound::Callback {
                from: 42,
                message: MessageRef {
                    chat: -100,
                    message: 3
                },
                payload: "p:MAIN GATE".to_string(),
            })
        );
    }

    #[test]
    fn textless_update_maps_to_none() {
        let update = update_from(
            r#"{"update_id": 8, "message": {"message_id": 9, "chat": {"id": 42}}}"#,
        );
        assert_eq!(to_inbound(update), None);
    }

    #[test]
    fn keyboard_is_one_choice_per_row() {
        let choices = vec![Choice::new("a", "p:A"), Choice::new("b", "p:B")];
        let markup = keyboard(&choices);
        let rows = markup["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0]["callback_data"], "p:A");
        assert_eq!(rows[1][0]["text"], "b");
    }
}
