//! Event dispatcher: one inbound event at a time, matched against the
//! sender's wizard session and the item map.
//!
//! Every mutating path runs the same sequence: authorize against the admin
//! allow-list, validate the target name, mutate + timestamp, fan out to
//! subscribers, then acknowledge the actor. A rejection at authorize or
//! validate leaves both stores untouched.

use crate::model::{Identity, Status};
use crate::session::{Session, SessionMap};
use crate::storage::Storage;
use crate::store::items::normalize_name;
use crate::store::{ItemStore, StoreError, SubscriberRegistry};
use crate::transport::{Action, ChatTransport, Choice, Inbound, MessageRef};

const HELP: &str = "Commands:\n\
    /status — checkpoint board\n\
    /edit — change a status (admin)\n\
    /add — add a checkpoint (admin)\n\
    /del — delete a checkpoint (admin)\n\
    /cancel — abandon the current step";

const WELCOME: &str = "You are subscribed to checkpoint updates.";

/// How the next status is computed in the mutation sequence.
enum Change {
    Explicit(Status),
    Toggle,
}

pub struct Bot<S, T> {
    items: ItemStore<S>,
    subscribers: SubscriberRegistry<S>,
    sessions: SessionMap,
    admins: Vec<Identity>,
    transport: T,
}

impl<S: Storage, T: ChatTransport> Bot<S, T> {
    pub fn new(
        items: ItemStore<S>,
        subscribers: SubscriberRegistry<S>,
        transport: T,
        admins: Vec<Identity>,
    ) -> Self {
        Self {
            items,
            subscribers,
            sessions: SessionMap::new(),
            admins,
            transport,
        }
    }

    pub fn items(&self) -> &ItemStore<S> {
        &self.items
    }

    pub fn subscribers(&self) -> &SubscriberRegistry<S> {
        &self.subscribers
    }

    pub fn session(&self, id: Identity) -> Session {
        self.sessions.get(id)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn is_admin(&self, id: Identity) -> bool {
        self.admins.contains(&id)
    }

    /// Fully process one inbound event before the next is considered.
    pub fn handle(&mut self, inbound: Inbound) -> anyhow::Result<()> {
        let from = match &inbound {
            Inbound::Command { from, .. }
            | Inbound::Text { from, .. }
            | Inbound::Callback { from, .. } => *from,
        };
        // First contact subscribes.
        self.subscribers.ensure_subscribed(from)?;

        match inbound {
            Inbound::Command { name, .. } => self.handle_command(from, &name),
            Inbound::Text { body, .. } => self.handle_text(from, &body),
            Inbound::Callback {
                message, payload, ..
            } => self.handle_callback(from, message, &payload),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, from: Identity, name: &str) -> anyhow::Result<()> {
        // Every command starts a fresh flow; an abandoned wizard is dropped.
        self.sessions.reset(from);

        match name {
            "start" => {
                self.tell(from, WELCOME);
                self.tell(from, &self.board());
            }
            "status" | "menu" => self.tell(from, &self.board()),
            "help" => self.tell(from, HELP),
            "cancel" => self.tell(from, "Cancelled."),
            "edit" => {
                if self.require_admin(from) {
                    self.sessions.set(from, Session::Editing);
                    let choices = self.pick_choices(|name| Action::Pick(name.to_string()));
                    self.menu(from, "Pick a checkpoint to edit:", &choices);
                }
            }
            "add" => {
                if self.require_admin(from) {
                    self.sessions.set(from, Session::Adding);
                    self.tell(from, "Send the name of the new checkpoint (or /cancel).");
                }
            }
            "del" => {
                if self.require_admin(from) {
                    let choices = self.pick_choices(|name| Action::Delete(name.to_string()));
                    self.menu(from, "Pick a checkpoint to delete:", &choices);
                }
            }
            _ => self.tell(from, "Unknown command. Try /help."),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Free text
    // -----------------------------------------------------------------------

    fn handle_text(&mut self, from: Identity, body: &str) -> anyhow::Result<()> {
        match self.sessions.get(from) {
            Session::Adding => {
                // The wizard ends either way; a failed add is restarted
                // explicitly with /add.
                self.sessions.reset(from);
                match self.items.add_item(body) {
                    Ok(name) => {
                        self.tell(from, &format!("Added {name}."));
                        self.tell(from, &self.board());
                    }
                    Err(StoreError::EmptyName) => {
                        self.tell(from, "That name is empty. Start over with /add.");
                    }
                    Err(StoreError::NameTooLong) => {
                        self.tell(from, "That name is too long. Start over with /add.");
                    }
                    Err(StoreError::AlreadyExists) => {
                        self.tell(from, "That checkpoint already exists.");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Session::Editing => {
                // Exact match on the normalized identifier, never a
                // substring scan over display labels.
                let name = normalize_name(body);
                if self.items.contains(&name) {
                    self.sessions
                        .set(from, Session::ChoosingValue { key: name.clone() });
                    let choices = Self::status_choices(&name);
                    self.menu(from, &format!("{name} — choose a status:"), &choices);
                } else {
                    self.sessions.reset(from);
                    self.tell(from, "Unknown checkpoint.");
                }
            }
            Session::ChoosingValue { key } => {
                // Free text is not a valid choice: re-prompt, keep state.
                let choices = Self::status_choices(&key);
                self.menu(from, &format!("{key} — choose a status:"), &choices);
            }
            Session::Idle => self.tell(from, "Try /status or /help."),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    fn handle_callback(
        &mut self,
        from: Identity,
        message: MessageRef,
        payload: &str,
    ) -> anyhow::Result<()> {
        let Some(action) = Action::decode(payload) else {
            tracing::warn!(from, payload, "undecodable callback payload");
            return Ok(());
        };

        match action {
            Action::Cancel => {
                self.sessions.reset(from);
                self.edit(message, &self.board(), &[]);
            }
            Action::Pick(name) => {
                if !self.require_admin(from) {
                    return Ok(());
                }
                if self.items.contains(&name) {
                    self.sessions
                        .set(from, Session::ChoosingValue { key: name.clone() });
                    let choices = Self::status_choices(&name);
                    self.edit(message, &format!("{name} — choose a status:"), &choices);
                } else {
                    self.sessions.reset(from);
                    self.tell(from, "Unknown checkpoint.");
                }
            }
            Action::Set(name, status) => {
                return self.apply_change(from, Some(message), &name, Change::Explicit(status));
            }
            Action::Toggle(name) => {
                return self.apply_change(from, Some(message), &name, Change::Toggle);
            }
            Action::Delete(name) => {
                if !self.require_admin(from) {
                    return Ok(());
                }
                self.sessions.reset(from);
                match self.items.delete_item(&name) {
                    Ok(()) => {
                        self.tell(from, &format!("Deleted {name}."));
                        self.edit(message, &self.board(), &[]);
                    }
                    Err(StoreError::NotFound) => self.tell(from, "Unknown checkpoint."),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // The status-mutation sequence
    // -----------------------------------------------------------------------

    fn apply_change(
        &mut self,
        from: Identity,
        message: Option<MessageRef>,
        name: &str,
        change: Change,
    ) -> anyhow::Result<()> {
        // 1. Authorize.
        if !self.require_admin(from) {
            return Ok(());
        }
        // 2. Validate.
        if !self.items.contains(name) {
            self.sessions.reset(from);
            self.tell(from, "Unknown checkpoint.");
            return Ok(());
        }
        // 3–4. Compute, mutate, timestamp, persist.
        let (status, stamp) = match change {
            Change::Explicit(status) => {
                let stamp = self.items.set_status(name, status)?;
                (status, stamp)
            }
            Change::Toggle => self.items.toggle(name)?,
        };
        // 5. Fan out, pruning permanently unreachable subscribers.
        let note = format!("📣 {name}: {} ({stamp})", status.label());
        let reached = self.subscribers.notify_all(&self.transport, &note)?;
        tracing::info!(item = name, status = %status, reached, "status changed");
        // 6. Acknowledge the actor with a re-rendered board.
        self.sessions.reset(from);
        match message {
            Some(m) => self.edit(m, &self.board(), &[]),
            None => self.tell(from, &self.board()),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn board(&self) -> String {
        let mut lines = vec!["Checkpoint board:".to_string()];
        for (name, item) in self.items.iter() {
            let mut line = format!("{name} — {}", item.status.label());
            if let Some(updated) = &item.updated {
                line.push_str(&format!(" ({updated})"));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    fn pick_choices(&self, to_action: impl Fn(&str) -> Action) -> Vec<Choice> {
        let mut choices: Vec<Choice> = self
            .items
            .iter()
            .map(|(name, item)| {
                Choice::new(
                    format!("{name} ({})", item.status.label()),
                    to_action(name).encode(),
                )
            })
            .collect();
        choices.push(Choice::new("✖ cancel", Action::Cancel.encode()));
        choices
    }

    fn status_choices(name: &str) -> Vec<Choice> {
        let mut choices: Vec<Choice> = [Status::Clean, Status::Dirty, Status::Unknown]
            .iter()
            .map(|status| {
                Choice::new(
                    status.label(),
                    Action::Set(name.to_string(), *status).encode(),
                )
            })
            .collect();
        choices.push(Choice::new("✖ cancel", Action::Cancel.encode()));
        choices
    }

    // -----------------------------------------------------------------------
    // Outbound helpers
    // -----------------------------------------------------------------------

    /// Privilege gate: a rejection message, never a state transition.
    fn require_admin(&self, id: Identity) -> bool {
        if self.is_admin(id) {
            return true;
        }
        self.tell(id, "Not allowed.");
        false
    }

    /// Replies to the triggering actor are best effort; a failed reply must
    /// not fail the handler.
    fn tell(&self, to: Identity, text: &str) {
        if let Err(e) = self.transport.send_text(to, text) {
            tracing::warn!(to, error = %e, "reply failed");
        }
    }

    fn menu(&self, to: Identity, text: &str, choices: &[Choice]) {
        if let Err(e) = self.transport.send_menu(to, text, choices) {
            tracing::warn!(to, error = %e, "menu send failed");
        }
    }

    fn edit(&self, message: MessageRef, text: &str, choices: &[Choice]) {
        if let Err(e) = self.transport.edit_menu(message, text, choices) {
            tracing::warn!(chat = message.chat, error = %e, "menu edit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use crate::storage::MemoryStorage;
    use crate::transport::test_support::FakeTransport;

    const ADMIN: Identity = 100;
    const USER: Identity = 200;

    fn make_bot(transport: FakeTransport) -> Bot<MemoryStorage, FakeTransport> {
        let storage = MemoryStorage::new();
        let items = ItemStore::load(storage.clone()).expect("seed items");
        let subscribers = SubscriberRegistry::load(storage).expect("seed subscribers");
        Bot::new(items, subscribers, transport, vec![ADMIN])
    }

    fn command(from: Identity, name: &str) -> Inbound {
        Inbound::Command {
            from,
            name: name.to_string(),
        }
    }

    fn text(from: Identity, body: &str) -> Inbound {
        Inbound::Text {
            from,
            body: body.to_string(),
        }
    }

    fn callback(from: Identity, payload: &str) -> Inbound {
        Inbound::Callback {
            from,
            message: MessageRef {
                chat: from,
                message: 1,
            },
            payload: payload.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    #[test]
    fn first_interaction_subscribes() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(USER, "start")).unwrap();
        assert!(bot.subscribers().contains(USER));
    }

    // -----------------------------------------------------------------------
    // Privilege gate
    // -----------------------------------------------------------------------

    #[test]
    fn non_admin_never_leaves_idle() {
        let mut bot = make_bot(FakeTransport::default());
        for cmd in ["edit", "add", "del"] {
            bot.handle(command(USER, cmd)).unwrap();
            assert_eq!(bot.session(USER), Session::Idle, "command {cmd}");
        }
        let rejections = bot.transport().texts_to(USER);
        assert_eq!(rejections.iter().filter(|t| *t == "Not allowed.").count(), 3);
    }

    #[test]
    fn non_admin_mutation_leaves_item_and_fanout_untouched() {
        let mut bot = make_bot(FakeTransport::default());
        // Admin is subscribed and would receive any broadcast.
        bot.handle(command(ADMIN, "start")).unwrap();
        let sent_to_admin_before = bot.transport().texts_to(ADMIN).len();

        let payload = Action::Set("MAIN GATE".to_string(), Status::Clean).encode();
        bot.handle(callback(USER, &payload)).unwrap();

        assert_eq!(bot.items().get("MAIN GATE"), Some(&Item::unset()));
        assert_eq!(
            bot.transport().texts_to(ADMIN).len(),
            sent_to_admin_before,
            "no fan-out may reach subscribers"
        );
        assert_eq!(bot.transport().texts_to(USER), vec!["Not allowed.".to_string()]);
    }

    #[test]
    fn non_admin_toggle_rejected() {
        let mut bot = make_bot(FakeTransport::default());
        let payload = Action::Toggle("MAIN GATE".to_string()).encode();
        bot.handle(callback(USER, &payload)).unwrap();
        assert_eq!(bot.items().get("MAIN GATE"), Some(&Item::unset()));
    }

    #[test]
    fn non_admin_delete_rejected() {
        let mut bot = make_bot(FakeTransport::default());
        let payload = Action::Delete("MAIN GATE".to_string()).encode();
        bot.handle(callback(USER, &payload)).unwrap();
        assert!(bot.items().contains("MAIN GATE"));
    }

    // -----------------------------------------------------------------------
    // Edit wizard
    // -----------------------------------------------------------------------

    #[test]
    fn edit_wizard_full_flow() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "start")).unwrap();

        bot.handle(command(ADMIN, "edit")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Editing);

        let pick = Action::Pick("MAIN GATE".to_string()).encode();
        bot.handle(callback(ADMIN, &pick)).unwrap();
        assert_eq!(bot.session(ADMIN).pending_key(), Some("MAIN GATE"));

        let set = Action::Set("MAIN GATE".to_string(), Status::Clean).encode();
        bot.handle(callback(ADMIN, &set)).unwrap();

        assert_eq!(bot.session(ADMIN), Session::Idle);
        let item = bot.items().get("MAIN GATE").unwrap();
        assert_eq!(item.status, Status::Clean);
        assert!(item.updated.is_some());

        // The subscriber (the admin) received the broadcast.
        let broadcasts: Vec<String> = bot
            .transport()
            .texts_to(ADMIN)
            .into_iter()
            .filter(|t| t.contains("MAIN GATE") && t.contains("📣"))
            .collect();
        assert_eq!(broadcasts.len(), 1);
    }

    #[test]
    fn text_selection_while_editing_normalizes() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "edit")).unwrap();
        bot.handle(text(ADMIN, "  main gate ")).unwrap();
        assert_eq!(bot.session(ADMIN).pending_key(), Some("MAIN GATE"));
    }

    #[test]
    fn unknown_selection_while_editing_resets_with_error() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "edit")).unwrap();
        bot.handle(text(ADMIN, "NOT A PLACE")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Idle);
        assert!(
            bot.transport()
                .texts_to(ADMIN)
                .contains(&"Unknown checkpoint.".to_string())
        );
    }

    #[test]
    fn invalid_input_while_choosing_reprompts_without_losing_state() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "edit")).unwrap();
        bot.handle(callback(ADMIN, &Action::Pick("MAIN GATE".to_string()).encode()))
            .unwrap();
        bot.handle(text(ADMIN, "this is not a status")).unwrap();
        assert_eq!(bot.session(ADMIN).pending_key(), Some("MAIN GATE"));
        assert_eq!(bot.items().get("MAIN GATE"), Some(&Item::unset()));
    }

    #[test]
    fn cancel_from_choosing_resets_session_and_item() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "edit")).unwrap();
        bot.handle(callback(ADMIN, &Action::Pick("MAIN GATE".to_string()).encode()))
            .unwrap();
        assert_eq!(bot.session(ADMIN).pending_key(), Some("MAIN GATE"));

        bot.handle(callback(ADMIN, &Action::Cancel.encode())).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Idle);
        assert_eq!(bot.session(ADMIN).pending_key(), None);
        assert_eq!(bot.items().get("MAIN GATE"), Some(&Item::unset()));
    }

    #[test]
    fn unrelated_command_drops_abandoned_wizard() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "edit")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Editing);
        bot.handle(command(ADMIN, "status")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Idle);
    }

    // -----------------------------------------------------------------------
    // Add wizard
    // -----------------------------------------------------------------------

    #[test]
    fn add_wizard_creates_item_and_returns_to_idle() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "add")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Adding);

        bot.handle(text(ADMIN, " west bridge ")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Idle);
        assert_eq!(bot.items().get("WEST BRIDGE"), Some(&Item::unset()));
    }

    #[test]
    fn add_wizard_rejects_duplicate_and_resets() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "add")).unwrap();
        bot.handle(text(ADMIN, "main gate")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Idle);
        assert!(
            bot.transport()
                .texts_to(ADMIN)
                .contains(&"That checkpoint already exists.".to_string())
        );
        assert_eq!(bot.items().get("MAIN GATE"), Some(&Item::unset()));
    }

    #[test]
    fn add_wizard_rejects_blank_name() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(command(ADMIN, "add")).unwrap();
        let count_before = bot.items().len();
        bot.handle(text(ADMIN, "   ")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Idle);
        assert_eq!(bot.items().len(), count_before);
    }

    // -----------------------------------------------------------------------
    // Toggle & delete
    // -----------------------------------------------------------------------

    #[test]
    fn toggle_callbacks_walk_the_cycle() {
        let mut bot = make_bot(FakeTransport::default());
        let payload = Action::Toggle("MAIN GATE".to_string()).encode();
        let mut seen = Vec::new();
        for _ in 0..3 {
            bot.handle(callback(ADMIN, &payload)).unwrap();
            seen.push(bot.items().get("MAIN GATE").unwrap().status);
        }
        assert_eq!(seen, vec![Status::Clean, Status::Dirty, Status::Clean]);
    }

    #[test]
    fn delete_callback_removes_item() {
        let mut bot = make_bot(FakeTransport::default());
        let payload = Action::Delete("MAIN GATE".to_string()).encode();
        bot.handle(callback(ADMIN, &payload)).unwrap();
        assert!(!bot.items().contains("MAIN GATE"));
    }

    #[test]
    fn set_on_unknown_item_is_rejected_without_mutation() {
        let mut bot = make_bot(FakeTransport::default());
        let payload = Action::Set("GHOST".to_string(), Status::Clean).encode();
        bot.handle(callback(ADMIN, &payload)).unwrap();
        assert!(!bot.items().contains("GHOST"));
        assert!(
            bot.transport()
                .texts_to(ADMIN)
                .contains(&"Unknown checkpoint.".to_string())
        );
    }

    #[test]
    fn undecodable_payload_is_ignored() {
        let mut bot = make_bot(FakeTransport::default());
        bot.handle(callback(ADMIN, "??garbage??")).unwrap();
        assert_eq!(bot.session(ADMIN), Session::Idle);
    }
}
