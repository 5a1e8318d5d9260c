//! Per-identity wizard state.
//!
//! A session remembers what the next message from an identity means. It is
//! process-memory only: a restart silently drops any in-flight wizard,
//! which is acceptable because every wizard is restartable and no step
//! mutates anything before it completes.

use std::collections::HashMap;

use crate::model::Identity;

/// Wizard mode, with the pending item name attached where one exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Idle,
    /// The next text message is a candidate item name.
    Adding,
    /// Waiting for the admin to pick which item to edit.
    Editing,
    /// Waiting for a status choice for `key`.
    ChoosingValue { key: String },
}

impl Session {
    /// The item name mid-edit, if any.
    pub fn pending_key(&self) -> Option<&str> {
        match self {
            Self::ChoosingValue { key } => Some(key),
            _ => None,
        }
    }
}

/// Lazily-populated map of identity → session. Absent means `Idle`.
#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: HashMap<Identity, Session>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Identity) -> Session {
        self.sessions.get(&id).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, id: Identity, session: Session) {
        if session == Session::Idle {
            self.sessions.remove(&id);
        } else {
            self.sessions.insert(id, session);
        }
    }

    /// Back to `Idle`: wizard completed, cancelled, or abandoned.
    pub fn reset(&mut self, id: Identity) {
        self.sessions.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identity_is_idle() {
        let sessions = SessionMap::new();
        assert_eq!(sessions.get(99), Session::Idle);
    }

    #[test]
    fn set_and_reset() {
        let mut sessions = SessionMap::new();
        sessions.set(1, Session::Editing);
        assert_eq!(sessions.get(1), Session::Editing);

        sessions.set(
            1,
            Session::ChoosingValue {
                key: "FOO".to_string(),
            },
        );
        assert_eq!(sessions.get(1).pending_key(), Some("FOO"));

        sessions.reset(1);
        assert_eq!(sessions.get(1), Session::Idle);
        assert_eq!(sessions.get(1).pending_key(), None);
    }

    #[test]
    fn setting_idle_clears_the_entry() {
        let mut sessions = SessionMap::new();
        sessions.set(1, Session::Adding);
        sessions.set(1, Session::Idle);
        assert_eq!(sessions.get(1), Session::Idle);
    }

    #[test]
    fn sessions_are_independent_per_identity() {
        let mut sessions = SessionMap::new();
        sessions.set(1, Session::Adding);
        sessions.set(2, Session::Editing);
        assert_eq!(sessions.get(1), Session::Adding);
        assert_eq!(sessions.get(2), Session::Editing);
        sessions.reset(1);
        assert_eq!(sessions.get(2), Session::Editing);
    }
}
