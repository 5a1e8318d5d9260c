use serde::{Deserialize, Serialize};

/// Numeric endpoint identifier for a chat participant.
pub type Identity = i64;

/// Condition of a checkpoint item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "UNSET")]
    Unset,
    #[serde(rename = "CLEAN")]
    Clean,
    #[serde(rename = "DIRTY")]
    Dirty,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Status {
    /// Enumerated string form, matching the persisted document.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "UNSET",
            Self::Clean => "CLEAN",
            Self::Dirty => "DIRTY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Single-letter wire code for callback payloads.
    pub const fn code(self) -> char {
        match self {
            Self::Unset => 'u',
            Self::Clean => 'c',
            Self::Dirty => 'd',
            Self::Unknown => 'k',
        }
    }

    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'u' => Some(Self::Unset),
            'c' => Some(Self::Clean),
            'd' => Some(Self::Dirty),
            'k' => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Menu label with the emoji marker the keyboards use.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unset => "➖ unset",
            Self::Clean => "✅ clean",
            Self::Dirty => "🔴 dirty",
            Self::Unknown => "❓ unknown",
        }
    }

    /// Deterministic toggle cycle. Once an item leaves `Unset` it never
    /// returns: `Unset → Clean → Dirty → Clean → Dirty → …`.
    pub const fn toggled(self) -> Self {
        match self {
            Self::Unset | Self::Dirty | Self::Unknown => Self::Clean,
            Self::Clean => Self::Dirty,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named checkpoint's persisted record.
///
/// `updated` is `None` while the status has never left `Unset`; it holds a
/// formatted local timestamp once an admin sets or toggles the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "value")]
    pub status: Status,
    #[serde(rename = "updated")]
    pub updated: Option<String>,
}

impl Item {
    /// A freshly created item: `Unset`, never updated.
    pub const fn unset() -> Self {
        Self {
            status: Status::Unset,
            updated: None,
        }
    }
}

/// Format the current wall clock the way the persisted documents and
/// broadcast messages expect it.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_serde() {
        for status in [Status::Unset, Status::Clean, Status::Dirty, Status::Unknown] {
            let json = serde_json::to_string(&status).unwrap();
            let back: Status = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn status_codes_roundtrip() {
        for status in [Status::Unset, Status::Clean, Status::Dirty, Status::Unknown] {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code('z'), None);
    }

    #[test]
    fn toggle_never_returns_to_unset() {
        let mut status = Status::Unset;
        let mut seen = Vec::new();
        for _ in 0..5 {
            status = status.toggled();
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                Status::Clean,
                Status::Dirty,
                Status::Clean,
                Status::Dirty,
                Status::Clean
            ]
        );
    }

    #[test]
    fn unknown_toggles_to_clean() {
        assert_eq!(Status::Unknown.toggled(), Status::Clean);
    }

    #[test]
    fn item_serializes_with_wire_field_names() {
        let item = Item {
            status: Status::Clean,
            updated: Some("2026-01-02 03:04:05".to_string()),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["value"], "CLEAN");
        assert_eq!(json["updated"], "2026-01-02 03:04:05");
    }

    #[test]
    fn unset_item_has_null_timestamp() {
        let json = serde_json::to_value(Item::unset()).unwrap();
        assert_eq!(json["value"], "UNSET");
        assert!(json["updated"].is_null());
    }
}
