//! Repository objects over the injected [`crate::storage::Storage`] boundary.

pub mod items;
pub mod subscribers;

pub use items::ItemStore;
pub use subscribers::SubscriberRegistry;

/// Store-level failures, surfaced as values rather than panics so the
/// dispatcher can turn them into short user-visible messages.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown item")]
    NotFound,

    #[error("item name is empty")]
    EmptyName,

    #[error("item name is too long")]
    NameTooLong,

    #[error("item already exists")]
    AlreadyExists,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
