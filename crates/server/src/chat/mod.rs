//! Chat Service Layer
//!
//! Direct messaging between two users: conversation identity, the message
//! store with read state, the per-user conversation directory, and live
//! delivery to connected clients.

pub mod delivery;
pub mod handlers;
pub mod key;
pub mod models;
pub mod store;
pub mod summary;

pub use handlers::router;
pub use key::conversation_key;
pub use models::{ChatSummary, Message};
pub use store::MessageStore;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("A conversation needs two distinct participants")]
    InvalidParticipants,
    #[error("Message content cannot be empty")]
    EmptyContent,
    #[error("receiverId is required")]
    MissingReceiver,
    #[error("Message store unavailable")]
    Store(#[source] anyhow::Error),
}

/// Check a send request and derive its conversation key.
///
/// Runs before anything touches storage.
pub fn validate_send(sender_id: &str, receiver_id: &str, content: &str) -> Result<String, ChatError> {
    if receiver_id.trim().is_empty() {
        return Err(ChatError::MissingReceiver);
    }
    if content.trim().is_empty() {
        return Err(ChatError::EmptyContent);
    }
    conversation_key(sender_id, receiver_id)
}
