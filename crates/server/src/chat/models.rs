use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::auth::{self, Role, UserDirectory, UserInfo};

/// A single direct message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub conversation_key: String,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    /// Insertion sequence, breaks `created_at` ties
    pub seq: u64,
}

impl Message {
    /// Position in a conversation's total order
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }
}

/// One entry of a user's conversation list
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSummary {
    pub conversation_key: String,
    pub last_message: Message,
    pub unread_count: usize,
}

/// Public card of a participant, attached to messages on the way out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCard {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub profile_image: Option<String>,
}

impl From<UserInfo> for UserCard {
    fn from(user: UserInfo) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            profile_image: user.profile_image,
        }
    }
}

/// Message with sender and receiver expanded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Option<UserCard>,
    pub receiver: Option<UserCard>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummaryView {
    pub conversation_key: String,
    pub last_message: MessageView,
    pub unread_count: usize,
}

/// Input for sending a message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub content: String,
}

/// Expands user ids into [`UserCard`]s, looking each id up at most once.
///
/// Expansion is a projection over already computed results; it never
/// filters or reorders them.
pub struct CardCache {
    users: Arc<dyn UserDirectory>,
    cards: HashMap<String, Option<UserCard>>,
}

impl CardCache {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self {
            users,
            cards: HashMap::new(),
        }
    }

    pub async fn card(&mut self, user_id: &str) -> auth::Result<Option<UserCard>> {
        if let Some(card) = self.cards.get(user_id) {
            return Ok(card.clone());
        }

        let card = self.users.find_user(user_id).await?.map(UserCard::from);
        self.cards.insert(user_id.to_string(), card.clone());
        Ok(card)
    }

    pub async fn expand(&mut self, message: Message) -> auth::Result<MessageView> {
        let sender = self.card(&message.sender_id).await?;
        let receiver = self.card(&message.receiver_id).await?;
        Ok(MessageView {
            message,
            sender,
            receiver,
        })
    }

    pub async fn expand_all(&mut self, messages: Vec<Message>) -> auth::Result<Vec<MessageView>> {
        let mut views = Vec::with_capacity(messages.len());
        for message in messages {
            views.push(self.expand(message).await?);
        }
        Ok(views)
    }

    pub async fn expand_summary(&mut self, summary: ChatSummary) -> auth::Result<ChatSummaryView> {
        Ok(ChatSummaryView {
            conversation_key: summary.conversation_key,
            last_message: self.expand(summary.last_message).await?,
            unread_count: summary.unread_count,
        })
    }
}
