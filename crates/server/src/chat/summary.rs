//! Per-user conversation list.

use std::collections::HashMap;

use super::models::{ChatSummary, Message};
use super::store::MessageStore;

/// Fold the messages touching `user_id` into one summary per conversation.
///
/// Single pass: each message updates its conversation's latest message and
/// unread tally. The result is ordered most recently active first.
pub fn summarize<'a, I>(user_id: &str, messages: I) -> Vec<ChatSummary>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut groups: HashMap<&str, (&Message, usize)> = HashMap::new();

    for message in messages {
        if message.sender_id != user_id && message.receiver_id != user_id {
            continue;
        }
        let unread = usize::from(message.receiver_id == user_id && !message.read);

        groups
            .entry(message.conversation_key.as_str())
            .and_modify(|(latest, tally)| {
                if message.order_key() > latest.order_key() {
                    *latest = message;
                }
                *tally += unread;
            })
            .or_insert((message, unread));
    }

    let mut summaries: Vec<ChatSummary> = groups
        .into_iter()
        .map(|(key, (latest, unread_count))| ChatSummary {
            conversation_key: key.to_string(),
            last_message: latest.clone(),
            unread_count,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.last_message
            .order_key()
            .cmp(&a.last_message.order_key())
            .then_with(|| a.conversation_key.cmp(&b.conversation_key))
    });
    summaries
}

impl MessageStore {
    /// Conversation list of `user_id`, most recently active first
    pub async fn list_chats(&self, user_id: &str) -> Vec<ChatSummary> {
        let messages = self.messages_for_user(user_id).await;
        summarize(user_id, &messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::delivery::DeliveryHub;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn msg(seq: u64, secs: i64, from: &str, to: &str, read: bool) -> Message {
        Message {
            id: format!("m{}", seq),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            conversation_key: crate::chat::conversation_key(from, to).unwrap(),
            content: format!("content {}", seq),
            read,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            seq,
        }
    }

    #[test]
    fn test_latest_message_and_unread_tally() {
        let messages = vec![
            msg(0, 0, "b", "a", false),
            msg(1, 5, "a", "b", false),
            msg(2, 3, "b", "a", true),
            msg(3, 1, "c", "a", false),
            msg(4, 1, "c", "a", false),
        ];

        let chats = summarize("a", &messages);
        assert_eq!(chats.len(), 2);

        assert_eq!(chats[0].conversation_key, "a:b");
        assert_eq!(chats[0].last_message.id, "m1");
        assert_eq!(chats[0].unread_count, 1);

        // Equal timestamps: the later insertion wins.
        assert_eq!(chats[1].conversation_key, "a:c");
        assert_eq!(chats[1].last_message.id, "m4");
        assert_eq!(chats[1].unread_count, 2);
    }

    #[test]
    fn test_messages_of_other_users_are_ignored() {
        let messages = vec![msg(0, 0, "b", "c", false)];
        assert!(summarize("a", &messages).is_empty());
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let messages = vec![
            msg(0, 10, "a", "b", false),
            msg(1, 20, "c", "a", false),
            msg(2, 15, "a", "d", false),
        ];
        let first = summarize("a", &messages);
        let reversed: Vec<_> = messages.iter().rev().collect();
        let second = summarize("a", reversed);

        let keys: Vec<_> = first.iter().map(|c| c.conversation_key.as_str()).collect();
        assert_eq!(keys, vec!["a:c", "a:d", "a:b"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_hello_hi_scenario() {
        let dir = TempDir::new().unwrap();
        let store = MessageStore::open(dir.path(), Arc::new(DeliveryHub::new(8)))
            .await
            .unwrap();

        store.append("A", "B", "hello").await.unwrap();
        store.append("B", "A", "hi").await.unwrap();

        let contents: Vec<_> = store
            .list_conversation("A", "B")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["hello", "hi"]);

        let chats_a = store.list_chats("A").await;
        assert_eq!(chats_a.len(), 1);
        assert_eq!(chats_a[0].last_message.content, "hi");
        assert_eq!(chats_a[0].unread_count, 0);

        assert_eq!(store.list_chats("B").await[0].unread_count, 1);
        store.list_conversation("B", "A").await.unwrap();
        assert_eq!(store.list_chats("B").await[0].unread_count, 0);
    }

    #[tokio::test]
    async fn test_unread_count_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = MessageStore::open(dir.path(), Arc::new(DeliveryHub::new(8)))
            .await
            .unwrap();

        for i in 0..3 {
            store.append("other", "viewer", &format!("ping {}", i)).await.unwrap();
        }
        store.append("viewer", "third", "unrelated").await.unwrap();

        let unread = |chats: Vec<ChatSummary>| {
            chats
                .into_iter()
                .find(|c| c.conversation_key == "other:viewer")
                .map(|c| c.unread_count)
        };

        assert_eq!(unread(store.list_chats("viewer").await), Some(3));

        store.list_conversation("viewer", "other").await.unwrap();
        assert_eq!(unread(store.list_chats("viewer").await), Some(0));

        store.append("other", "viewer", "again").await.unwrap();
        assert_eq!(unread(store.list_chats("viewer").await), Some(1));

        // One entry per counterpart.
        assert_eq!(store.list_chats("viewer").await.len(), 2);
    }
}
