//! Message store
//!
//! Partitioned by conversation key: every conversation is its own JSON
//! document on disk and its own lock in memory, so sends in different
//! conversations never wait on each other. Writes go to a temp file and are
//! renamed into place.

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::delivery::DeliveryHub;
use super::key::{conversation_key, participants};
use super::models::Message;
use super::{validate_send, ChatError};

/// On-disk form of one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDocument {
    conversation_key: String,
    /// Kept in (created_at, seq) order
    messages: Vec<Message>,
}

pub struct MessageStore {
    dir: PathBuf,
    conversations: RwLock<HashMap<String, Arc<RwLock<ConversationDocument>>>>,
    /// user id -> keys of the conversations they take part in
    by_user: RwLock<HashMap<String, BTreeSet<String>>>,
    next_seq: AtomicU64,
    delivery: Arc<DeliveryHub>,
}

fn document_path(dir: &Path, conversation_key: &str) -> PathBuf {
    let digest = Sha256::digest(conversation_key.as_bytes());
    dir.join(format!("{:x}.json", digest))
}

impl MessageStore {
    /// Open the store rooted at `dir`, loading every conversation on disk
    pub async fn open(dir: impl Into<PathBuf>, delivery: Arc<DeliveryHub>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {:?}", dir))?;

        let store = Self {
            dir,
            conversations: RwLock::new(HashMap::new()),
            by_user: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            delivery,
        };

        store.load_existing().await?;

        info!(
            "MessageStore initialized with {} conversations",
            store.conversations.read().await.len()
        );

        Ok(store)
    }

    async fn load_existing(&self) -> anyhow::Result<()> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut max_seq = None;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let mut document = match Self::read_document(&path).await {
                Ok(document) => document,
                Err(e) => {
                    warn!("Failed to load conversation from {:?}: {:#}", path, e);
                    continue;
                }
            };
            let Some((a, b)) = participants(&document.conversation_key) else {
                warn!(
                    "Skipping {:?}: malformed conversation key {:?}",
                    path, document.conversation_key
                );
                continue;
            };
            let (a, b) = (a.to_string(), b.to_string());

            document.messages.sort_by_key(Message::order_key);
            max_seq = document.messages.iter().map(|m| m.seq).chain(max_seq).max();

            let key = document.conversation_key.clone();
            self.index(&key, &a, &b).await;
            self.conversations
                .write()
                .await
                .insert(key, Arc::new(RwLock::new(document)));
        }

        self.next_seq
            .store(max_seq.map_or(0, |seq| seq + 1), Ordering::SeqCst);
        Ok(())
    }

    async fn read_document(path: &Path) -> anyhow::Result<ConversationDocument> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    async fn persist(&self, document: &ConversationDocument) -> anyhow::Result<()> {
        let path = document_path(&self.dir, &document.conversation_key);
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(document)?;
        fs::write(&temp_path, json)
            .await
            .with_context(|| format!("Failed to write {:?}", temp_path))?;
        fs::rename(&temp_path, &path)
            .await
            .with_context(|| format!("Failed to move {:?} into place", temp_path))?;

        Ok(())
    }

    async fn index(&self, key: &str, a: &str, b: &str) {
        let mut by_user = self.by_user.write().await;
        for user in [a, b] {
            by_user
                .entry(user.to_string())
                .or_default()
                .insert(key.to_string());
        }
    }

    async fn partition(&self, key: &str) -> Option<Arc<RwLock<ConversationDocument>>> {
        self.conversations.read().await.get(key).cloned()
    }

    async fn partition_or_create(&self, key: &str) -> Arc<RwLock<ConversationDocument>> {
        if let Some(partition) = self.partition(key).await {
            return partition;
        }

        self.conversations
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(ConversationDocument {
                    conversation_key: key.to_string(),
                    messages: Vec::new(),
                }))
            })
            .clone()
    }

    /// Drop a partition that never made it to disk.
    ///
    /// Skipped while another task still holds the partition, since it may be
    /// about to append to it.
    async fn forget_if_unused(&self, key: &str, partition: &Arc<RwLock<ConversationDocument>>) {
        let mut conversations = self.conversations.write().await;
        // One reference in the map, one held by the caller.
        if Arc::strong_count(partition) == 2 {
            conversations.remove(key);
            debug!("Dropped empty conversation {}", key);
        }
    }

    /// Store a new message and fan it out to live subscribers.
    ///
    /// The message only becomes visible once its conversation document is on
    /// disk; a failed write leaves no trace of it.
    pub async fn append(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        let key = validate_send(sender_id, receiver_id, content)?;
        let partition = self.partition_or_create(&key).await;

        let message = {
            let mut document = partition.write().await;

            // Never step back in time inside a conversation.
            let now = Utc::now();
            let created_at = document
                .messages
                .last()
                .map_or(now, |last| last.created_at.max(now));

            let message = Message {
                id: Uuid::new_v4().to_string(),
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                conversation_key: key.clone(),
                content: content.to_string(),
                read: false,
                created_at,
                seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            };

            document.messages.push(message.clone());
            if let Err(e) = self.persist(&document).await {
                document.messages.pop();
                if document.messages.is_empty() {
                    self.forget_if_unused(&key, &partition).await;
                }
                error!("Failed to persist message in {}: {:#}", key, e);
                return Err(ChatError::Store(e));
            }
            message
        };

        self.index(&key, sender_id, receiver_id).await;

        let reached = self.delivery.publish(&message, None);
        debug!(
            "Added message {} to {} (seq {}, {} live subscribers)",
            message.id, key, message.seq, reached
        );

        Ok(message)
    }

    /// All messages between `viewer` and `other`, oldest first.
    ///
    /// Opening a conversation reads it: every message addressed to `viewer`
    /// is marked read under the same lock that produces the listing, so the
    /// returned messages already carry `read = true` for them.
    pub async fn list_conversation(
        &self,
        viewer: &str,
        other: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let key = conversation_key(viewer, other)?;
        let Some(partition) = self.partition(&key).await else {
            return Ok(Vec::new());
        };

        let mut document = partition.write().await;
        let unread: Vec<usize> = document
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.receiver_id == viewer && !m.read)
            .map(|(i, _)| i)
            .collect();

        if !unread.is_empty() {
            for &i in &unread {
                document.messages[i].read = true;
            }
            if let Err(e) = self.persist(&document).await {
                for &i in &unread {
                    document.messages[i].read = false;
                }
                error!("Failed to persist read state in {}: {:#}", key, e);
                return Err(ChatError::Store(e));
            }
            debug!("Marked {} messages read in {} for {}", unread.len(), key, viewer);
        }

        Ok(document.messages.clone())
    }

    /// Keys of every conversation `user_id` takes part in
    pub async fn list_for_user(&self, user_id: &str) -> BTreeSet<String> {
        self.by_user
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every message sent or received by `user_id`
    pub async fn messages_for_user(&self, user_id: &str) -> Vec<Message> {
        let mut messages = Vec::new();
        for key in self.list_for_user(user_id).await {
            if let Some(partition) = self.partition(&key).await {
                messages.extend(partition.read().await.messages.iter().cloned());
            }
        }
        messages
    }

    /// A stored message, looked up inside its conversation
    pub async fn find(&self, conversation_key: &str, message_id: &str) -> Option<Message> {
        let partition = self.partition(conversation_key).await?;
        let document = partition.read().await;
        document
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> (MessageStore, Arc<DeliveryHub>) {
        let hub = Arc::new(DeliveryHub::new(16));
        let store = MessageStore::open(dir.path(), hub.clone()).await.unwrap();
        (store, hub)
    }

    #[tokio::test]
    async fn test_append_assigns_key_and_defaults() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;

        let msg = store.append("bob", "alice", "hello").await.unwrap();

        assert_eq!(msg.conversation_key, "alice:bob");
        assert!(!msg.read);
        assert_eq!(msg.sender_id, "bob");
        assert_eq!(msg.receiver_id, "alice");
    }

    #[tokio::test]
    async fn test_rejected_sends_create_nothing() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;

        assert!(matches!(
            store.append("alice", "alice", "me").await,
            Err(ChatError::InvalidParticipants)
        ));
        assert!(matches!(
            store.append("alice", "bob", "   ").await,
            Err(ChatError::EmptyContent)
        ));
        assert!(matches!(
            store.append("alice", "", "hi").await,
            Err(ChatError::MissingReceiver)
        ));

        assert!(store.list_for_user("alice").await.is_empty());
        assert!(store.messages_for_user("alice").await.is_empty());
    }

    #[tokio::test]
    async fn test_listing_preserves_call_order() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;

        for i in 0..20 {
            let (from, to) = if i % 2 == 0 { ("a", "b") } else { ("b", "a") };
            store.append(from, to, &format!("m{}", i)).await.unwrap();
        }

        let messages = store.list_conversation("a", "b").await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<_> = (0..20).map(|i| format!("m{}", i)).collect();
        assert_eq!(contents, expected);
        assert!(messages.windows(2).all(|w| w[0].order_key() < w[1].order_key()));
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_listing_marks_only_viewer_messages_read() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;

        store.append("a", "b", "to b").await.unwrap();
        store.append("b", "a", "to a").await.unwrap();

        let seen_by_a = store.list_conversation("a", "b").await.unwrap();
        let to_a = seen_by_a.iter().find(|m| m.content == "to a").unwrap();
        let to_b = seen_by_a.iter().find(|m| m.content == "to b").unwrap();
        assert!(to_a.read);
        assert!(!to_b.read);

        let seen_by_b = store.list_conversation("b", "a").await.unwrap();
        assert!(seen_by_b.iter().all(|m| m.read));
    }

    #[tokio::test]
    async fn test_empty_conversation_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;

        assert!(store.list_conversation("a", "b").await.unwrap().is_empty());
        assert!(matches!(
            store.list_conversation("a", "a").await,
            Err(ChatError::InvalidParticipants)
        ));
    }

    #[tokio::test]
    async fn test_list_for_user_tracks_counterparts() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;

        store.append("a", "b", "1").await.unwrap();
        store.append("c", "a", "2").await.unwrap();
        store.append("b", "a", "3").await.unwrap();

        let keys: Vec<_> = store.list_for_user("a").await.into_iter().collect();
        assert_eq!(keys, vec!["a:b".to_string(), "a:c".to_string()]);
        assert_eq!(store.list_for_user("c").await.len(), 1);
        assert_eq!(store.messages_for_user("a").await.len(), 3);
    }

    #[tokio::test]
    async fn test_reload_keeps_order_and_read_state() {
        let dir = TempDir::new().unwrap();
        let first_id = {
            let (store, _) = open_store(&dir).await;
            let first = store.append("a", "b", "first").await.unwrap();
            store.append("a", "b", "second").await.unwrap();
            store.list_conversation("b", "a").await.unwrap();
            store.append("a", "b", "third").await.unwrap();
            first.id
        };

        let (store, _) = open_store(&dir).await;
        assert!(store.find("a:b", &first_id).await.is_some());

        let next = store.append("b", "a", "after reload").await.unwrap();
        let messages = store.list_conversation("a", "b").await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third", "after reload"]);
        assert!(messages[0].read && messages[1].read);
        assert!(!messages[2].read);
        assert!(next.seq > messages[2].seq);
    }

    #[tokio::test]
    async fn test_failed_first_append_leaves_no_conversation() {
        let dir = TempDir::new().unwrap();
        let conversations = dir.path().join("conversations");
        let store = MessageStore::open(&conversations, Arc::new(DeliveryHub::new(16)))
            .await
            .unwrap();

        std::fs::remove_dir_all(&conversations).unwrap();
        assert!(matches!(
            store.append("a", "b", "lost").await,
            Err(ChatError::Store(_))
        ));
        assert!(store.conversations.read().await.is_empty());
        assert!(store.list_for_user("a").await.is_empty());
        assert!(store.list_conversation("a", "b").await.unwrap().is_empty());

        std::fs::create_dir_all(&conversations).unwrap();
        store.append("a", "b", "kept").await.unwrap();
        assert_eq!(store.conversations.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_keeps_earlier_messages() {
        let dir = TempDir::new().unwrap();
        let conversations = dir.path().join("conversations");
        let store = MessageStore::open(&conversations, Arc::new(DeliveryHub::new(16)))
            .await
            .unwrap();

        store.append("a", "b", "first").await.unwrap();
        std::fs::remove_dir_all(&conversations).unwrap();
        assert!(store.append("a", "b", "lost").await.is_err());

        let contents: Vec<_> = store
            .messages_for_user("a")
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first"]);
    }

    #[tokio::test]
    async fn test_append_publishes_to_joined_room() {
        let dir = TempDir::new().unwrap();
        let (store, hub) = open_store(&dir).await;

        let mut watcher = hub.join("a:b", hub.connect());
        let sent = store.append("a", "b", "live").await.unwrap();

        let delivered = watcher.recv().await.unwrap();
        assert_eq!(delivered, sent);
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_different_conversations() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;
        let store = Arc::new(store);

        let mut tasks = Vec::new();
        for peer in ["b", "c", "d", "e"] {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..10 {
                    store.append("a", peer, &format!("{}-{}", peer, i)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.list_for_user("a").await.len(), 4);
        assert_eq!(store.messages_for_user("a").await.len(), 40);
        let with_c = store.list_conversation("c", "a").await.unwrap();
        let expected: Vec<_> = (0..10).map(|i| format!("c-{}", i)).collect();
        let contents: Vec<_> = with_c.iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, expected);
    }
}
