//! Live delivery of new messages to connected clients.
//!
//! Rooms are conversation keys. Delivery is best effort: a client that is not
//! subscribed when a message is published never sees that event and has to
//! refetch from the store, which stays the system of record.
//!
//! Each message id is handed to a room at most once, however many times it
//! is published.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::models::Message;

/// Identifies one live client connection
pub type ConnectionId = u64;

/// How many delivered message ids are remembered for de-duplication
const DELIVERED_MEMORY: usize = 4096;

#[derive(Clone, Debug)]
pub struct DeliveryEvent {
    pub message: Message,
    /// Connection that relayed the event; it is not echoed back there
    pub origin: Option<ConnectionId>,
}

/// Recently delivered message ids, oldest evicted first
#[derive(Default)]
struct DeliveredIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl DeliveredIds {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn remember(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > DELIVERED_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

/// Subscription registry keyed by conversation key
pub struct DeliveryHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<DeliveryEvent>>>,
    delivered: Mutex<DeliveredIds>,
    capacity: usize,
    next_connection: AtomicU64,
}

impl DeliveryHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            delivered: Mutex::new(DeliveredIds::default()),
            capacity: capacity.max(1),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new client connection
    pub fn connect(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribe `connection` to the room of `conversation_key`.
    ///
    /// The subscription leaves the room when dropped.
    pub fn join(self: &Arc<Self>, conversation_key: &str, connection: ConnectionId) -> Subscription {
        let rx = self
            .rooms
            .write()
            .entry(conversation_key.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        debug!("[Delivery] connection {} joined {}", connection, conversation_key);

        Subscription {
            hub: self.clone(),
            conversation_key: conversation_key.to_string(),
            connection,
            rx: Some(rx),
        }
    }

    /// Fan a stored message out to the subscribers of its conversation.
    ///
    /// Returns how many subscribers the event was handed to. A message that
    /// already reached its room is not sent again. Never fails.
    pub fn publish(&self, message: &Message, origin: Option<ConnectionId>) -> usize {
        let rooms = self.rooms.read();
        let Some(tx) = rooms.get(&message.conversation_key) else {
            return 0;
        };

        let mut delivered = self.delivered.lock();
        if delivered.contains(&message.id) {
            debug!("[Delivery] message {} already delivered", message.id);
            return 0;
        }

        let reached = tx
            .send(DeliveryEvent {
                message: message.clone(),
                origin,
            })
            .unwrap_or(0);
        if reached > 0 {
            delivered.remember(&message.id);
        }
        reached
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn subscriber_count(&self, conversation_key: &str) -> usize {
        self.rooms
            .read()
            .get(conversation_key)
            .map_or(0, |tx| tx.receiver_count())
    }

    fn release(&self, conversation_key: &str) {
        let mut rooms = self.rooms.write();
        if rooms
            .get(conversation_key)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            rooms.remove(conversation_key);
            debug!("[Delivery] room {} closed", conversation_key);
        }
    }
}

/// A connection's membership in one room
pub struct Subscription {
    hub: Arc<DeliveryHub>,
    conversation_key: String,
    connection: ConnectionId,
    rx: Option<broadcast::Receiver<DeliveryEvent>>,
}

impl Subscription {
    pub fn conversation_key(&self) -> &str {
        &self.conversation_key
    }

    /// Next message for this connection, skipping its own relays.
    ///
    /// Returns `None` once the room is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) if event.origin == Some(self.connection) => continue,
                Ok(event) => return Some(event.message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        "[Delivery] connection {} dropped {} events in {}",
                        self.connection, missed, self.conversation_key
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver has to go first so the room sees zero subscribers.
        self.rx.take();
        self.hub.release(&self.conversation_key);
        debug!(
            "[Delivery] connection {} left {}",
            self.connection, self.conversation_key
        );
    }
}
