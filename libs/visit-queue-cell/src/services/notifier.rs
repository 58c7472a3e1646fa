use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::{QueueEvent, QueueNotification};

pub type GlobalSender = broadcast::Sender<String>;
pub type GlobalReceiver = broadcast::Receiver<String>;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<QueueNotification>,
}

type SubscriberList = Mutex<Vec<Subscriber>>;

fn lock(list: &SubscriberList) -> MutexGuard<'_, Vec<Subscriber>> {
    list.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fan-out of queue events to per-subscriber bounded channels, in
/// registration order. Publishing never blocks and never fails: a full
/// subscriber misses the event, a closed one is pruned.
pub struct QueueNotifier {
    clinic_id: String,
    subscribers: Arc<SubscriberList>,
    next_id: AtomicU64,
    buffer: usize,
    global_sender: GlobalSender,
}

impl QueueNotifier {
    pub fn new(clinic_id: &str, buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (global_sender, _) = broadcast::channel(buffer);

        Self {
            clinic_id: clinic_id.to_string(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            buffer,
            global_sender,
        }
    }

    pub fn subscribe(&self) -> QueueSubscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        lock(&self.subscribers).push(Subscriber { id, sender });
        debug!("Subscriber {} registered for clinic {}", id, self.clinic_id);

        QueueSubscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Serialized notifications for transport adapters (websocket, SSE).
    pub fn subscribe_global(&self) -> GlobalReceiver {
        self.global_sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    pub fn publish(&self, events: Vec<QueueEvent>) {
        if events.is_empty() {
            return;
        }

        let mut subscribers = lock(&self.subscribers);
        for event in events {
            let notification = QueueNotification {
                clinic_id: self.clinic_id.clone(),
                timestamp: Utc::now(),
                event,
            };

            subscribers.retain(|subscriber| match subscriber.sender.try_send(notification.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "Subscriber {} for clinic {} is full, dropping {:?} event",
                        subscriber.id,
                        self.clinic_id,
                        notification.event.kind()
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Pruning closed subscriber {} for clinic {}", subscriber.id, self.clinic_id);
                    false
                }
            });

            if self.global_sender.receiver_count() > 0 {
                match serde_json::to_string(&notification) {
                    Ok(message) => {
                        if let Err(e) = self.global_sender.send(message) {
                            debug!("Failed to send to global channel: {}", e);
                        }
                    }
                    Err(e) => warn!("Failed to serialize queue notification: {}", e),
                }
            }

            debug!(
                "Published {:?} for entry {} in clinic {}",
                notification.event.kind(),
                notification.event.entry_id(),
                self.clinic_id
            );
        }
    }

    /// Drops every subscriber; their receivers end once drained.
    pub fn close_all(&self) {
        let closed = {
            let mut subscribers = lock(&self.subscribers);
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        debug!("Closed {} subscribers for clinic {}", closed, self.clinic_id);
    }
}

/// Handle returned by [`QueueNotifier::subscribe`]. Dropping it unsubscribes.
pub struct QueueSubscription {
    id: u64,
    receiver: mpsc::Receiver<QueueNotification>,
    registry: Weak<SubscriberList>,
}

impl QueueSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<QueueNotification> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<QueueNotification> {
        self.receiver.try_recv().ok()
    }

    /// Everything currently buffered, without waiting.
    pub fn drain(&mut self) -> Vec<QueueNotification> {
        let mut notifications = Vec::new();
        while let Ok(notification) = self.receiver.try_recv() {
            notifications.push(notification);
        }
        notifications
    }

    pub fn unsubscribe(self) {}
}

impl Drop for QueueSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).retain(|subscriber| subscriber.id != self.id);
        }
    }
}
