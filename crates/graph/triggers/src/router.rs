use framegraph_types::TriggerId;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::types::{SubscriberId, TriggerMessage};

/// Default capacity of a subscriber channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A subscriber and the triggers it listens to.
struct Subscription {
    id: SubscriberId,
    /// Filter by trigger (None = all triggers)
    triggers: Option<Vec<TriggerId>>,
    sender: mpsc::Sender<TriggerMessage>,
}

impl Subscription {
    fn matches(&self, message: &TriggerMessage) -> bool {
        match &self.triggers {
            Some(triggers) => triggers.contains(&message.trigger),
            None => true,
        }
    }
}

/// Fans trigger messages out to subscribers over bounded channels.
///
/// Delivery never blocks: a full channel drops the message with a warning,
/// and closed subscribers are pruned on the next routing pass.
pub struct NotificationRouter {
    subscriptions: RwLock<Vec<Subscription>>,
    capacity: usize,
}

impl NotificationRouter {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to messages of the given triggers (None = all).
    pub async fn subscribe(
        &self,
        triggers: Option<Vec<TriggerId>>,
    ) -> (SubscriberId, mpsc::Receiver<TriggerMessage>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriberId::new();

        self.subscriptions.write().await.push(Subscription {
            id: id.clone(),
            triggers,
            sender,
        });
        debug!(subscriber = ?id.0, "New subscriber registered");

        (id, receiver)
    }

    /// Deliver `message` to every matching subscriber. Returns the number of
    /// subscribers that received it.
    pub async fn route(&self, message: &TriggerMessage) -> usize {
        let subs = self.subscriptions.read().await;
        let mut delivered = 0;
        let mut closed = Vec::new();

        for sub in subs.iter().filter(|s| s.matches(message)) {
            match sub.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = ?sub.id.0,
                        trigger = %message.trigger,
                        "Subscriber channel full, dropping notification"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(sub.id.clone()),
            }
        }
        drop(subs);

        if !closed.is_empty() {
            let mut subs = self.subscriptions.write().await;
            subs.retain(|s| !closed.contains(&s.id));
            debug!(removed = closed.len(), "Cleaned up closed subscribers");
        }

        delivered
    }

    pub async fn unsubscribe(&self, id: &SubscriberId) {
        self.subscriptions.write().await.retain(|s| s.id != *id);
        debug!(subscriber = ?id.0, "Subscriber removed");
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
