//! Transient user notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Publishes notifications to any number of subscribers.
///
/// Publishing with no subscriber is not an error; slow subscribers lose the
/// oldest messages.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, level: NotificationLevel, message: impl Into<String>) {
        let _ = self.sender.send(Notification {
            level,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Success, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let notifier = Notifier::new();
        notifier.success("nobody listens");
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        notifier.info("first");
        notifier.error("second");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.level, NotificationLevel::Info);
        assert_eq!(first.message, "first");
        assert_eq!(rx.recv().await.unwrap().level, NotificationLevel::Error);
    }
}
