use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// A dismissible, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// Fan-out channel for notifications.
///
/// Sending never waits; with no subscribers the notification is dropped.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            debug!("Notification dropped, no subscribers");
        }
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Notification {
            severity: Severity::Error,
            title: title.into(),
            message: message.into(),
        });
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Notification {
            severity: Severity::Success,
            title: title.into(),
            message: message.into(),
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
