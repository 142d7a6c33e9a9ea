//! User-visible notification stream
//!
//! Validation failures are published as warnings, transport failures as
//! danger notifications. Every notification is also logged.

use crate::error::AppError;
use crate::models::{Notification, NotificationLevel};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, warn};

/// Broadcasts notifications to whichever UI is listening
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    last: Arc<RwLock<Option<Notification>>>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            last: Arc::new(RwLock::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Most recent notification, if any
    pub fn last(&self) -> Option<Notification> {
        self.last.read().clone()
    }

    pub fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Warning => warn!(message = %notification.message, "Notification"),
            NotificationLevel::Danger => error!(message = %notification.message, "Notification"),
        }

        *self.last.write() = Some(notification.clone());
        let _ = self.tx.send(notification);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(Notification::warning(message));
    }

    pub fn danger(&self, message: impl Into<String>) {
        self.notify(Notification::danger(message));
    }

    /// Publish the notification matching `err`; `endpoint` names the search
    /// engine when it could not be reached.
    pub fn error(&self, err: &AppError, endpoint: &str) {
        self.notify(err.notification(endpoint));
    }
}
