use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::errors::NotifyError;

#[cfg(test)]
use mockall::automock;

/// Outbound notification channel (e-mail in production). May fail
/// independently of any workflow transition.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Emits each notification as a structured log event instead of delivering it
pub struct LogNotifier {
    from_address: String,
}

impl LogNotifier {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(from = %self.from_address, to = %to, subject = %subject, "Notification dispatched");
        // bodies carry invitation tokens, keep them out of info-level logs
        debug!(to = %to, body = %body, "Notification body");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Captures every successful send; addresses registered with
/// [`RecordingNotifier::fail_for`] fail instead.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: Mutex<HashSet<String>>,
    attempts: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.to_string());
    }

    pub fn recover(&self, address: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(address);
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.to == address)
            .collect()
    }

    /// Successful and failed deliveries alike
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(to)
        {
            return Err(NotifyError::DeliveryFailed {
                recipient: to.to_string(),
                reason: "simulated outage".to_string(),
            });
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotification {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}
