use crate::config::schema::NotificationConfig;
use crate::flows::detection::Outcome;
use crate::registry::ModelRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

const HISTORY_LIMIT: usize = 32;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Status,
    Error,
}

/// A transient user-facing message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub summary: String,
    pub body: String,
}

/// Transient notification manager
pub struct NotificationManager {
    config: NotificationConfig,
    history: Mutex<VecDeque<Notification>>,
}

impl NotificationManager {
    #[must_use]
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
        }
    }

    pub fn training_complete(&self, record: &ModelRecord) {
        self.status(
            "Training Complete",
            format!(
                "Model \"{}\" has been successfully trained and added to the library.",
                record.name
            ),
        );
    }

    pub fn detection_ready(&self, outcome: Outcome) {
        self.status(outcome.title(), outcome.description().to_string());
    }

    pub fn missing_dataset(&self) {
        self.error(
            "No Dataset Selected",
            "Please upload a dataset before training.".to_string(),
        );
    }

    pub fn training_failed(&self, reason: &str) {
        self.error("Training Failed", reason.to_string());
    }

    /// Most recent notifications, oldest first
    #[must_use]
    pub fn recent(&self) -> Vec<Notification> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn status(&self, summary: &str, body: String) {
        if !self.config.enable_status {
            return;
        }
        tracing::info!("{summary}: {body}");
        self.push(Notification {
            kind: NotificationKind::Status,
            summary: summary.to_string(),
            body,
        });
    }

    fn error(&self, summary: &str, body: String) {
        if !self.config.enable_errors {
            return;
        }
        tracing::warn!("{summary}: {body}");
        self.push(Notification {
            kind: NotificationKind::Error,
            summary: summary.to_string(),
            body,
        });
    }

    fn push(&self, notification: Notification) {
        if self.config.desktop {
            show_desktop(&notification);
        }

        if let Ok(mut history) = self.history.lock() {
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(notification);
        }
    }
}

fn show_desktop(notification: &Notification) {
    let result = notify_rust::Notification::new()
        .appname("exodetect")
        .summary(&notification.summary)
        .body(&notification.body)
        .show();

    if let Err(e) = result {
        tracing::debug!("Desktop notification failed: {e}");
    }
}
