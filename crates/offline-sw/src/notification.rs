//! Push display and notification-click routing.
//!
//! Both are pass-throughs to host collaborators: the worker builds the
//! options for a push and routes the open action of a click to a window.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use offline_common::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::NotificationConfig;

/// Identifier the host assigns to a shown notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

/// Incoming push message.
#[derive(Debug, Clone, Default)]
pub struct PushMessage {
    /// Payload text, if the push carried any.
    pub data: Option<String>,
}

impl PushMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: Some(text.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Opaque payload attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Arrival time, ms since epoch.
    pub date_of_arrival: u64,
    pub primary_key: u32,
}

/// Options handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl NotificationOptions {
    /// Build the options for a push; the payload text is used verbatim as the body.
    pub fn from_push(config: &NotificationConfig, push: &PushMessage) -> Self {
        let body = push
            .data
            .clone()
            .unwrap_or_else(|| config.default_body.clone());

        Self {
            body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or_default(),
                primary_key: 1,
            },
            actions: vec![
                NotificationAction {
                    action: config.open_action.clone(),
                    title: config.open_title.clone(),
                    icon: config.icon.clone(),
                },
                NotificationAction {
                    action: config.dismiss_action.clone(),
                    title: config.dismiss_title.clone(),
                    icon: config.icon.clone(),
                },
            ],
        }
    }
}

/// A click on a shown notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    pub notification_id: NotificationId,
    /// Action button id; `None` when the body was clicked.
    pub action: Option<String>,
}

/// Host capability that displays notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<NotificationId>;

    async fn close(&self, id: &NotificationId) -> Result<()>;
}

/// Host capability that focuses or opens browser windows.
#[async_trait]
pub trait ClientWindows: Send + Sync {
    async fn open_window(&self, url: &Url) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_text_becomes_body() {
        let config = NotificationConfig::default();
        let options = NotificationOptions::from_push(&config, &PushMessage::text("CPU at 95%"));

        assert_eq!(options.body, "CPU at 95%");
        assert_eq!(options.icon, "/icon-192.png");
        assert_eq!(options.badge, "/icon-192.png");
        assert_eq!(options.vibrate, vec![100, 50, 100]);
        assert_eq!(options.data.primary_key, 1);
    }

    #[test]
    fn test_empty_push_uses_default_body() {
        let config = NotificationConfig::default();
        let options = NotificationOptions::from_push(&config, &PushMessage::empty());
        assert_eq!(options.body, "New notification");
    }

    #[test]
    fn test_actions_are_open_then_dismiss() {
        let config = NotificationConfig::default();
        let options = NotificationOptions::from_push(&config, &PushMessage::empty());
        let ids: Vec<_> = options.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(ids, vec!["explore", "close"]);
    }

    #[test]
    fn test_data_serializes_camel_case() {
        let data = NotificationData {
            date_of_arrival: 7,
            primary_key: 1,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["dateOfArrival"], 7);
        assert_eq!(json["primaryKey"], 1);
    }
}
