//! Notification collaborators.
//!
//! Handlers send email and messaging notifications through [`Notifier`].
//! The pipeline itself never calls into this module.

use crate::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery channel of a notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email delivery; targets are addresses.
    Email,
    /// WhatsApp delivery; targets are phone numbers.
    WhatsApp,
}

impl Channel {
    /// Checks that `target` is well-formed for this channel.
    pub fn validate_target(&self, target: &str) -> Result<(), NotifyError> {
        let target = target.trim();
        let valid = match self {
            Self::Email => target
                .split_once('@')
                .is_some_and(|(user, host)| !user.is_empty() && host.contains('.')),
            Self::WhatsApp => {
                let digits = target.strip_prefix('+').unwrap_or(target);
                digits.len() >= 8 && digits.chars().all(|c| c.is_ascii_digit())
            }
        };
        if valid {
            Ok(())
        } else {
            Err(NotifyError::InvalidTarget {
                channel: *self,
                target: target.to_string(),
            })
        }
    }
}

/// Notification failures.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The target is not a valid address for the channel.
    #[error("invalid {channel:?} target '{target}'")]
    InvalidTarget {
        /// Channel the target was validated for.
        channel: Channel,
        /// The rejected target.
        target: String,
    },

    /// The provider refused or failed the delivery.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification sender.
pub trait Notifier: Send + Sync {
    /// Channel this notifier delivers through.
    fn channel(&self) -> Channel;

    /// Sends `message` to `target`.
    fn send<'a>(&'a self, target: &'a str, message: &'a str)
        -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// A delivery recorded by [`TracingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipient.
    pub target: String,
    /// Message body.
    pub message: String,
}

/// Notifier that writes deliveries to the log instead of a provider.
#[derive(Debug)]
pub struct TracingNotifier {
    channel: Channel,
    sent: Mutex<Vec<Delivery>>,
}

impl TracingNotifier {
    /// Creates a log-backed notifier for `channel`.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Deliveries made so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Delivery> {
        self.sent.lock().clone()
    }
}

impl Notifier for TracingNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn send<'a>(
        &'a self,
        target: &'a str,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            self.channel.validate_target(target)?;
            tracing::info!(
                channel = ?self.channel,
                target = %target,
                bytes = message.len(),
                "notification sent"
            );
            self.sent.lock().push(Delivery {
                target: target.to_string(),
                message: message.to_string(),
            });
            Ok(())
        })
    }
}
