//! Outbound notifications.
//!
//! Core operations never talk to a mail or SMS transport. They push a [`Notification`]
//! into the [`Outbox`] after their transaction has committed, and a separate
//! [`run_dispatcher`] task hands each one to a [`Notifier`]. A full or closed queue
//! downgrades to [`Delivery::Dropped`] so the caller can offer a manual resend; the
//! committed state change stands either way.

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Events the core emits for out-of-band delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// One-time login credential for a newly enrolled member
    MemberCredentials {
        recipient: String,
        member_name: String,
        username: String,
        credential: String,
    },
    /// A root group's subscription was activated or renewed
    SubscriptionActivated {
        recipient: String,
        group_name: String,
        plan_name: String,
        end_date: Option<DateTime<Utc>>,
    },
}

/// Rendered message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Renders the event into a transport message.
    #[must_use]
    pub fn render(&self) -> Message {
        match self {
            Self::MemberCredentials {
                recipient,
                member_name,
                username,
                credential,
            } => Message {
                recipient: recipient.clone(),
                subject: "Your chitti account".to_string(),
                body: format!(
                    "Hello {member_name},\n\nYou have been enrolled. Sign in with username \
                     {username} and password {credential}, then change your password."
                ),
            },
            Self::SubscriptionActivated {
                recipient,
                group_name,
                plan_name,
                end_date,
            } => {
                let until = end_date.map_or_else(
                    || "with no expiry".to_string(),
                    |end| format!("until {}", end.format("%d %b %Y")),
                );
                Message {
                    recipient: recipient.clone(),
                    subject: format!("Subscription active for {group_name}"),
                    body: format!("The {plan_name} plan for {group_name} is active {until}."),
                }
            }
        }
    }
}

/// Whether a notification made it onto the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Not queued; the caller should surface a warning and offer a resend
    Dropped,
}

/// Sending half of the notification queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: Option<mpsc::UnboundedSender<Notification>>,
}

impl Outbox {
    /// Creates an outbox and the receiver a dispatcher should drain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// An outbox with no dispatcher; every event is dropped.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queues `notification` for delivery.
    pub fn emit(&self, notification: Notification) -> Delivery {
        let Some(sender) = &self.sender else {
            tracing::warn!("Notification outbox disabled, dropping event");
            return Delivery::Dropped;
        };
        match sender.send(notification) {
            Ok(()) => Delivery::Queued,
            Err(_) => {
                tracing::warn!("Notification dispatcher is gone, dropping event");
                Delivery::Dropped
            }
        }
    }
}

/// Transport collaborator: email, SMS, whatever the deployment wires in.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<()>;
}

/// Notifier that only records the delivery attempt in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: &Message) -> Result<()> {
        tracing::info!(recipient = %message.recipient, subject = %message.subject, "Notification delivered");
        Ok(())
    }
}

/// Drains `receiver` until every sender is dropped. Failed deliveries are logged and
/// skipped. Returns the number delivered.
pub async fn run_dispatcher<N>(
    mut receiver: mpsc::UnboundedReceiver<Notification>,
    notifier: N,
) -> usize
where
    N: Notifier,
{
    let mut delivered = 0;
    while let Some(notification) = receiver.recv().await {
        let message = notification.render();
        match notifier.deliver(&message).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(
                recipient = %message.recipient,
                "Failed to deliver notification: {}", e
            ),
        }
    }
    delivered
}
