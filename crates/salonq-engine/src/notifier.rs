//! Notifier collaborator.
//!
//! Push transport lives outside this core: the engine only hands a message
//! to a [`Notifier`] and moves on. Delivery is fire-and-forget; failures
//! are the implementation's to log, and any retry policy lives behind the
//! trait, never here.

use async_trait::async_trait;
use tracing::info;

use salonq_core::ActorRole;

/// Fire-and-forget notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one message to a recipient. Must not fail the caller:
    /// implementations log and swallow their own transport errors.
    async fn notify(
        &self,
        recipient_id: &str,
        role: ActorRole,
        title: &str,
        body: &str,
        deep_link: Option<&str>,
    );
}

/// Default notifier that only writes structured logs.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient_id: &str,
        role: ActorRole,
        title: &str,
        body: &str,
        deep_link: Option<&str>,
    ) {
        info!(
            recipient = %recipient_id,
            role = ?role,
            title = %title,
            body = %body,
            deep_link = deep_link.unwrap_or("-"),
            "Notification"
        );
    }
}
