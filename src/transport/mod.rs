//! Delivery transports.
//!
//! The mailer only sees the [`Transport`] trait. Built-in implementations
//! deliver through `lettre`: an SMTP relay or the local sendmail binary.

pub mod build;
pub mod sendmail;
pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{MailerConfig, TransportDirective};
use crate::error::TransportError;
use crate::message::StructuredMessage;
use crate::trace::TraceSink;

pub use build::{AttachmentSpec, build_message};
pub use sendmail::Sendmail;
pub use smtp::SmtpRelay;

/// Delivers a structured message, reporting protocol events to `trace`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn deliver(
        &self,
        message: StructuredMessage,
        trace: Arc<dyn TraceSink>,
    ) -> Result<(), TransportError>;
}

/// Pick the built-in transport a config selects.
pub fn from_config(config: &MailerConfig) -> Arc<dyn Transport> {
    let ignored: Vec<&str> = config.unrecognized_options().collect();
    if !ignored.is_empty() {
        tracing::debug!(options = ?ignored, "Options not used by the built-in transports");
    }
    match config.directive() {
        TransportDirective::Smtp { .. } => Arc::new(SmtpRelay::new(config.clone())),
        TransportDirective::Sendmail { command } => Arc::new(Sendmail::new(command)),
    }
}
