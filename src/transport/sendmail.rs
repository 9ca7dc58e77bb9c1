//! Local MTA delivery through the sendmail binary.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{SendmailTransport, Transport as _};
use serde_json::json;

use super::{Transport, build_message};
use crate::error::TransportError;
use crate::message::StructuredMessage;
use crate::trace::{TraceSink, annotations};

/// Pipes the message into `sendmail` (or a configured command).
#[derive(Debug, Clone, Default)]
pub struct Sendmail {
    command: Option<String>,
}

impl Sendmail {
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("sendmail")
    }

    fn send_blocking(
        &self,
        message: &StructuredMessage,
        trace: &dyn TraceSink,
    ) -> Result<(), TransportError> {
        let email = build_message(message).map_err(|e| {
            trace.error("Failed to build message", &annotations([("reason", json!(e.to_string()))]));
            e
        })?;

        let transport = match &self.command {
            Some(command) => SendmailTransport::new_with_command(command),
            None => SendmailTransport::new(),
        };

        trace.info(
            &format!("Piping message to {}", self.command()),
            &annotations([
                ("command", json!(self.command())),
                ("recipients", json!(email.envelope().to().len())),
            ]),
        );

        transport.send(&email).map_err(|e| {
            trace.error("sendmail delivery failed", &annotations([("reason", json!(e.to_string()))]));
            TransportError::Delivery {
                transport: "sendmail".into(),
                reason: e.to_string(),
            }
        })?;

        trace.info("Message handed to local MTA", &serde_json::Map::new());
        Ok(())
    }
}

#[async_trait]
impl Transport for Sendmail {
    fn name(&self) -> &str {
        "sendmail"
    }

    async fn deliver(
        &self,
        message: StructuredMessage,
        trace: Arc<dyn TraceSink>,
    ) -> Result<(), TransportError> {
        let sendmail = self.clone();
        tokio::task::spawn_blocking(move || sendmail.send_blocking(&message, trace.as_ref()))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?
    }
}
