//! SMTP relay delivery via lettre.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{SmtpTransport, Transport as _};
use secrecy::ExposeSecret;
use serde_json::json;

use super::{Transport, build_message};
use crate::config::{MailerConfig, TlsMode};
use crate::error::TransportError;
use crate::message::StructuredMessage;
use crate::trace::{TraceSink, annotations};

/// Delivers through an SMTP server. Blocking lettre calls run on the
/// blocking thread pool.
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    config: MailerConfig,
}

impl SmtpRelay {
    pub fn new(config: MailerConfig) -> Self {
        Self { config }
    }

    fn connect(&self) -> Result<SmtpTransport, TransportError> {
        let config = &self.config;
        let mut builder = SmtpTransport::builder_dangerous(config.host.as_str()).port(config.port);

        if config.tls != TlsMode::None {
            install_crypto_provider();
            let params = TlsParameters::new(config.host.clone()).map_err(|e| delivery_error(&e))?;
            builder = builder.tls(match config.tls {
                TlsMode::StartTls => Tls::Required(params),
                _ => Tls::Wrapper(params),
            });
        }

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        if let Some(name) = &config.hello_name {
            builder = builder.hello_name(ClientId::Domain(name.clone()));
        }

        Ok(builder.timeout(config.timeout).build())
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

        let envelope = email.envelope();
        trace.debug(
            "Message built",
            &annotations([
                ("bytes", json!(email.formatted().len())),
                ("recipients", json!(envelope.to().len())),
            ]),
        );

        trace.info(
            &format!("Connecting to {}:{}", self.config.host, self.config.port),
            &annotations([
                ("host", json!(self.config.host)),
                ("port", json!(self.config.port)),
                ("tls", json!(format!("{:?}", self.config.tls))),
            ]),
        );
        let transport = self.connect()?;

        match transport.send(&email) {
            Ok(response) => {
                let lines: Vec<String> = response.message().map(|l| l.to_string()).collect();
                trace.info(
                    "Message accepted",
                    &annotations([
                        ("code", json!(response.code().to_string())),
                        ("response", json!(lines)),
                    ]),
                );
                Ok(())
            }
            Err(e) => {
                trace.error(
                    "SMTP delivery failed",
                    &annotations([
                        ("reason", json!(e.to_string())),
                        ("code", json!(e.status().map(|c| c.to_string()))),
                        ("permanent", json!(e.is_permanent())),
                        ("transient", json!(e.is_transient())),
                    ]),
                );
                Err(delivery_error(&e))
            }
        }
    }
}

/// rustls needs a process-wide crypto provider before any TLS config is built.
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Err means another provider was installed first, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn delivery_error(e: &lettre::transport::smtp::Error) -> TransportError {
    TransportError::Delivery {
        transport: "smtp".into(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl Transport for SmtpRelay {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn deliver(
        &self,
        message: StructuredMessage,
        trace: Arc<dyn TraceSink>,
    ) -> Result<(), TransportError> {
        let relay = self.clone();
        tokio::task::spawn_blocking(move || relay.send_blocking(&message, trace.as_ref()))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?
    }
}
