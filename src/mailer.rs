//! The `send` entry point: resolve → compose → deliver.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::MailerConfig;
use crate::error::MailerError;
use crate::message::Composer;
use crate::template::{self, Substitute, SubstitutionMap, TemplateInput};
use crate::trace::{SendTrace, TraceLog, TraceSink};
use crate::transport::{self, Transport};

/// Everything a send reports back, whatever the outcome.
#[derive(Debug)]
pub struct SendOutcome {
    pub result: Result<(), MailerError>,
    /// Template text after substitution and line-ending normalization.
    /// `None` only when the template could not be resolved.
    pub template: Option<String>,
    /// Transport events; empty when nothing reached the transport.
    pub trace: TraceLog,
}

impl SendOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Split into the callback-style triple.
    pub fn into_parts(self) -> (Option<MailerError>, Option<String>, TraceLog) {
        (self.result.err(), self.template, self.trace)
    }
}

/// Sends template-driven email.
///
/// Config is fixed at construction; concurrent sends share nothing mutable.
pub struct Mailer {
    config: MailerConfig,
    composer: Composer,
    transport: Option<Arc<dyn Transport>>,
    log_agent: Option<Arc<dyn TraceSink>>,
}

impl Mailer {
    /// Mailer for an SMTP relay at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(MailerConfig::smtp(host, port))
    }

    pub fn with_config(config: MailerConfig) -> Self {
        Self {
            config,
            composer: Composer::default(),
            transport: None,
            log_agent: None,
        }
    }

    /// Deliver through a custom transport instead of the one the config selects.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom placeholder engine.
    pub fn with_substituter(mut self, engine: Arc<dyn Substitute>) -> Self {
        self.composer = Composer::new(engine);
        self
    }

    /// Forward every transport trace event to `agent`.
    pub fn attach_log_agent(&mut self, agent: Arc<dyn TraceSink>) {
        self.log_agent = Some(agent);
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Set a single option; see [`MailerConfig::set_option`].
    pub fn set_option(&mut self, key: &str, value: Value) -> Result<(), crate::error::ConfigError> {
        self.config.set_option(key, value)
    }

    /// Set several options; see [`MailerConfig::set_options`].
    pub fn set_options(&mut self, options: Map<String, Value>) -> Result<(), crate::error::ConfigError> {
        self.config.set_options(options)
    }

    /// Resolve, compose and deliver one message.
    ///
    /// Template and validation errors are detected before any delivery
    /// attempt. Nothing is retried.
    pub async fn send(
        &self,
        input: impl Into<TemplateInput>,
        values: Option<&SubstitutionMap>,
    ) -> SendOutcome {
        let send_id = Uuid::new_v4();

        let raw = match template::resolve(input.into()).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(%send_id, error = %e, "Template could not be resolved");
                return SendOutcome {
                    result: Err(e),
                    template: None,
                    trace: TraceLog::new(),
                };
            }
        };

        let rendered = self.composer.render(&raw, values);
        let message = match self.composer.assemble(&rendered, values) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%send_id, error = %e, "Template rejected");
                return SendOutcome {
                    result: Err(e),
                    template: Some(rendered),
                    trace: TraceLog::new(),
                };
            }
        };

        let transport = self
            .transport
            .clone()
            .unwrap_or_else(|| transport::from_config(&self.config));
        let trace = Arc::new(SendTrace::new(self.log_agent.clone()));
        let to = message.to.clone();

        tracing::debug!(%send_id, transport = transport.name(), %to, "Delivering message");
        let result = transport
            .deliver(message, trace.clone())
            .await
            .map_err(MailerError::from);

        match &result {
            Ok(()) => tracing::info!(%send_id, transport = transport.name(), %to, "Email sent"),
            Err(e) => {
                tracing::error!(%send_id, transport = transport.name(), %to, error = %e, "Email delivery failed")
            }
        }

        SendOutcome {
            result,
            template: Some(rendered),
            trace: trace.take(),
        }
    }

    /// Callback form of [`Mailer::send`]. The callback runs exactly once
    /// with `(error, template, trace)`.
    pub async fn send_with_callback<F>(
        &self,
        input: impl Into<TemplateInput>,
        values: Option<&SubstitutionMap>,
        callback: F,
    ) where
        F: FnOnce(Option<MailerError>, Option<String>, TraceLog),
    {
        let (error, template, trace) = self.send(input, values).await.into_parts();
        callback(error, template, trace);
    }
}

impl Default for Mailer {
    fn default() -> Self {
        Self::with_config(MailerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::message::StructuredMessage;
    use crate::trace::{TraceLevel, TraceRecorder, annotations};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const TEMPLATE: &str = "To: {{to}}\nFrom: b@x.com\nSubject: Hi {{name}}\n\nHello {{name}}";

    /// Records delivered messages; optionally fails after tracing.
    #[derive(Default)]
    struct StubTransport {
        fail: bool,
        delivered: Mutex<Vec<StructuredMessage>>,
    }

    #[async_trait]
    impl Transport for StubTransport {
        fn name(&self) -> &str {
            "stub"
        }

        async fn deliver(
            &self,
            message: StructuredMessage,
            trace: Arc<dyn TraceSink>,
        ) -> Result<(), TransportError> {
            trace.debug("EHLO stub", &annotations([("to", json!(message.to))]));
            if self.fail {
                trace.error("550 mailbox unavailable", &Map::new());
                return Err(TransportError::Delivery {
                    transport: "stub".into(),
                    reason: "550 mailbox unavailable".into(),
                });
            }
            self.delivered.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn values() -> SubstitutionMap {
        SubstitutionMap::new().with("to", "a@x.com").with("name", "Ada")
    }

    #[tokio::test]
    async fn successful_send_returns_template_and_trace() {
        let stub = Arc::new(StubTransport::default());
        let mailer = Mailer::default().with_transport(stub.clone());

        let outcome = mailer.send(TEMPLATE, Some(&values())).await;
        assert!(outcome.is_ok());
        assert_eq!(
            outcome.template.as_deref(),
            Some("To: a@x.com\nFrom: b@x.com\nSubject: Hi Ada\n\nHello Ada")
        );
        assert_eq!(outcome.trace.len(), 1);
        assert_eq!(outcome.trace[0].metadata.extra["to"], "a@x.com");

        let delivered = stub.delivered.lock().unwrap();
        assert_eq!(delivered[0].subject, "Hi Ada");
    }

    #[tokio::test]
    async fn transport_failure_still_returns_trace() {
        let stub = Arc::new(StubTransport {
            fail: true,
            ..Default::default()
        });
        let mailer = Mailer::default().with_transport(stub);

        let outcome = mailer.send(TEMPLATE, Some(&values())).await;
        assert!(matches!(outcome.result, Err(MailerError::Transport(_))));
        assert!(outcome.template.is_some());
        assert_eq!(outcome.trace.len(), 2);
        assert_eq!(outcome.trace[1].metadata.level, TraceLevel::Error);
    }

    #[tokio::test]
    async fn template_errors_never_reach_the_transport() {
        let stub = Arc::new(StubTransport::default());
        let mailer = Mailer::default().with_transport(stub.clone());

        let outcome = mailer.send("To: a@x.com\nSubject: S\n\nbody", None).await;
        assert!(matches!(
            outcome.result,
            Err(MailerError::MissingHeader { field: "From" })
        ));
        assert_eq!(outcome.template.as_deref(), Some("To: a@x.com\nSubject: S\n\nbody"));
        assert!(outcome.trace.is_empty());
        assert!(stub.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_template_reports_io_without_text() {
        let mailer = Mailer::default().with_transport(Arc::new(StubTransport::default()));
        let outcome = mailer.send("/definitely/not/here.txt", None).await;
        assert!(matches!(outcome.result, Err(MailerError::Io { .. })));
        assert!(outcome.template.is_none());
    }

    #[tokio::test]
    async fn log_agent_sees_the_same_events() {
        let agent = Arc::new(TraceRecorder::new());
        let mut mailer = Mailer::default().with_transport(Arc::new(StubTransport::default()));
        mailer.attach_log_agent(agent.clone());

        let outcome = mailer.send(TEMPLATE, Some(&values())).await;
        let forwarded = agent.take();
        assert_eq!(forwarded.len(), outcome.trace.len());
        assert_eq!(forwarded[0].message, outcome.trace[0].message);
    }

    #[tokio::test]
    async fn callback_runs_once_with_parts() {
        let mailer = Mailer::default().with_transport(Arc::new(StubTransport::default()));
        let mut calls = 0;
        mailer
            .send_with_callback(TEMPLATE, Some(&values()), |error, template, trace| {
                calls += 1;
                assert!(error.is_none());
                assert!(template.unwrap().contains("Hello Ada"));
                assert_eq!(trace.len(), 1);
            })
            .await;
        assert_eq!(calls, 1);
    }

    #[test]
    fn options_update_config() {
        let mut mailer = Mailer::new("mail.example.com", 2525);
        mailer.set_option("sendmail", json!(true)).unwrap();
        assert!(mailer.config().sendmail);
        assert_eq!(mailer.config().host, "mail.example.com");
    }
}
