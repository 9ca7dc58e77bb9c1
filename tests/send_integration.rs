//! Integration tests for the full send path.
//!
//! SMTP tests spin up a minimal SMTP responder on a random port and drive
//! the real lettre-backed relay against it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;

use template_mailer::error::TransportError;
use template_mailer::trace::{TraceLevel, TraceRecorder, TraceSink};
use template_mailer::transport::Transport;
use template_mailer::{Body, Mailer, MailerConfig, MailerError, StructuredMessage, SubstitutionMap};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Captures delivered messages without touching the network.
#[derive(Default)]
struct CapturingTransport {
    delivered: Mutex<Vec<StructuredMessage>>,
}

#[async_trait]
impl Transport for CapturingTransport {
    fn name(&self) -> &str {
        "capture"
    }

    async fn deliver(
        &self,
        message: StructuredMessage,
        _trace: Arc<dyn TraceSink>,
    ) -> Result<(), TransportError> {
        self.delivered.lock().unwrap().push(message);
        Ok(())
    }
}

fn capturing_mailer() -> (Mailer, Arc<CapturingTransport>) {
    let transport = Arc::new(CapturingTransport::default());
    let mailer = Mailer::default().with_transport(transport.clone());
    (mailer, transport)
}

/// What the fake SMTP server saw.
#[derive(Debug, Default)]
struct SmtpSession {
    commands: Vec<String>,
    data: String,
}

/// Start a one-shot SMTP responder. `reject_rcpt` makes it refuse recipients.
async fn start_smtp_server(reject_rcpt: bool) -> (u16, Arc<Mutex<SmtpSession>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let session = Arc::new(Mutex::new(SmtpSession::default()));
    let seen = Arc::clone(&session);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"220 fake.test ESMTP\r\n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.lock().unwrap().commands.push(line.clone());
            let verb = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
            let reply: &[u8] = match verb.as_str() {
                "EHLO" | "HELO" => b"250 fake.test\r\n",
                "MAIL" => b"250 2.1.0 OK\r\n",
                "RCPT" if reject_rcpt => b"550 5.1.1 No such user\r\n",
                "RCPT" => b"250 2.1.5 OK\r\n",
                "DATA" => {
                    write.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await.unwrap();
                    while let Ok(Some(data_line)) = lines.next_line().await {
                        if data_line == "." {
                            break;
                        }
                        let mut s = seen.lock().unwrap();
                        s.data.push_str(&data_line);
                        s.data.push('\n');
                    }
                    b"250 2.0.0 Queued as ABC123\r\n"
                }
                "RSET" | "NOOP" => b"250 OK\r\n",
                "QUIT" => {
                    let _ = write.write_all(b"221 Bye\r\n").await;
                    break;
                }
                _ => b"502 Command not implemented\r\n",
            };
            if write.write_all(reply).await.is_err() {
                break;
            }
        }
    });

    (port, session)
}

// ── Composition through send ─────────────────────────────────────────

#[tokio::test]
async fn round_trip_basic_template() {
    let (mailer, transport) = capturing_mailer();
    let outcome = mailer
        .send("To: a@x.com\nFrom: b@x.com\nSubject: S\n\nhello", None)
        .await;
    assert!(outcome.is_ok());

    let delivered = transport.delivered.lock().unwrap();
    let msg = &delivered[0];
    assert_eq!(msg.to, "a@x.com");
    assert_eq!(msg.from, "b@x.com");
    assert_eq!(msg.subject, "S");
    assert_eq!(msg.body, Body::Text("hello".into()));
    assert!(msg.headers.is_none());
    assert!(msg.cc.is_none() && msg.bcc.is_none());
}

#[tokio::test]
async fn crlf_template_delivers_identical_message() {
    let (mailer, transport) = capturing_mailer();
    let lf = "To: a@x.com\nFrom: b@x.com\nSubject: S\nX-Tag: 1\nCc: x@y.com\n\n<p>hi</p>\n";
    mailer.send(lf, None).await.result.unwrap();
    mailer.send(lf.replace('\n', "\r\n"), None).await.result.unwrap();

    let delivered = transport.delivered.lock().unwrap();
    assert_eq!(delivered[0], delivered[1]);
    assert!(delivered[0].body.is_html());
    assert_eq!(delivered[0].cc.as_deref(), Some("x@y.com"));
}

#[tokio::test]
async fn template_file_with_values_and_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("invoice.txt");
    std::fs::write(
        &path,
        "To: {{customer.email}}\r\nFrom: billing@x.com\r\nSubject: Invoice {{number}}\r\n\r\nAmount due: {{amount}}\r\n",
    )
    .unwrap();

    let values = SubstitutionMap::try_from(json!({
        "customer": {"email": "ada@x.com"},
        "number": 42,
        "amount": "$10.00",
        "attachments": [{"filename": "invoice.pdf", "path": "/tmp/invoice.pdf"}],
    }))
    .unwrap();

    let (mailer, transport) = capturing_mailer();
    // Single-line text is taken as a path.
    let outcome = mailer.send(path.to_string_lossy().into_owned(), Some(&values)).await;
    assert!(outcome.is_ok(), "{:?}", outcome.result);
    assert_eq!(
        outcome.template.as_deref(),
        Some("To: ada@x.com\nFrom: billing@x.com\nSubject: Invoice 42\n\nAmount due: $10.00\n")
    );

    let delivered = transport.delivered.lock().unwrap();
    assert_eq!(delivered[0].subject, "Invoice 42");
    assert_eq!(
        delivered[0].attachments,
        Some(json!([{"filename": "invoice.pdf", "path": "/tmp/invoice.pdf"}]))
    );
}

#[tokio::test]
async fn missing_template_file_is_io_error() {
    let (mailer, transport) = capturing_mailer();
    let outcome = mailer.send("To: a@x.com Subject: no newline", None).await;
    match outcome.result {
        Err(MailerError::Io { path, .. }) => {
            assert_eq!(path.to_string_lossy(), "To: a@x.com Subject: no newline")
        }
        other => panic!("expected Io error, got {other:?}"),
    }
    assert!(outcome.template.is_none());
    assert!(transport.delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn whitespace_body_is_rejected_before_delivery() {
    let (mailer, transport) = capturing_mailer();
    let outcome = mailer
        .send("To: a@x.com\nFrom: b@x.com\nSubject: S\n\n \n\t", None)
        .await;
    assert!(matches!(outcome.result, Err(MailerError::MissingBody)));
    assert!(transport.delivered.lock().unwrap().is_empty());
}

// ── SMTP relay ───────────────────────────────────────────────────────

#[tokio::test]
async fn smtp_relay_delivers_and_traces() {
    timeout(TEST_TIMEOUT, async {
        let (port, session) = start_smtp_server(false).await;
        let mut mailer = Mailer::new("127.0.0.1", port);
        let agent = Arc::new(TraceRecorder::new());
        mailer.attach_log_agent(agent.clone());

        let outcome = mailer
            .send(
                "To: a@x.com\nFrom: b@x.com\nSubject: Relay test\nX-Campaign: spring\n\nhello relay",
                None,
            )
            .await;
        assert!(outcome.is_ok(), "{:?}", outcome.result);

        let accepted = outcome
            .trace
            .iter()
            .find(|e| e.message == "Message accepted")
            .expect("accepted event");
        assert_eq!(accepted.metadata.extra["code"], "250");
        assert_eq!(agent.take().len(), outcome.trace.len());

        let session = session.lock().unwrap();
        assert!(session.commands.iter().any(|c| c.starts_with("MAIL FROM:<b@x.com>")));
        assert!(session.commands.iter().any(|c| c.starts_with("RCPT TO:<a@x.com>")));
        assert!(session.data.contains("Subject: Relay test"));
        assert!(session.data.contains("X-Campaign: spring"));
        assert!(session.data.contains("hello relay"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn smtp_rejection_returns_error_and_trace() {
    timeout(TEST_TIMEOUT, async {
        let (port, _session) = start_smtp_server(true).await;
        let mailer = Mailer::with_config(MailerConfig::smtp("127.0.0.1", port));

        let (error, template, trace) = mailer
            .send("To: ghost@x.com\nFrom: b@x.com\nSubject: S\n\nhello", None)
            .await
            .into_parts();

        assert!(matches!(error, Some(MailerError::Transport(TransportError::Delivery { .. }))));
        assert!(template.is_some());
        let failure = trace.last().expect("trace entries");
        assert_eq!(failure.metadata.level, TraceLevel::Error);
        assert_eq!(failure.metadata.extra["code"], "550");
        assert_eq!(failure.metadata.extra["permanent"], true);
    })
    .await
    .expect("test timed out");
}
