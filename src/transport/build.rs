//! Conversion from [`StructuredMessage`] to a `lettre` message.

use std::path::PathBuf;

use base64::Engine;
use lettre::Message;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, Mailboxes, MessageBuilder, MultiPart, SinglePart};
use serde::Deserialize;
use serde_json::Value;

use crate::error::TransportError;
use crate::message::{Body, StructuredMessage};

/// Headers the MIME builder writes on the body part. A template's
/// `Content-Type` is applied to the body part instead; the others are dropped.
const BODY_PART_HEADERS: [&str; 2] = ["Content-Transfer-Encoding", "MIME-Version"];

/// An attachment descriptor as supplied in the `attachments` entry.
///
/// Either `content` (inline, optionally base64 with `encoding: "base64"`)
/// or `path` (read from disk) must be set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSpec {
    pub filename: Option<String>,
    pub path: Option<PathBuf>,
    pub content: Option<String>,
    pub encoding: Option<String>,
    #[serde(alias = "content_type")]
    pub content_type: Option<String>,
}

impl AttachmentSpec {
    /// Parse the verbatim `attachments` value. `null` means none.
    pub fn parse_all(value: Option<&Value>) -> Result<Vec<Self>, TransportError> {
        match value {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(_)) => serde_json::from_value(value.cloned().unwrap_or_default())
                .map_err(|e| TransportError::Attachment(e.to_string())),
            Some(_) => Err(TransportError::Attachment(
                "attachments must be a list".into(),
            )),
        }
    }

    fn filename(&self, index: usize) -> String {
        self.filename
            .clone()
            .or_else(|| {
                self.path
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| format!("attachment-{}", index + 1))
    }

    /// Load the attachment bytes. Reads from disk for `path` attachments.
    fn load(&self, filename: &str) -> Result<Vec<u8>, TransportError> {
        if let Some(content) = &self.content {
            return match self.encoding.as_deref() {
                Some(enc) if enc.eq_ignore_ascii_case("base64") => {
                    base64::engine::general_purpose::STANDARD
                        .decode(content.trim())
                        .map_err(|e| {
                            TransportError::Attachment(format!("{filename}: invalid base64: {e}"))
                        })
                }
                _ => Ok(content.clone().into_bytes()),
            };
        }
        match &self.path {
            Some(path) => std::fs::read(path).map_err(|e| {
                TransportError::Attachment(format!("{}: {e}", path.display()))
            }),
            None => Err(TransportError::Attachment(format!(
                "{filename}: needs either content or path"
            ))),
        }
    }

    fn into_part(self, index: usize) -> Result<SinglePart, TransportError> {
        let filename = self.filename(index);
        let content_type = match &self.content_type {
            Some(ct) => ct.clone(),
            None => mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .to_string(),
        };
        let content_type = ContentType::parse(&content_type).map_err(|e| {
            TransportError::Attachment(format!("{filename}: invalid content type: {e}"))
        })?;
        let bytes = self.load(&filename)?;
        Ok(Attachment::new(filename).body(bytes, content_type))
    }
}

/// Build the wire message. Attachment files are read here, so call this
/// from a blocking context.
pub fn build_message(message: &StructuredMessage) -> Result<Message, TransportError> {
    let from: Mailbox = message
        .from
        .parse()
        .map_err(|e| TransportError::InvalidAddress {
            field: "from",
            reason: format!("{e}"),
        })?;

    let mut builder = Message::builder().from(from).subject(message.subject.clone());
    builder = add_mailboxes(builder, "to", &message.to, MessageBuilder::to)?;
    if let Some(cc) = &message.cc {
        builder = add_mailboxes(builder, "cc", cc, MessageBuilder::cc)?;
    }
    if let Some(bcc) = &message.bcc {
        builder = add_mailboxes(builder, "bcc", bcc, MessageBuilder::bcc)?;
    }

    let mut body_content_type = None;
    if let Some(headers) = &message.headers {
        for (name, value) in headers.iter() {
            // An empty line carries nothing and would not parse as a mailbox list.
            if value.is_empty() {
                continue;
            }
            if name.eq_ignore_ascii_case("Content-Type") {
                body_content_type = Some(ContentType::parse(value).map_err(|e| {
                    TransportError::InvalidHeader {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                })?);
                continue;
            }
            if BODY_PART_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                tracing::debug!(header = name, "Dropping header set by the MIME builder");
                continue;
            }
            let header_name = HeaderName::new_from_ascii(name.to_string()).map_err(|_| {
                TransportError::InvalidHeader {
                    name: name.to_string(),
                    reason: "header names must be ASCII".into(),
                }
            })?;
            builder = builder.raw_header(HeaderValue::new(header_name, value.to_string()));
        }
    }

    let body = match (&message.body, body_content_type) {
        (body, Some(content_type)) => SinglePart::builder()
            .header(content_type)
            .body(body.content().to_string()),
        (Body::Html(content), None) => SinglePart::html(content.clone()),
        (Body::Text(content), None) => SinglePart::plain(content.clone()),
    };

    let attachments = AttachmentSpec::parse_all(message.attachments.as_ref())?;
    let built = if attachments.is_empty() {
        builder.singlepart(body)
    } else {
        let mut mixed = MultiPart::mixed().singlepart(body);
        for (index, spec) in attachments.into_iter().enumerate() {
            mixed = mixed.singlepart(spec.into_part(index)?);
        }
        builder.multipart(mixed)
    };

    built.map_err(|e| TransportError::Build(e.to_string()))
}

fn add_mailboxes(
    mut builder: MessageBuilder,
    field: &'static str,
    list: &str,
    add: fn(MessageBuilder, Mailbox) -> MessageBuilder,
) -> Result<MessageBuilder, TransportError> {
    let mailboxes: Mailboxes = list.parse().map_err(|e| TransportError::InvalidAddress {
        field,
        reason: format!("{e}"),
    })?;
    for mailbox in mailboxes {
        builder = add(builder, mailbox);
    }
    Ok(builder)
}
