//! Template text → [`StructuredMessage`].
//!
//! Composition is synchronous and pure: substitution, line-ending
//! normalization, header/body split, header extraction, required-field
//! validation, field promotion, attachment merge and body sniffing. Every
//! failure is terminal and no partial message is produced.

use std::sync::Arc;

use crate::error::MailerError;
use crate::template::{PlaceholderEngine, Substitute, SubstitutionMap};

use super::headers::ParsedHeaders;
use super::types::{Body, StructuredMessage};

/// Required headers, in the order they are validated.
pub const REQUIRED_HEADERS: [&str; 3] = ["To", "From", "Subject"];

/// Headers promoted to message fields when they carry a value.
const PROMOTED_HEADERS: [&str; 5] = ["To", "From", "Subject", "Cc", "Bcc"];

/// Builds structured messages with a pluggable substitution engine.
#[derive(Clone)]
pub struct Composer {
    engine: Arc<dyn Substitute>,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(Arc::new(PlaceholderEngine))
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer").finish_non_exhaustive()
    }
}

impl Composer {
    pub fn new(engine: Arc<dyn Substitute>) -> Self {
        Self { engine }
    }

    /// Apply substitution (when values are given) and normalize line endings.
    pub fn render(&self, text: &str, values: Option<&SubstitutionMap>) -> String {
        match values {
            Some(values) => normalize_line_endings(&self.engine.substitute(text, values)),
            None => normalize_line_endings(text),
        }
    }

    /// Parse already-rendered text into a message.
    pub fn assemble(
        &self,
        rendered: &str,
        values: Option<&SubstitutionMap>,
    ) -> Result<StructuredMessage, MailerError> {
        let (header_block, body) = rendered.split_once("\n\n").unwrap_or((rendered, ""));
        if body.trim().is_empty() {
            return Err(MailerError::MissingBody);
        }

        let headers = ParsedHeaders::parse(header_block);

        let [to, from, subject] = REQUIRED_HEADERS.map(|name| headers.get_non_empty(name));
        let to = to.ok_or(MailerError::MissingHeader { field: "To" })?;
        let from = from.ok_or(MailerError::MissingHeader { field: "From" })?;
        let subject = subject.ok_or(MailerError::MissingHeader { field: "Subject" })?;

        // An empty Cc or Bcc is not promoted and stays a custom header.
        let promoted: Vec<&str> = PROMOTED_HEADERS
            .into_iter()
            .filter(|name| headers.get_non_empty(name).is_some())
            .collect();

        Ok(StructuredMessage {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            cc: headers.get_non_empty("Cc").map(str::to_string),
            bcc: headers.get_non_empty("Bcc").map(str::to_string),
            headers: headers.without(&promoted),
            attachments: values.and_then(|v| v.attachments()).cloned(),
            body: Body::sniff(body.to_string()),
        })
    }

    /// Render and assemble in one step.
    pub fn compose(
        &self,
        text: &str,
        values: Option<&SubstitutionMap>,
    ) -> Result<StructuredMessage, MailerError> {
        self.assemble(&self.render(text, values), values)
    }
}

/// Compose with the default `{{name}}` engine.
pub fn compose(
    text: &str,
    values: Option<&SubstitutionMap>,
) -> Result<StructuredMessage, MailerError> {
    Composer::default().compose(text, values)
}

/// Convert CRLF and lone CR to LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
