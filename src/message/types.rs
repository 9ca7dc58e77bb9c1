//! The structured message handed to a transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::headers::ParsedHeaders;

/// Message body, classified by a leading `<`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Body {
    Html(String),
    Text(String),
}

impl Body {
    /// Classify raw body text. Malformed HTML is passed through unchanged.
    pub fn sniff(content: String) -> Self {
        if content.trim_start().starts_with('<') {
            Self::Html(content)
        } else {
            Self::Text(content)
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Html(s) | Self::Text(s) => s,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, Self::Html(_))
    }
}

/// A fully resolved message, ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    /// Custom headers; `None` rather than empty when there are none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<ParsedHeaders>,
    /// Attachment descriptors, copied verbatim from the substitution map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Value>,
    pub body: Body,
}
