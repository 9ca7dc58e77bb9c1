//! Turns a raw template input into template text.
//!
//! Templates must contain at least one newline to be treated as inline
//! text. Anything without a newline is taken to be a file path, so a
//! single-line inline template is read from disk.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::MailerError;

/// Raw template as handed to `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateInput {
    /// Inline template text, or a path if it has no newline.
    Text(String),
    /// UTF-8 bytes, classified like `Text` after decoding.
    Buffer(Vec<u8>),
    /// Always read from disk.
    Path(PathBuf),
}

impl From<&str> for TemplateInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TemplateInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for TemplateInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<&[u8]> for TemplateInput {
    fn from(bytes: &[u8]) -> Self {
        Self::Buffer(bytes.to_vec())
    }
}

impl From<PathBuf> for TemplateInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for TemplateInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Whether a piece of text would be read as a file path.
pub fn is_path_like(text: &str) -> bool {
    !text.contains('\n')
}

/// Resolve an input into template text, reading at most one file.
pub async fn resolve(input: TemplateInput) -> Result<String, MailerError> {
    let text = match input {
        TemplateInput::Path(path) => return read_template(&path).await,
        TemplateInput::Buffer(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        TemplateInput::Text(text) => text,
    };

    if is_path_like(&text) {
        return read_template(Path::new(&text)).await;
    }
    Ok(text)
}

async fn read_template(path: &Path) -> Result<String, MailerError> {
    tracing::debug!(path = %path.display(), "Loading template file");
    fs::read_to_string(path)
        .await
        .map_err(|source| MailerError::Io {
            path: path.to_path_buf(),
            source,
        })
}
