//! Template Mailer — template-driven email composition and delivery.

pub mod config;
pub mod error;
pub mod mailer;
pub mod message;
pub mod template;
pub mod trace;
pub mod transport;

pub use config::MailerConfig;
pub use error::{MailerError, TransportError};
pub use mailer::{Mailer, SendOutcome};
pub use message::{Body, StructuredMessage, compose};
pub use template::{SubstitutionMap, TemplateInput};
