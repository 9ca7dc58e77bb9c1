//! Mailer configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value};

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 25;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain text, the usual setup for a local relay on port 25.
    #[default]
    None,
    /// Upgrade with STARTTLS (submission, port 587).
    StartTls,
    /// Implicit TLS from the first byte (port 465).
    Wrapper,
}

impl std::str::FromStr for TlsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "plain" | "false" => Ok(Self::None),
            "starttls" | "required" => Ok(Self::StartTls),
            "wrapper" | "tls" | "ssl" | "secure" | "true" => Ok(Self::Wrapper),
            other => Err(ConfigError::InvalidValue {
                key: "tls".into(),
                message: format!("unknown TLS mode '{other}'"),
            }),
        }
    }
}

/// Which delivery mechanism a config selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportDirective {
    Smtp { host: String, port: u16 },
    Sendmail { command: Option<String> },
}

/// Mailer configuration. Set once, read by every send.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub host: String,
    pub port: u16,
    /// Deliver through the local MTA; host and port are ignored.
    pub sendmail: bool,
    pub sendmail_command: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub tls: TlsMode,
    pub timeout: Option<Duration>,
    /// Name announced in EHLO/HELO.
    pub hello_name: Option<String>,
    /// Options no built-in transport understands, kept for custom transports.
    pub extra: BTreeMap<String, Value>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            sendmail: false,
            sendmail_command: None,
            username: None,
            password: None,
            tls: TlsMode::None,
            timeout: None,
            hello_name: None,
            extra: BTreeMap::new(),
        }
    }
}

impl MailerConfig {
    /// Config targeting an SMTP relay.
    pub fn smtp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Build config from `MAILER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("MAILER_HOST").unwrap_or(defaults.host);

        let port: u16 = std::env::var("MAILER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let sendmail = std::env::var("MAILER_SENDMAIL")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(false);

        let tls = std::env::var("MAILER_TLS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let timeout = std::env::var("MAILER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs);

        Self {
            host,
            port,
            sendmail,
            sendmail_command: non_empty_env("MAILER_SENDMAIL_COMMAND"),
            username: non_empty_env("MAILER_USERNAME"),
            password: non_empty_env("MAILER_PASSWORD").map(SecretString::from),
            tls,
            timeout,
            hello_name: non_empty_env("MAILER_HELLO_NAME"),
            extra: BTreeMap::new(),
        }
    }

    /// Set a single option by name.
    ///
    /// Unknown keys are stored in [`MailerConfig::extra`].
    pub fn set_option(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        match key {
            "host" => self.host = expect_string(key, value)?,
            "port" => {
                let port = match &value {
                    Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                };
                self.port = port.ok_or_else(|| invalid(key, "expected a port number"))?;
            }
            "sendmail" => {
                self.sendmail = match &value {
                    Value::Bool(b) => *b,
                    Value::String(s) => {
                        parse_bool(s).ok_or_else(|| invalid(key, "expected a boolean"))?
                    }
                    _ => return Err(invalid(key, "expected a boolean")),
                }
            }
            "sendmail_command" | "path" => {
                self.sendmail_command = Some(expect_string(key, value)?)
            }
            "username" | "user" => self.username = Some(expect_string(key, value)?),
            "password" | "pass" => {
                self.password = Some(SecretString::from(expect_string(key, value)?))
            }
            "tls" | "secure" => {
                self.tls = match value {
                    Value::Bool(true) => TlsMode::Wrapper,
                    Value::Bool(false) => TlsMode::None,
                    Value::String(s) => s.parse()?,
                    _ => return Err(invalid(key, "expected a TLS mode")),
                }
            }
            "timeout_secs" => {
                let secs = value
                    .as_u64()
                    .ok_or_else(|| invalid(key, "expected whole seconds"))?;
                self.timeout = Some(Duration::from_secs(secs));
            }
            "hello_name" | "name" => self.hello_name = Some(expect_string(key, value)?),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// Keys stored by [`MailerConfig::set_option`] that no known option matched.
    pub fn unrecognized_options(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }

    /// Set several options at once. Stops at the first invalid value.
    pub fn set_options(&mut self, options: Map<String, Value>) -> Result<(), ConfigError> {
        for (key, value) in options {
            self.set_option(&key, value)?;
        }
        Ok(())
    }

    /// Parse a JSON object of options on top of the defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let Value::Object(options) = value else {
            return Err(ConfigError::ParseError(
                "configuration must be a JSON object".into(),
            ));
        };
        let mut config = Self::default();
        config.set_options(options)?;
        Ok(config)
    }

    /// The delivery mechanism this config selects.
    pub fn directive(&self) -> TransportDirective {
        if self.sendmail {
            TransportDirective::Sendmail {
                command: self.sendmail_command.clone(),
            }
        } else {
            TransportDirective::Smtp {
                host: self.host.clone(),
                port: self.port,
            }
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn expect_string(key: &str, value: Value) -> Result<String, ConfigError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(invalid(key, "expected a string")),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
