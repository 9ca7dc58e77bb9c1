//! Delivery trace capture and the logging bridge.
//!
//! Transports report low-level events to a [`TraceSink`]. For each send the
//! mailer installs a [`SendTrace`] that records every event into the trace
//! log returned to the caller and forwards it to an optional log agent.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl TraceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to every trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub timestamp: DateTime<Utc>,
    pub level: TraceLevel,
    /// Annotations supplied with the event.
    ///
    /// Never holds `timestamp` or `level`; see [`TraceMetadata::new`].
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Field names owned by [`TraceMetadata`] itself.
const RESERVED_FIELDS: [&str; 2] = ["timestamp", "level"];

impl TraceMetadata {
    /// Stamp an event now. Annotations that collide with `timestamp` or
    /// `level` are kept under `annotation.<key>` so the entry still
    /// serializes to a single flat object.
    pub fn new(level: TraceLevel, annotations: &Map<String, Value>) -> Self {
        let extra = annotations
            .iter()
            .map(|(key, value)| {
                let key = if RESERVED_FIELDS.contains(&key.as_str()) {
                    format!("annotation.{key}")
                } else {
                    key.clone()
                };
                (key, value.clone())
            })
            .collect();
        Self {
            timestamp: Utc::now(),
            level,
            extra,
        }
    }
}

/// One recorded transport event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub message: String,
    pub metadata: TraceMetadata,
}

/// Ordered trace of one send.
pub type TraceLog = Vec<TraceEntry>;

/// Receiver for structured trace events.
///
/// Implementors provide [`TraceSink::record`]; the leveled helpers forward to it.
pub trait TraceSink: Send + Sync {
    fn record(&self, level: TraceLevel, message: &str, annotations: &Map<String, Value>);

    fn trace(&self, message: &str, annotations: &Map<String, Value>) {
        self.record(TraceLevel::Trace, message, annotations);
    }

    fn debug(&self, message: &str, annotations: &Map<String, Value>) {
        self.record(TraceLevel::Debug, message, annotations);
    }

    fn info(&self, message: &str, annotations: &Map<String, Value>) {
        self.record(TraceLevel::Info, message, annotations);
    }

    fn warn(&self, message: &str, annotations: &Map<String, Value>) {
        self.record(TraceLevel::Warn, message, annotations);
    }

    fn error(&self, message: &str, annotations: &Map<String, Value>) {
        self.record(TraceLevel::Error, message, annotations);
    }

    fn fatal(&self, message: &str, annotations: &Map<String, Value>) {
        self.record(TraceLevel::Fatal, message, annotations);
    }
}

/// Build an annotation map from `(key, value)` pairs.
pub fn annotations<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Collects events into a [`TraceLog`].
#[derive(Debug, Default)]
pub struct TraceRecorder {
    entries: Mutex<TraceLog>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything recorded so far.
    pub fn take(&self) -> TraceLog {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TraceLog> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TraceSink for TraceRecorder {
    fn record(&self, level: TraceLevel, message: &str, annotations: &Map<String, Value>) {
        self.lock().push(TraceEntry {
            message: message.to_string(),
            metadata: TraceMetadata::new(level, annotations),
        });
    }
}

/// Forwards events to `tracing`, tagged `component = "mailer"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, level: TraceLevel, message: &str, annotations: &Map<String, Value>) {
        let annotations = Value::Object(annotations.clone());
        match level {
            TraceLevel::Trace => {
                tracing::trace!(component = "mailer", %annotations, "{message}")
            }
            TraceLevel::Debug => {
                tracing::debug!(component = "mailer", %annotations, "{message}")
            }
            TraceLevel::Info => tracing::info!(component = "mailer", %annotations, "{message}"),
            TraceLevel::Warn => tracing::warn!(component = "mailer", %annotations, "{message}"),
            TraceLevel::Error | TraceLevel::Fatal => {
                tracing::error!(component = "mailer", level = %level, %annotations, "{message}")
            }
        }
    }
}

/// The sink installed for a single send.
pub struct SendTrace {
    recorder: TraceRecorder,
    agent: Option<Arc<dyn TraceSink>>,
}

impl SendTrace {
    pub fn new(agent: Option<Arc<dyn TraceSink>>) -> Self {
        Self {
            recorder: TraceRecorder::new(),
            agent,
        }
    }

    /// The recorded trace log.
    pub fn take(&self) -> TraceLog {
        self.recorder.take()
    }
}

impl TraceSink for SendTrace {
    fn record(&self, level: TraceLevel, message: &str, annotations: &Map<String, Value>) {
        self.recorder.record(level, message, annotations);
        if let Some(agent) = &self.agent {
            agent.record(level, message, annotations);
        }
    }
}
