//! Message types: queue names, message bodies and the envelope that travels
//! between producer, backend and consumer.

use crate::error::ValidationError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions.
///
/// Queue names are case-sensitive and never normalized. They double as
/// directory names for the filesystem backend, so path separators and
/// leading dots are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();

        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, underscores and dots allowed"
                    .to_string(),
            });
        }

        if name.starts_with('.') {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "must not start with a dot".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

// ============================================================================
// Message Bodies
// ============================================================================

/// Header map carried alongside the body. Keys keep insertion order.
pub type Header = Map<String, Value>;

/// A message body.
///
/// Bodies are plain data unless they are an [`Invocation`], which is the
/// executable variant: the delivery engine runs it through the task registry
/// when no callback or requeue strategy is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Body {
    Empty,
    Text(String),
    Json(Value),
    Bytes(#[serde(with = "bytes_serde")] Bytes),
    Invocation(Invocation),
}

impl Body {
    /// Name of the variant, used in log fields and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
            Self::Bytes(_) => "bytes",
            Self::Invocation(_) => "invocation",
        }
    }

    /// The executable capability of this body, if it has one
    pub fn as_invocation(&self) -> Option<&Invocation> {
        match self {
            Self::Invocation(invocation) => Some(invocation),
            _ => None,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Empty
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Invocation> for Body {
    fn from(value: Invocation) -> Self {
        Self::Invocation(value)
    }
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

/// A deferred call to a named task with JSON arguments.
///
/// The task name is looked up in the engine's handler registry at delivery
/// time, so an invocation can be serialized, stored and executed later by a
/// different process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub task: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Invocation {
    /// Create an invocation of `task` with no arguments
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// The body + header + origin unit exchanged between producer, backend and
/// consumer.
///
/// Encoding replaces `body` with its encoded form; the envelope stays the same
/// logical unit across the encode/backend/decode boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub body: Body,
    #[serde(default)]
    pub header: Header,
    /// Queue the message was received from. Set by backends on receive.
    #[serde(default)]
    pub queue: Option<QueueName>,
}

impl Envelope {
    /// Create new envelope with body and empty header
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            header: Header::new(),
            queue: None,
        }
    }

    /// Build an envelope from loosely typed parts.
    ///
    /// `header` may be absent or a JSON object; anything else is rejected.
    pub fn from_parts(
        body: impl Into<Body>,
        header: Option<Value>,
        queue: Option<QueueName>,
    ) -> Result<Self, ValidationError> {
        let header = match header {
            None | Some(Value::Null) => Header::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ValidationError::InvalidFormat {
                    field: "header".to_string(),
                    message: format!("expected a map, got {}", json_kind(&other)),
                })
            }
        };

        Ok(Self {
            body: body.into(),
            header,
            queue,
        })
    }

    /// Add header entry
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    /// Set origin queue
    pub fn with_queue(mut self, queue: QueueName) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Merge header entries, overwriting existing keys
    pub fn merge_header(&mut self, header: Header) {
        self.header.extend(header);
    }

    /// Copy of body and header without the origin, for re-sending
    pub fn resend_copy(&self) -> Self {
        Self {
            body: self.body.clone(),
            header: self.header.clone(),
            queue: None,
        }
    }

    /// Origin queue as a string slice, or `"-"` when unknown
    pub fn origin(&self) -> &str {
        self.queue.as_ref().map(QueueName::as_str).unwrap_or("-")
    }
}

impl From<Body> for Envelope {
    fn from(body: Body) -> Self {
        Self::new(body)
    }
}

impl From<&str> for Envelope {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Envelope {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Value> for Envelope {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl From<Invocation> for Envelope {
    fn from(value: Invocation) -> Self {
        Self::new(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Receive Options
// ============================================================================

/// Options for receiving messages from a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to receive. `None` drains everything available.
    pub limit: Option<usize>,
}

impl ReceiveOptions {
    /// Create new receive options with no limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of messages to receive
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether `count` messages already satisfy the limit
    pub fn is_satisfied(&self, count: usize) -> bool {
        self.limit.is_some_and(|limit| count >= limit)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
