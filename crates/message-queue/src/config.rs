//! Interface configuration.
//!
//! An interface is a named bundle of routing, encoding and delivery policy that
//! serves one or more queues. Configurations are plain serde types so they can
//! be declared in code, or loaded from YAML/TOML/JSON through
//! [`crate::settings::MessageQueueSettings`].
//!
//! ```yaml
//! queues: /^orders-/
//! backend: memory
//! encoding: structured
//! send:
//!   on_shutdown: all
//!   buffer: orders-buffer
//! delivery:
//!   on_error:
//!     - log
//!     - requeue: orders-errors
//! ```

use crate::codec::Encoding;
use crate::error::ConfigurationError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::str::FromStr;

// ============================================================================
// InterfaceConfig
// ============================================================================

/// Configuration for one named interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Queue names served by this interface
    pub queues: QueueSelector,

    /// Id of the backend that stores messages for this interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Body encoding applied before send and after receive
    #[serde(default)]
    pub encoding: Encoding,

    #[serde(default)]
    pub send: SendPolicy,

    #[serde(default)]
    pub delivery: DeliveryPolicy,
}

impl InterfaceConfig {
    /// Create configuration serving `queues` through `backend` with default policy
    pub fn new(queues: QueueSelector, backend: impl Into<String>) -> Self {
        Self {
            queues,
            backend: Some(backend.into()),
            encoding: Encoding::default(),
            send: SendPolicy::default(),
            delivery: DeliveryPolicy::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Redirect buffered sends to `buffer`
    pub fn with_buffer(mut self, buffer: impl Into<String>) -> Self {
        self.send.buffer = Some(buffer.into());
        self
    }

    /// Request deferred consumption at process end
    pub fn with_on_shutdown(mut self, actions: ShutdownActions) -> Self {
        self.send.on_shutdown = Some(actions);
        self
    }

    /// Deliver through the named callback
    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.delivery.callback = Some(callback.into());
        self
    }

    /// Deliver by relocating messages to another queue
    pub fn with_requeue(mut self, queue: impl Into<String>, immediate: bool) -> Self {
        self.delivery.requeue = Some(RequeueTarget {
            queue: queue.into(),
            immediate,
        });
        self
    }

    pub fn with_on_error(mut self, actions: Vec<ErrorActionEntry>) -> Self {
        self.delivery.on_error = Some(actions);
        self
    }

    /// Deferred consumption actions requested for this interface, if any
    pub fn deferred_actions(&self) -> Option<ShutdownActions> {
        self.send.on_shutdown.filter(|actions| !actions.is_none())
    }
}

// ============================================================================
// QueueSelector
// ============================================================================

/// Which queue names an interface owns.
///
/// Deserializes from a string or a list of strings. A string enclosed in
/// slashes (`/^orders-/`) is a pattern, any other string is a literal name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSelector", into = "RawSelector")]
pub enum QueueSelector {
    Name(String),
    Names(Vec<String>),
    Pattern(QueuePattern),
}

impl QueueSelector {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names(names.into_iter().map(Into::into).collect())
    }

    /// Parse a `/pattern/flags` selector
    pub fn pattern(pattern: &str) -> Result<Self, ConfigurationError> {
        QueuePattern::parse(pattern).map(Self::Pattern)
    }

    /// Check whether this selector owns `queue`. Matching is case-sensitive
    /// unless a pattern opts out with the `i` flag.
    pub fn matches(&self, queue: &str) -> bool {
        match self {
            Self::Names(names) => names.iter().any(|name| name == queue),
            Self::Pattern(pattern) => pattern.is_match(queue),
            Self::Name(name) => name == queue,
        }
    }
}

impl std::fmt::Display for QueueSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Names(names) => f.write_str(&names.join(",")),
            Self::Pattern(pattern) => f.write_str(pattern.as_str()),
        }
    }
}

impl FromStr for QueueSelector {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('/') {
            Self::pattern(s)
        } else {
            Ok(Self::Name(s.to_string()))
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSelector {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<RawSelector> for QueueSelector {
    type Error = ConfigurationError;

    fn try_from(raw: RawSelector) -> Result<Self, Self::Error> {
        match raw {
            RawSelector::One(value) => value.parse(),
            RawSelector::Many(names) => Ok(Self::Names(names)),
        }
    }
}

impl From<QueueSelector> for RawSelector {
    fn from(selector: QueueSelector) -> Self {
        match selector {
            QueueSelector::Name(name) => RawSelector::One(name),
            QueueSelector::Names(names) => RawSelector::Many(names),
            QueueSelector::Pattern(pattern) => RawSelector::One(pattern.source),
        }
    }
}

/// Compiled `/body/flags` queue pattern.
///
/// Matching is an unanchored search; use `^`/`$` to anchor.
#[derive(Debug, Clone)]
pub struct QueuePattern {
    source: String,
    regex: Regex,
}

impl QueuePattern {
    pub fn parse(source: &str) -> Result<Self, ConfigurationError> {
        let invalid = |message: &str| ConfigurationError::InvalidPattern {
            pattern: source.to_string(),
            message: message.to_string(),
        };

        let inner = source
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        let end = inner
            .rfind('/')
            .ok_or_else(|| invalid("missing closing '/'"))?;
        let (body, flags) = (&inner[..end], &inner[end + 1..]);

        let mut builder = RegexBuilder::new(body);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                'u' => builder.unicode(true),
                other => return Err(invalid(&format!("unsupported flag '{}'", other))),
            };
        }

        let regex = builder.build().map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, queue: &str) -> bool {
        self.regex.is_match(queue)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for QueuePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

// ============================================================================
// Send policy
// ============================================================================

/// How sends to the interface behave
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendPolicy {
    /// Deferred consumption requested at process end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_shutdown: Option<ShutdownActions>,

    /// Queue that buffered sends are redirected to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,
}

/// Which processing steps a deferred consumption pass performs.
///
/// Parsed from `flush`, `consume`, `flush,consume`, `all` (both) or `none`.
/// `true`/`false` and `auto` are accepted as shorthands for `all`/`none`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawActions", into = "String")]
pub struct ShutdownActions {
    pub flush: bool,
    pub consume: bool,
}

impl ShutdownActions {
    pub const ALL: Self = Self {
        flush: true,
        consume: true,
    };

    pub const NONE: Self = Self {
        flush: false,
        consume: false,
    };

    pub const CONSUME: Self = Self {
        flush: false,
        consume: true,
    };

    pub fn is_none(&self) -> bool {
        !self.flush && !self.consume
    }
}

impl std::fmt::Display for ShutdownActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.flush, self.consume) {
            (true, true) => f.write_str("flush,consume"),
            (true, false) => f.write_str("flush"),
            (false, true) => f.write_str("consume"),
            (false, false) => f.write_str("none"),
        }
    }
}

impl FromStr for ShutdownActions {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut actions = Self::NONE;
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "flush" => actions.flush = true,
                "consume" => actions.consume = true,
                "all" | "auto" => return Ok(Self::ALL),
                "none" => return Ok(Self::NONE),
                other => {
                    return Err(ConfigurationError::Invalid {
                        message: format!("unknown processing action '{}'", other),
                    })
                }
            }
        }
        Ok(actions)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawActions {
    Flag(bool),
    List(String),
}

impl TryFrom<RawActions> for ShutdownActions {
    type Error = ConfigurationError;

    fn try_from(raw: RawActions) -> Result<Self, Self::Error> {
        match raw {
            RawActions::Flag(true) => Ok(Self::ALL),
            RawActions::Flag(false) => Ok(Self::NONE),
            RawActions::List(list) => list.parse(),
        }
    }
}

impl From<ShutdownActions> for String {
    fn from(value: ShutdownActions) -> Self {
        value.to_string()
    }
}

// ============================================================================
// Delivery policy
// ============================================================================

/// How received messages are delivered and what happens when delivery fails
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    /// Relocate messages to another queue instead of executing them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requeue: Option<RequeueTarget>,

    /// Name of a registered delivery callback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,

    /// Ordered error-action pipeline. Absent means `[drop]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<Vec<ErrorActionEntry>>,
}

impl DeliveryPolicy {
    /// The configured pipeline, or the implicit `[drop]`
    pub fn error_actions(&self) -> Cow<'_, [ErrorActionEntry]> {
        match &self.on_error {
            Some(actions) => Cow::Borrowed(actions.as_slice()),
            None => Cow::Owned(vec![ErrorActionEntry::bare("drop")]),
        }
    }
}

/// Destination for requeue-style delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequeueTarget {
    pub queue: String,

    /// Deliver synchronously with the target's configuration instead of sending
    #[serde(default)]
    pub immediate: bool,
}

/// One entry of an error-action pipeline.
///
/// Written either as a bare action name (`log`) or as a single-key map whose
/// key is the action and whose value is its argument (`requeue: errors`).
/// The action name is interpreted only when the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct ErrorActionEntry {
    pub action: String,
    pub argument: Option<String>,
}

impl ErrorActionEntry {
    pub fn bare(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            argument: None,
        }
    }

    pub fn with_argument(action: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            argument: Some(argument.into()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawAction {
    Bare(String),
    Keyed(BTreeMap<String, Option<String>>),
}

impl TryFrom<RawAction> for ErrorActionEntry {
    type Error = ConfigurationError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        match raw {
            RawAction::Bare(action) => Ok(Self::bare(action)),
            RawAction::Keyed(map) => {
                if map.len() != 1 {
                    return Err(ConfigurationError::Invalid {
                        message: format!(
                            "error action entries must have exactly one key, found {}",
                            map.len()
                        ),
                    });
                }
                let (action, argument) = map.into_iter().next().ok_or_else(|| {
                    ConfigurationError::Invalid {
                        message: "empty error action entry".to_string(),
                    }
                })?;
                Ok(Self { action, argument })
            }
        }
    }
}

impl From<ErrorActionEntry> for RawAction {
    fn from(entry: ErrorActionEntry) -> Self {
        match entry.argument {
            None => RawAction::Bare(entry.action),
            Some(argument) => RawAction::Keyed(BTreeMap::from([(entry.action, Some(argument))])),
        }
    }
}

/// Interfaces a fresh registry starts with: every queue goes to the in-memory
/// backend, is consumed at process end, and failed messages are logged and
/// requeued on their origin queue.
pub fn default_interfaces() -> Result<Vec<(String, InterfaceConfig)>, ConfigurationError> {
    let all_queues = QueueSelector::pattern("/.*/")?;

    Ok(vec![(
        "default".to_string(),
        InterfaceConfig::new(all_queues, "memory")
            .with_on_shutdown(ShutdownActions::ALL)
            .with_on_error(vec![
                ErrorActionEntry::bare("log"),
                ErrorActionEntry::bare("requeue"),
            ]),
    )])
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
