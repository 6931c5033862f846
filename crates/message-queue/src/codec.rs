//! Body encodings.
//!
//! Encoding is a pure transform of [`Envelope::body`]; headers and origin pass
//! through untouched.

use crate::error::{ConfigurationError, SerializationError};
use crate::message::{Body, Envelope};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Named encoding strategy for message bodies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Encoding {
    /// Serialize the body to JSON bytes. Decoding is the exact inverse.
    #[default]
    Structured,
    /// Identity. The body must already be acceptable to the backend.
    Raw,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Raw => "raw",
        }
    }

    /// Replace the body with its encoded form
    pub fn encode(&self, mut envelope: Envelope) -> Result<Envelope, SerializationError> {
        match self {
            Self::Structured => {
                let encoded = serde_json::to_vec(&envelope.body)?;
                envelope.body = Body::Bytes(Bytes::from(encoded));
            }
            Self::Raw => {}
        }
        Ok(envelope)
    }

    /// Replace an encoded body with the value it was encoded from
    pub fn decode(&self, mut envelope: Envelope) -> Result<Envelope, SerializationError> {
        match self {
            Self::Structured => {
                let decoded = match &envelope.body {
                    Body::Bytes(bytes) => serde_json::from_slice::<Body>(bytes)?,
                    other => {
                        return Err(SerializationError::NotEncoded {
                            found: other.kind(),
                        })
                    }
                };
                envelope.body = decoded;
            }
            Self::Raw => {}
        }
        Ok(envelope)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structured" | "json" => Ok(Self::Structured),
            "raw" => Ok(Self::Raw),
            other => Err(ConfigurationError::UnsupportedEncoding {
                name: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Encoding> for String {
    fn from(value: Encoding) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
