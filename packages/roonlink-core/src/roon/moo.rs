//! MOO/1 message framing.
//!
//! Every WebSocket frame exchanged with the Core carries one MOO message:
//!
//! ```text
//! MOO/1 REQUEST com.roonlabs.transport:2/control
//! Request-Id: 7
//! Content-Length: 48
//! Content-Type: application/json
//!
//! {"zone_or_output_id":"1601...","control":"play"}
//! ```
//!
//! Replies reuse the request id with verb `COMPLETE` (final) or `CONTINUE`
//! (more to come, used by subscriptions and by registration).

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::protocol_constants::{MOO_JSON, MOO_PROTOCOL};

/// MOO verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MooVerb {
    Request,
    Complete,
    Continue,
}

impl MooVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Complete => "COMPLETE",
            Self::Continue => "CONTINUE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "REQUEST" => Some(Self::Request),
            "COMPLETE" => Some(Self::Complete),
            "CONTINUE" => Some(Self::Continue),
            _ => None,
        }
    }
}

impl std::fmt::Display for MooVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors decoding a MOO frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MooError {
    #[error("missing blank line after headers")]
    MissingHeaderEnd,

    #[error("headers are not valid UTF-8")]
    NotUtf8,

    #[error("bad first line: {0:?}")]
    BadFirstLine(String),

    #[error("unknown verb {0:?}")]
    UnknownVerb(String),

    #[error("missing Request-Id header")]
    MissingRequestId,

    #[error("bad header: {0:?}")]
    BadHeader(String),

    #[error("body truncated: Content-Length {expected}, got {actual} bytes")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid JSON body for {name}: {reason}")]
    Json { name: String, reason: String },
}

/// One decoded MOO message.
#[derive(Debug, Clone, PartialEq)]
pub struct MooMessage {
    pub verb: MooVerb,
    /// `service/method` for requests, a status word (`Success`, `Changed`, ...) for replies.
    pub name: String,
    pub request_id: u64,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl MooMessage {
    /// Builds a request, with a JSON body when `body` is given.
    pub fn request(request_id: u64, name: impl Into<String>, body: Option<&Value>) -> Self {
        Self::new(MooVerb::Request, request_id, name, body)
    }

    /// Builds a `COMPLETE`/`CONTINUE` reply to an inbound request.
    pub fn reply(
        verb: MooVerb,
        request_id: u64,
        name: impl Into<String>,
        body: Option<&Value>,
    ) -> Self {
        Self::new(verb, request_id, name, body)
    }

    fn new(verb: MooVerb, request_id: u64, name: impl Into<String>, body: Option<&Value>) -> Self {
        let (content_type, body) = match body {
            Some(value) => (
                Some(MOO_JSON.to_string()),
                Bytes::from(value.to_string().into_bytes()),
            ),
            None => (None, Bytes::new()),
        };
        Self {
            verb,
            name: name.into(),
            request_id,
            content_type,
            body,
        }
    }

    /// Serializes the message into a frame payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!(
            "{} {} {}\nRequest-Id: {}\n",
            MOO_PROTOCOL, self.verb, self.name, self.request_id
        );
        if !self.body.is_empty() {
            out.push_str(&format!("Content-Length: {}\n", self.body.len()));
            out.push_str(&format!(
                "Content-Type: {}\n",
                self.content_type.as_deref().unwrap_or(MOO_JSON)
            ));
        }
        out.push('\n');

        let mut frame = out.into_bytes();
        frame.extend_from_slice(&self.body);
        frame
    }

    /// Decodes a frame payload.
    pub fn parse(data: &[u8]) -> Result<Self, MooError> {
        let header_end = data
            .windows(2)
            .position(|w| w == b"\n\n")
            .ok_or(MooError::MissingHeaderEnd)?;
        let header = std::str::from_utf8(&data[..header_end]).map_err(|_| MooError::NotUtf8)?;
        let rest = &data[header_end + 2..];

        let mut lines = header.split('\n').map(|l| l.trim_end_matches('\r'));
        let first = lines.next().unwrap_or_default();
        let mut parts = first.splitn(3, ' ');
        if parts.next() != Some(MOO_PROTOCOL) {
            return Err(MooError::BadFirstLine(first.to_string()));
        }
        let verb_str = parts
            .next()
            .ok_or_else(|| MooError::BadFirstLine(first.to_string()))?;
        let verb = MooVerb::parse(verb_str)
            .ok_or_else(|| MooError::UnknownVerb(verb_str.to_string()))?;
        let name = parts.next().unwrap_or_default().to_string();

        let mut request_id = None;
        let mut content_type = None;
        let mut content_length = None;
        for line in lines.filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| MooError::BadHeader(line.to_string()))?;
            let value = value.trim();
            if key.eq_ignore_ascii_case("Request-Id") {
                request_id = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| MooError::BadHeader(line.to_string()))?,
                );
            } else if key.eq_ignore_ascii_case("Content-Type") {
                content_type = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| MooError::BadHeader(line.to_string()))?,
                );
            }
        }

        let body = match content_length {
            Some(expected) if rest.len() < expected => {
                return Err(MooError::Truncated {
                    expected,
                    actual: rest.len(),
                })
            }
            Some(expected) => &rest[..expected],
            None => rest,
        };

        Ok(Self {
            verb,
            name,
            request_id: request_id.ok_or(MooError::MissingRequestId)?,
            content_type,
            body: Bytes::copy_from_slice(body),
        })
    }

    /// Deserializes the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, MooError> {
        let body: &[u8] = if self.body.is_empty() {
            b"{}"
        } else {
            &self.body
        };
        serde_json::from_slice(body).map_err(|e| MooError::Json {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.name == "Success"
    }

    /// Splits a request name into `(service, method)`.
    pub fn service_method(&self) -> Option<(&str, &str)> {
        self.name.rsplit_once('/')
    }
}
