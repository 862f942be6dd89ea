//! Response classification for the Etherscan envelope
//!
//! Every account endpoint answers `{"status", "message", "result"}`; the proxy
//! endpoints answer JSON-RPC style `{"jsonrpc", "id", "result"}`. Both shapes
//! are folded into [`ApiReply`] or a [`Failure`] carrying its retry kind.

use crate::client::retry::FailureKind;
use crate::FetchError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

/// Messages the provider uses when a listing is simply empty
const EMPTY_MESSAGES: &[&str] = &["no transactions found", "no records found", "no token transfers found"];

/// Fragments that identify a provider-side rate limit
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "busy", "too many"];

/// A successfully interpreted reply
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    /// The `result` payload
    Data(Value),
    /// The provider reported that nothing matched
    Empty,
}

/// A failed attempt, classified for the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    RateLimited(String),
    Timeout(String),
    Transient(String),
    Hard(String),
    Malformed(String),
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited(_) => FailureKind::RateLimited,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Transient(_) => FailureKind::Transient,
            Self::Hard(_) | Self::Malformed(_) => FailureKind::Hard,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimited(m)
            | Self::Timeout(m)
            | Self::Transient(m)
            | Self::Hard(m)
            | Self::Malformed(m) => m,
        }
    }

    /// Converts the last failure into the error reported to callers
    pub fn into_error(self, attempts: u32) -> FetchError {
        match self {
            Self::RateLimited(_) => FetchError::RateLimited { attempts },
            Self::Timeout(_) => FetchError::Timeout { attempts },
            Self::Transient(message) => FetchError::Unexpected { attempts, message },
            Self::Hard(message) => FetchError::Api { message },
            Self::Malformed(message) => FetchError::InvalidResponse(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
}

/// Classifies the HTTP status before looking at the body
pub fn classify_status(status: StatusCode) -> Result<(), Failure> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Err(Failure::RateLimited(format!("HTTP {}", status.as_u16())))
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Err(Failure::Transient(format!("HTTP {}", status.as_u16())))
    } else {
        Err(Failure::Hard(format!("HTTP {}", status.as_u16())))
    }
}

/// Interprets a response body
pub fn interpret(body: &str) -> Result<ApiReply, Failure> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| Failure::Malformed(format!("{}: {}", e, preview(body))))?;

    if let Some(error) = envelope.error {
        return Err(classify_message(&error.message));
    }

    match envelope.status.as_deref() {
        Some("1") => Ok(ApiReply::Data(envelope.result)),
        Some("0") => {
            let message = envelope.message.to_lowercase();
            if EMPTY_MESSAGES.iter().any(|m| message.starts_with(m)) {
                return Ok(ApiReply::Empty);
            }
            let detail = match &envelope.result {
                Value::String(s) => format!("{}: {}", envelope.message, s),
                _ => envelope.message.clone(),
            };
            Err(classify_message(&detail))
        }
        Some(other) => Err(Failure::Malformed(format!("unknown status '{}'", other))),
        // Proxy endpoints carry no status field
        None => match envelope.result {
            Value::Null => Err(Failure::Malformed(format!("missing result: {}", preview(body)))),
            Value::String(s) if is_rate_limit(&s) => Err(Failure::RateLimited(s)),
            result => Ok(ApiReply::Data(result)),
        },
    }
}

fn classify_message(message: &str) -> Failure {
    if is_rate_limit(message) {
        Failure::RateLimited(message.to_string())
    } else {
        Failure::Hard(message.to_string())
    }
}

fn is_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
