use thiserror::Error;

/// Core error type for the proxy.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("adapter '{name}' failed to initialize: {reason}")]
    AdapterInit { name: String, reason: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no available provider")]
    NoProvider,

    #[error("upstream error from '{provider}': {message}")]
    Upstream {
        provider: String,
        class: ErrorClass,
        message: String,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, ProxyError>;

/// How a failed adapter call should be treated by the dispatch loop.
///
/// `Transient` and `Permanent` both permit falling back to the next
/// candidate adapter; only `Permanent` additionally forbids retrying the
/// same adapter with the same request. `Cancelled` short-circuits fallback
/// entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
    Cancelled,
}

/// Error surface returned by a provider adapter's `chat`/`probe` calls.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request error: {0}")]
    Request(String),
}

impl AdapterError {
    /// Classify this failure for the dispatch loop's fallback policy.
    ///
    /// Timeouts, connection failures, and 5xx responses are transient.
    /// Any other 4xx (excluding 408/429, which are transient) and malformed
    /// bodies are permanent. Cancellation is its own class and is never
    /// retried.
    pub fn classify(&self) -> ErrorClass {
        match self {
            AdapterError::Cancelled => ErrorClass::Cancelled,
            AdapterError::Timeout => ErrorClass::Transient,
            AdapterError::Request(_) => ErrorClass::Transient,
            AdapterError::Malformed(_) => ErrorClass::Permanent,
            AdapterError::Http { status, .. } => {
                if *status == 408 || *status == 429 || *status >= 500 {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
        }
    }

    /// Strip anything that looks like a credential before the message is
    /// allowed to cross into a log line or a response body.
    pub fn sanitized_message(&self) -> String {
        sanitize(&self.to_string())
    }
}

/// Remove Authorization headers, bearer tokens, and `api_key=` query
/// parameters from a string before it is logged or returned to a client.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        if let Some(idx) = line.to_ascii_lowercase().find("authorization:") {
            out.push_str(&line[..idx]);
            out.push_str("authorization: [redacted]\n");
            continue;
        }
        out.push_str(&redact_bearer(&redact_api_key_param(line)));
    }
    out
}

fn redact_bearer(input: &str) -> String {
    if let Some(idx) = input.find("Bearer ") {
        let mut s = input[..idx].to_string();
        s.push_str("Bearer [redacted]");
        s
    } else {
        input.to_string()
    }
}

fn redact_api_key_param(input: &str) -> String {
    if let Some(idx) = input.find("api_key=") {
        let start = idx + "api_key=".len();
        let end = input[start..]
            .find(['&', ' '])
            .map(|i| start + i)
            .unwrap_or(input.len());
        let mut s = input[..start].to_string();
        s.push_str("[redacted]");
        s.push_str(&input[end..]);
        s
    } else {
        input.to_string()
    }
}
