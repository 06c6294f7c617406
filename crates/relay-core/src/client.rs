//! Transport boundary for outgoing requests
//!
//! A [`Transport`] turns a [`Request`] into a [`Response`]. The helpers in
//! this module cover what every transport needs before touching the wire:
//! request validation, header rendering and the target URL.

use relay_message::{HttpMessage, HttpRequest, Request, Response};
use std::time::Duration;
use thiserror::Error;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(180);

/// Bodies up to this size are buffered in memory (1 MiB)
pub const DEFAULT_MAX_MEMORY_BODY: usize = 1024 * 1024;

/// Failure to obtain a response; carries the request that failed
#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS, connect, TLS or timeout failure; the request may be retried
    #[error("Network error: {message}")]
    Network { request: Box<Request>, message: String },

    /// The request itself is malformed or was rejected
    #[error("Request error: {message}")]
    Request { request: Box<Request>, message: String },
}

impl TransportError {
    pub fn network(request: Request, message: impl Into<String>) -> Self {
        TransportError::Network {
            request: Box::new(request),
            message: message.into(),
        }
    }

    pub fn request(request: Request, message: impl Into<String>) -> Self {
        TransportError::Request {
            request: Box::new(request),
            message: message.into(),
        }
    }

    /// The request that failed
    pub fn failed_request(&self) -> &Request {
        match self {
            TransportError::Network { request, .. } | TransportError::Request { request, .. } => {
                request
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TransportError::Network { message, .. } | TransportError::Request { message, .. } => {
                message
            }
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network { .. })
    }
}

/// Sends requests and returns their responses
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> Result<Response, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(Request) -> Result<Response, TransportError> + Send + Sync,
{
    fn send(&self, request: Request) -> Result<Response, TransportError> {
        self(request)
    }
}

/// Transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    connect_timeout: Duration,
    timeout: Option<Duration>,
    max_memory_body: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: None,
            max_memory_body: DEFAULT_MAX_MEMORY_BODY,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Limit on the whole exchange; unlimited by default
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Larger response bodies are spooled to a temporary file
    pub fn max_memory_body(mut self, size: usize) -> Self {
        self.max_memory_body = size;
        self
    }

    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_max_memory_body(&self) -> usize {
        self.max_memory_body
    }
}

/// Reject requests a transport cannot send
///
/// The URI must be absolute, use `http` or `https`, and name a host.
pub fn validate_request(request: &Request) -> Result<(), TransportError> {
    let uri = request.uri();
    let problem = if uri.scheme().is_empty() || uri.host().is_empty() {
        Some(format!("request URI is not absolute: {uri}"))
    } else if !matches!(uri.scheme(), "http" | "https") {
        Some(format!("unsupported scheme: {}", uri.scheme()))
    } else {
        None
    };

    match problem {
        Some(message) => Err(TransportError::request(request.clone(), message)),
        None => Ok(()),
    }
}

/// Header lines as sent on the wire, including the derived `Host`
pub fn wire_headers(request: &Request) -> Vec<String> {
    request.headers().wire_lines()
}

/// URL to connect to: the request URI without its fragment
pub fn target_url(request: &Request) -> String {
    request.uri().with_fragment("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_message::Status;

    #[test]
    fn test_validate_request() {
        let ok = Request::parse("GET", "https://example.com/a").unwrap();
        assert!(validate_request(&ok).is_ok());

        let relative = Request::parse("GET", "/a").unwrap();
        let err = validate_request(&relative).unwrap_err();
        assert!(!err.is_network());
        assert_eq!(err.failed_request().uri().path(), "/a");

        let ftp = Request::parse("GET", "ftp://example.com/a").unwrap();
        assert!(validate_request(&ftp)
            .unwrap_err()
            .message()
            .contains("unsupported scheme"));
    }

    #[test]
    fn test_wire_headers() {
        let request = Request::parse("GET", "http://example.com:8080/")
            .unwrap()
            .with_header("Accept", ["text/html"])
            .unwrap()
            .with_header("X-Empty", [""])
            .unwrap();
        let lines = wire_headers(&request);
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&"Host: example.com:8080".to_string()));
        assert!(lines.contains(&"Accept: text/html".to_string()));
        assert!(lines.contains(&"X-Empty;".to_string()));
    }

    #[test]
    fn test_target_url() {
        let request = Request::parse("GET", "http://example.com/a?b=1#frag").unwrap();
        assert_eq!(target_url(&request), "http://example.com/a?b=1");
    }

    #[test]
    fn test_closure_transport() {
        let transport = |request: Request| -> Result<Response, TransportError> {
            validate_request(&request)?;
            if request.uri().host() == "down.example" {
                return Err(TransportError::network(request, "connection refused"));
            }
            Ok(Response::new(Status::Ok))
        };

        let ok = transport
            .send(Request::parse("GET", "http://example.com/").unwrap())
            .unwrap();
        assert_eq!(ok.status(), Status::Ok);

        let err = transport
            .send(Request::parse("GET", "http://down.example/").unwrap())
            .unwrap_err();
        assert!(err.is_network());
        assert_eq!(err.to_string(), "Network error: connection refused");
    }

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.get_connect_timeout(), Duration::from_secs(180));
        assert_eq!(config.get_timeout(), None);
        assert_eq!(config.get_max_memory_body(), 1024 * 1024);

        let config = config.timeout(Duration::from_secs(5)).max_memory_body(16);
        assert_eq!(config.get_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.get_max_memory_body(), 16);
    }
}
