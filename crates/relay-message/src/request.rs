//! HTTP Request types

use crate::message::ImplicitHeaders;
use crate::{Body, Error, HeaderBag, HttpMessage, Message, Method, Result, Uri};

/// Method, URI and request-target override of a request
#[derive(Debug, Clone)]
pub struct RequestLine {
    method: Method,
    uri: Uri,
    request_target: Option<String>,
}

impl RequestLine {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            request_target: None,
        }
    }
}

/// `host[:port]` for a URI with a host
pub(crate) fn host_header(uri: &Uri) -> Option<String> {
    if uri.host().is_empty() {
        return None;
    }
    Some(match uri.port() {
        Some(port) => format!("{}:{}", uri.host(), port),
        None => uri.host().to_string(),
    })
}

/// Immutable request operations
pub trait HttpRequest: HttpMessage {
    fn request_line(&self) -> &RequestLine;

    fn request_line_mut(&mut self) -> &mut RequestLine;

    fn method(&self) -> Method {
        self.request_line().method
    }

    /// Copy with another method (case-insensitive)
    fn with_method(&self, method: &str) -> Result<Self> {
        let method = Method::parse(method)?;
        let mut new = self.clone();
        new.request_line_mut().method = method;
        Ok(new)
    }

    fn uri(&self) -> &Uri {
        &self.request_line().uri
    }

    /// Copy with another URI
    ///
    /// The `Host` header is updated from the new URI unless `preserve_host`
    /// is set and a `Host` header is already stored.
    fn with_uri(&self, uri: Uri, preserve_host: bool) -> Result<Self> {
        let host = host_header(&uri);
        let mut new = self.clone();
        new.request_line_mut().uri = uri;

        let keep = preserve_host && new.message().headers().contains("host");
        match host {
            Some(host) if !keep => new.with_header("Host", [host]),
            _ => Ok(new),
        }
    }

    /// Override, or `path?query` of the URI (`/` for an empty path)
    fn request_target(&self) -> String {
        if let Some(target) = &self.request_line().request_target {
            return target.clone();
        }
        let uri = self.uri();
        let mut target = match uri.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        if !uri.query().is_empty() {
            target.push('?');
            target.push_str(uri.query());
        }
        target
    }

    fn with_request_target(&self, target: &str) -> Result<Self> {
        if target.chars().any(char::is_whitespace) {
            return Err(Error::Validation(
                "request target cannot contain whitespace".to_string(),
            ));
        }
        let mut new = self.clone();
        new.request_line_mut().request_target = Some(target.to_string());
        Ok(new)
    }
}

/// HTTP Request
#[derive(Debug, Clone)]
pub struct Request {
    message: Message,
    line: RequestLine,
}

impl Request {
    /// Create a request with no headers and an empty body
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            message: Message::default(),
            line: RequestLine::new(method, uri),
        }
    }

    /// Create a request from method and URI strings
    pub fn parse(method: &str, uri: &str) -> Result<Self> {
        Ok(Self::new(Method::parse(method)?, Uri::parse(uri)?))
    }

    pub fn from_parts(method: Method, uri: Uri, headers: HeaderBag, body: Body) -> Self {
        Self {
            message: Message::new(headers, body),
            line: RequestLine::new(method, uri),
        }
    }

    pub fn builder(method: Method, uri: Uri) -> RequestBuilder {
        RequestBuilder::new(method, uri)
    }
}

impl HttpMessage for Request {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    fn implicit_headers(&self) -> ImplicitHeaders {
        let mut headers = ImplicitHeaders::new();
        if let Some(host) = host_header(self.uri()) {
            headers.push(("Host", host));
        }
        headers
    }
}

impl HttpRequest for Request {
    fn request_line(&self) -> &RequestLine {
        &self.line
    }

    fn request_line_mut(&mut self) -> &mut RequestLine {
        &mut self.line
    }
}

/// Builder for constructing requests
///
/// The first invalid header is reported by [`RequestBuilder::build`].
pub struct RequestBuilder {
    request: Request,
    error: Option<Error>,
}

impl RequestBuilder {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            request: Request::new(method, uri),
            error: None,
        }
    }

    /// Set a header, replacing earlier values
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.request.message.headers_mut().set(name, [value]) {
                self.error = Some(err);
            }
        }
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.request = self.request.with_body(body);
        self
    }

    pub fn protocol_version(mut self, version: &str) -> Self {
        self.request = self.request.with_protocol_version(version);
        self
    }

    pub fn build(self) -> Result<Request> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> Request {
        Request::parse("GET", uri).unwrap()
    }

    #[test]
    fn test_host_is_synthesized() {
        let req = get("http://example.com:8080/a");
        assert_eq!(req.header_line("host"), "example.com:8080");
        assert!(req.has_header("Host"));
        assert!(!req.message().headers().contains("host"));
        assert_eq!(req.headers().first("host"), Some("example.com:8080"));

        let req = get("https://example.com:443/a");
        assert_eq!(req.header_line("Host"), "example.com");

        let req = get("/relative");
        assert!(!req.has_header("host"));
    }

    #[test]
    fn test_explicit_host_wins() {
        let req = get("http://example.com/")
            .with_header("Host", ["proxy.local"])
            .unwrap();
        assert_eq!(req.header_line("host"), "proxy.local");
    }

    #[test]
    fn test_with_method() {
        let req = get("/");
        let post = req.with_method("post").unwrap();
        assert_eq!(post.method(), Method::Post);
        assert_eq!(req.method(), Method::Get);
        assert!(req.with_method("FETCH").unwrap_err().is_validation());
    }

    #[test]
    fn test_with_uri_updates_host() {
        let req = get("http://a.example/").with_header("Host", ["a.example"]).unwrap();
        let moved = req.with_uri(Uri::parse("http://b.example:81/x").unwrap(), false).unwrap();
        assert_eq!(moved.header_line("host"), "b.example:81");
        assert_eq!(moved.uri().path(), "/x");

        let preserved = req.with_uri(Uri::parse("http://b.example/").unwrap(), true).unwrap();
        assert_eq!(preserved.header_line("host"), "a.example");

        let hostless = req.with_uri(Uri::parse("/only-path").unwrap(), false).unwrap();
        assert_eq!(hostless.header_line("host"), "a.example");
    }

    #[test]
    fn test_request_target() {
        assert_eq!(get("http://example.com").request_target(), "/");
        assert_eq!(get("http://example.com/a?b=c").request_target(), "/a?b=c");

        let req = get("/a").with_request_target("*").unwrap();
        assert_eq!(req.request_target(), "*");
        assert!(get("/").with_request_target("/a b").unwrap_err().is_validation());
    }

    #[test]
    fn test_builder() {
        let req = Request::builder(Method::Post, Uri::parse("http://example.com/").unwrap())
            .header("Content-Type", "text/plain")
            .body("hi")
            .build()
            .unwrap();
        assert_eq!(req.header_line("content-type"), "text/plain");
        assert_eq!(req.body().to_string(), "hi");

        let err = Request::builder(Method::Get, Uri::default())
            .header("Bad Header", "x")
            .header("X-Ok", "y")
            .build()
            .unwrap_err();
        assert!(err.is_validation());
    }
}
