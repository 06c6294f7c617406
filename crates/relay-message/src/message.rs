//! Behaviour shared by every HTTP message
//!
//! Concrete messages embed a [`Message`] record and implement
//! [`HttpMessage`] by exposing it; all `with_*` operations come from the
//! trait's default methods and return modified copies.

use crate::{Body, HeaderBag, Result};
use smallvec::SmallVec;
use std::borrow::Cow;

/// Protocol version, headers and body of a message
#[derive(Debug, Clone)]
pub struct Message {
    protocol_version: String,
    headers: HeaderBag,
    body: Body,
}

impl Message {
    pub fn new(headers: HeaderBag, body: Body) -> Self {
        Self {
            protocol_version: "1.1".to_string(),
            headers,
            body,
        }
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(HeaderBag::new(), Body::empty())
    }
}

/// Headers a message reports without storing them
pub type ImplicitHeaders = SmallVec<[(&'static str, String); 1]>;

/// Immutable HTTP message operations
pub trait HttpMessage: Clone {
    fn message(&self) -> &Message;

    fn message_mut(&mut self) -> &mut Message;

    /// Headers derived from other parts of the message (e.g. `Host`)
    ///
    /// They are reported only while no explicit header of the same name
    /// is stored.
    fn implicit_headers(&self) -> ImplicitHeaders {
        ImplicitHeaders::new()
    }

    fn protocol_version(&self) -> &str {
        self.message().protocol_version()
    }

    fn with_protocol_version(&self, version: &str) -> Self {
        let mut new = self.clone();
        new.message_mut().protocol_version = version.to_string();
        new
    }

    /// All headers, including implicit ones
    fn headers(&self) -> Cow<'_, HeaderBag> {
        let stored = self.message().headers();
        let mut implicit = self
            .implicit_headers()
            .into_iter()
            .filter(|(name, _)| !stored.contains(name))
            .peekable();
        if implicit.peek().is_none() {
            return Cow::Borrowed(stored);
        }

        let mut headers = stored.clone();
        for (name, value) in implicit {
            // derived from already validated parts
            let _ = headers.set(name, [value]);
        }
        Cow::Owned(headers)
    }

    /// Values of one header (empty when absent)
    fn header(&self, name: &str) -> Cow<'_, [String]> {
        let stored = self.message().headers();
        if stored.contains(name) {
            return Cow::Borrowed(stored.get(name));
        }
        self.implicit_headers()
            .into_iter()
            .find(|(implicit, _)| implicit.eq_ignore_ascii_case(name))
            .map(|(_, value)| Cow::Owned(vec![value]))
            .unwrap_or(Cow::Borrowed(&[]))
    }

    /// Values of one header joined with `,`
    fn header_line(&self, name: &str) -> String {
        self.header(name).join(",")
    }

    fn has_header(&self, name: &str) -> bool {
        !self.header(name).is_empty()
    }

    /// Copy with `name` replaced; an empty list removes it
    fn with_header<I, V>(&self, name: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        let mut new = self.clone();
        new.message_mut().headers.set(name, values)?;
        Ok(new)
    }

    /// Copy with values appended to `name`, setting it when absent
    fn with_added_header<I, V>(&self, name: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        if !self.message().headers().contains(name) {
            return self.with_header(name, values);
        }
        let mut new = self.clone();
        new.message_mut().headers.add(name, values)?;
        Ok(new)
    }

    fn without_header(&self, name: &str) -> Self {
        let mut new = self.clone();
        new.message_mut().headers.remove(name);
        new
    }

    fn body(&self) -> &Body {
        self.message().body()
    }

    fn with_body(&self, body: impl Into<Body>) -> Self {
        let mut new = self.clone();
        new.message_mut().body = body.into();
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Plain {
        message: Message,
    }

    impl HttpMessage for Plain {
        fn message(&self) -> &Message {
            &self.message
        }

        fn message_mut(&mut self) -> &mut Message {
            &mut self.message
        }
    }

    #[derive(Debug, Clone, Default)]
    struct WithImplicit {
        message: Message,
    }

    impl HttpMessage for WithImplicit {
        fn message(&self) -> &Message {
            &self.message
        }

        fn message_mut(&mut self) -> &mut Message {
            &mut self.message
        }

        fn implicit_headers(&self) -> ImplicitHeaders {
            let mut headers = ImplicitHeaders::new();
            headers.push(("X-Derived", "yes".to_string()));
            headers
        }
    }

    #[test]
    fn test_protocol_version() {
        let msg = Plain::default();
        assert_eq!(msg.protocol_version(), "1.1");
        let v2 = msg.with_protocol_version("2");
        assert_eq!(v2.protocol_version(), "2");
        assert_eq!(msg.protocol_version(), "1.1");
    }

    #[test]
    fn test_with_header_copies_bag() {
        let original = Plain::default().with_header("Accept", ["text/html"]).unwrap();
        let copy = original.with_header("Accept", ["application/json"]).unwrap();
        assert_eq!(original.header_line("accept"), "text/html");
        assert_eq!(copy.header_line("accept"), "application/json");

        let without = copy.without_header("ACCEPT");
        assert!(!without.has_header("accept"));
        assert!(copy.has_header("accept"));
    }

    #[test]
    fn test_with_added_header() {
        let msg = Plain::default()
            .with_added_header("Vary", ["Accept"])
            .unwrap()
            .with_added_header("vary", ["Origin"])
            .unwrap();
        assert_eq!(msg.header_line("Vary"), "Accept,Origin");
        assert_eq!(msg.headers().iter().next().unwrap().0, "Vary");
    }

    #[test]
    fn test_invalid_header_rejected() {
        assert!(Plain::default().with_header("X-Bad", ["a\nb"]).is_err());
    }

    #[test]
    fn test_body_shared_between_copies() {
        let msg = Plain::default().with_body("payload");
        let copy = msg.with_header("X-A", ["1"]).unwrap();
        assert!(msg.body().ptr_eq(copy.body()));
        assert_eq!(copy.body().to_string(), "payload");
    }

    #[test]
    fn test_implicit_headers() {
        let msg = WithImplicit::default();
        assert_eq!(msg.header_line("x-derived"), "yes");
        assert!(msg.has_header("X-DERIVED"));
        assert_eq!(msg.headers().len(), 1);
        assert!(msg.message().headers().is_empty());

        let explicit = msg.with_header("X-Derived", ["no"]).unwrap();
        assert_eq!(explicit.header_line("x-derived"), "no");
        assert_eq!(explicit.headers().len(), 1);
    }
}
