//! Cookies
//!
//! Parse `Cookie` request headers and serialize `Set-Cookie` values.

use crate::encoding::{url_decode, url_encode};
use crate::{Error, HttpMessage, Response, Result};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// Expiry used for clearing cookies
const CLEARED_EXPIRES: i64 = 1;

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(Error::InvalidCookie(format!("invalid SameSite value '{}'", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// HTTP Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    /// Unix timestamp
    expires: Option<i64>,
    path: Option<String>,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    /// Create a cookie; the name must be non-empty and free of `=,; \t\r\n\x0B\x0C`
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidCookie("cookie name cannot be empty".to_string()));
        }
        if name.chars().any(|c| "=,; \t\r\n\x0B\x0C".contains(c)) {
            return Err(Error::InvalidCookie(format!(
                "cookie name '{}' contains invalid characters",
                name
            )));
        }
        Ok(Self {
            name,
            value: value.into(),
            expires: None,
            path: None,
            domain: None,
            secure: false,
            http_only: false,
            same_site: None,
        })
    }

    /// Create a clearing cookie (empty value)
    pub fn delete(name: impl Into<String>) -> Result<Self> {
        Self::new(name, "")
    }

    pub fn expires(mut self, timestamp: i64) -> Self {
        self.expires = Some(timestamp);
        self
    }

    /// Set the path; an empty path means `/`
    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(if path.is_empty() { "/" } else { path }.to_string());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn same_site_policy(&self) -> Option<SameSite> {
        self.same_site
    }

    /// Whether sending this cookie removes it from the client at `now`
    pub fn is_cleared(&self, now: i64) -> bool {
        self.value.is_empty() || self.expires.is_some_and(|t| t != 0 && t < now)
    }

    /// Serialize to Set-Cookie header value
    pub fn to_header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", url_encode(&self.name))?;
        if self.value.is_empty() {
            write!(f, "; expires={}", http_date(CLEARED_EXPIRES))?;
        } else {
            f.write_str(&url_encode(&self.value))?;
            if let Some(expires) = self.expires.filter(|&t| t != 0) {
                write!(f, "; expires={}", http_date(expires))?;
            }
        }
        if let Some(path) = &self.path {
            write!(f, "; path={}", path)?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; domain={}", domain)?;
        }
        if self.secure {
            f.write_str("; secure")?;
        }
        if self.http_only {
            f.write_str("; httponly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; samesite={}", same_site.as_str())?;
        }
        Ok(())
    }
}

/// Format a unix timestamp as `Thu, 01-Jan-1970 00:00:01 GMT`
fn http_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .format("%a, %d-%b-%Y %H:%M:%S GMT")
        .to_string()
}

/// Cookies sent by a client plus cookies queued for the response
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
    pending: SmallVec<[Cookie; 4]>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse cookies from a Cookie header; names and values are url-decoded
    ///
    /// The first occurrence of a name wins.
    pub fn parse(header: &str) -> Self {
        let mut jar = Self::new();

        for part in header.split(';') {
            let part = part.trim();
            if let Some((name, value)) = part.split_once('=') {
                let name = url_decode(name.trim());
                if name.is_empty() {
                    continue;
                }
                jar.cookies
                    .entry(name)
                    .or_insert_with(|| url_decode(value.trim()));
            }
        }

        jar
    }

    /// Get cookie value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Check if jar has a cookie
    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Get all cookie names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }

    /// Received cookies as a name/value map
    pub fn to_params(&self) -> BTreeMap<String, String> {
        self.cookies.clone()
    }

    /// Queue a cookie to be set
    pub fn set(&mut self, cookie: Cookie) {
        self.pending.push(cookie);
    }

    /// Queue a clearing cookie
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.pending.push(Cookie::delete(name)?);
        Ok(())
    }

    /// Get all pending Set-Cookie header values
    pub fn pending_headers(&self) -> impl Iterator<Item = String> + '_ {
        self.pending.iter().map(Cookie::to_header_value)
    }

    /// Copy of `response` with a Set-Cookie header per pending cookie
    pub fn apply(&self, response: &Response) -> Result<Response> {
        let mut response = response.clone();
        for value in self.pending_headers() {
            response = response.with_added_header("Set-Cookie", [value])?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_serialize() {
        let cookie = Cookie::new("session", "abc 123")
            .unwrap()
            .path("")
            .secure()
            .http_only()
            .same_site(SameSite::Strict);

        assert_eq!(
            cookie.to_header_value(),
            "session=abc+123; path=/; secure; httponly; samesite=Strict"
        );
    }

    #[test]
    fn test_cookie_expires() {
        let cookie = Cookie::new("id", "1").unwrap().expires(1_700_000_000);
        assert_eq!(cookie.to_string(), "id=1; expires=Tue, 14-Nov-2023 22:13:20 GMT");
        assert!(cookie.is_cleared(1_800_000_000));
        assert!(!cookie.is_cleared(1_600_000_000));
    }

    #[test]
    fn test_cookie_delete() {
        let cookie = Cookie::delete("session").unwrap().domain("example.com");
        assert_eq!(
            cookie.to_string(),
            "session=; expires=Thu, 01-Jan-1970 00:00:01 GMT; domain=example.com"
        );
        assert!(cookie.is_cleared(0));
    }

    #[test]
    fn test_cookie_name_validation() {
        assert!(Cookie::new("", "x").unwrap_err().is_validation());
        assert!(Cookie::new("a=b", "x").is_err());
        assert!(Cookie::new("a b", "x").is_err());
        assert!(Cookie::new("a\x0Bb", "x").is_err());
        assert!(Cookie::new("token", "=;, ok").is_ok());
    }

    #[test]
    fn test_same_site_parse() {
        assert_eq!(SameSite::parse("LAX").unwrap(), SameSite::Lax);
        assert!(SameSite::parse("sometimes").unwrap_err().is_validation());
    }

    #[test]
    fn test_http_date() {
        assert_eq!(http_date(0), "Thu, 01-Jan-1970 00:00:00 GMT");
        assert_eq!(http_date(951_782_400), "Tue, 29-Feb-2000 00:00:00 GMT");
        assert_eq!(http_date(-86_400), "Wed, 31-Dec-1969 00:00:00 GMT");
        assert!(http_date(i64::MAX).ends_with(" GMT"));
    }

    #[test]
    fn test_cookie_jar_parse() {
        let jar = CookieJar::parse("session=abc123; theme=dark%20mode; lang=en; lang=fr; bad");

        assert_eq!(jar.get("session"), Some("abc123"));
        assert_eq!(jar.get("theme"), Some("dark mode"));
        assert_eq!(jar.get("lang"), Some("en"));
        assert_eq!(jar.get("missing"), None);
        assert_eq!(jar.names().count(), 3);
    }

    #[test]
    fn test_cookie_jar_apply() {
        let mut jar = CookieJar::new();
        jar.set(Cookie::new("a", "1").unwrap());
        jar.remove("b").unwrap();

        let response = jar.apply(&Response::default()).unwrap();
        assert_eq!(response.header("set-cookie").len(), 2);
        assert_eq!(response.header("set-cookie")[0], "a=1");
    }
}
