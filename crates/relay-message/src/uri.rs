//! URI value type
//!
//! Parses, canonicalizes and reconstructs `scheme://user@host:port/path?query#fragment`.
//! Scheme and host are lower-cased, components are percent-encoded on the way
//! in, and a port equal to the scheme default is never reported.

use crate::encoding::{encode_fragment, encode_path, encode_query, encode_user_info};
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Uniform Resource Identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    user_info: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: String,
    fragment: String,
}

/// Default port for a scheme, if it has one
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn clean_scheme(scheme: &str) -> String {
    scheme
        .to_ascii_lowercase()
        .trim_end_matches([':', '/'])
        .to_string()
}

fn clean_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    // bare IPv6 literals get brackets (RFC 2732)
    if Ipv6Addr::from_str(&host).is_ok() {
        return format!("[{}]", host);
    }
    host
}

/// Lower-cased host, rejected when it would not survive a render and re-parse
fn check_host(host: &str) -> Result<String> {
    let host = clean_host(host);
    let valid = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .is_some_and(|ip| Ipv6Addr::from_str(ip).is_ok()),
        None => !host.chars().any(|c| {
            c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '@' | ':' | '[' | ']')
        }),
    };
    if valid {
        Ok(host)
    } else {
        Err(Error::Validation(format!("invalid host: {host}")))
    }
}

fn check_port(port: u32) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(Error::InvalidPort(port)),
    }
}

impl Uri {
    /// Parse a URI string
    pub fn parse(input: &str) -> Result<Self> {
        if input.bytes().any(|b| b.is_ascii_control()) {
            return Err(Error::Parse(input.to_string()));
        }

        let mut uri = Uri::default();
        let mut rest = input;

        if let Some((before, fragment)) = rest.split_once('#') {
            uri.fragment = encode_fragment(fragment);
            rest = before;
        }
        if let Some((before, query)) = rest.split_once('?') {
            uri.query = encode_query(query);
            rest = before;
        }

        if let Some((scheme, after)) = rest.split_once(':') {
            // `host:8080` is not a scheme, `mailto:x` and `http://x` are
            let looks_like_port = !after.starts_with("//")
                && after.starts_with(|c: char| c.is_ascii_digit());
            if is_scheme(scheme) && !looks_like_port {
                uri.scheme = clean_scheme(scheme);
                rest = after;
            } else if !scheme.contains('/') && !looks_like_port {
                return Err(Error::Parse(input.to_string()));
            }
        }

        if let Some(after) = rest.strip_prefix("//") {
            let (authority, path) = match after.find('/') {
                Some(idx) => after.split_at(idx),
                None => (after, ""),
            };
            uri.parse_authority(authority)
                .map_err(|_| Error::Parse(input.to_string()))?;
            rest = path;
        }

        uri.path = encode_path(rest);
        Ok(uri)
    }

    fn parse_authority(&mut self, authority: &str) -> Result<()> {
        let host_port = match authority.rsplit_once('@') {
            Some((user_info, host_port)) => {
                self.user_info = encode_user_info(user_info);
                host_port
            }
            None => authority,
        };

        let (host, port) = if host_port.starts_with('[') {
            let end = host_port
                .find(']')
                .ok_or_else(|| Error::Parse(authority.to_string()))?;
            let (host, tail) = host_port.split_at(end + 1);
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(Error::Parse(authority.to_string())),
                },
            }
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (host_port, None),
            }
        };

        if let Some(port) = port.filter(|p| !p.is_empty()) {
            if host.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::Parse(authority.to_string()));
            }
            let number: u32 = port
                .parse()
                .map_err(|_| Error::Parse(authority.to_string()))?;
            self.port = Some(check_port(number)?);
        }

        self.host = check_host(host)?;
        Ok(())
    }

    /// Build a URI from discrete parts
    pub fn from_parts(
        scheme: &str,
        host: &str,
        port: Option<u32>,
        path: &str,
        query: &str,
        user: &str,
        password: Option<&str>,
    ) -> Result<Self> {
        let uri = Uri::default()
            .with_scheme(scheme)?
            .with_host(host)?
            .with_port(port)?
            .with_path(path)
            .with_query(query)
            .with_user_info(user, password);
        Ok(uri)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `user@host:port`, with the port omitted when it is the scheme default
    ///
    /// Empty when there is no host.
    pub fn authority(&self) -> String {
        if self.host.is_empty() {
            return String::new();
        }

        let mut authority = String::new();
        if !self.user_info.is_empty() {
            authority.push_str(&self.user_info);
            authority.push('@');
        }
        authority.push_str(&self.host);
        if let Some(port) = self.port() {
            authority.push(':');
            authority.push_str(&port.to_string());
        }
        authority
    }

    pub fn user_info(&self) -> &str {
        &self.user_info
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, or `None` when unset or equal to the scheme's default
    pub fn port(&self) -> Option<u16> {
        match self.port {
            Some(port) if default_port(&self.scheme) == Some(port) => None,
            port => port,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Replace the scheme; an empty scheme makes the URI relative
    pub fn with_scheme(&self, scheme: &str) -> Result<Self> {
        let scheme = clean_scheme(scheme);
        if !scheme.is_empty() && !is_scheme(&scheme) {
            return Err(Error::Validation(format!("invalid scheme: {scheme}")));
        }
        Ok(Self {
            scheme,
            ..self.clone()
        })
    }

    /// Replace user info; the password is only kept alongside a non-empty user
    pub fn with_user_info(&self, user: &str, password: Option<&str>) -> Self {
        let mut user_info = user.to_string();
        if let Some(password) = password.filter(|p| !user.is_empty() && !p.is_empty()) {
            user_info.push(':');
            user_info.push_str(password);
        }
        Self {
            user_info: encode_user_info(&user_info),
            ..self.clone()
        }
    }

    /// Replace the host; bare IPv6 literals are bracketed
    pub fn with_host(&self, host: &str) -> Result<Self> {
        Ok(Self {
            host: check_host(host)?,
            ..self.clone()
        })
    }

    /// Replace the port, validating the 1-65535 range
    pub fn with_port(&self, port: Option<u32>) -> Result<Self> {
        let port = port.map(check_port).transpose()?;
        Ok(Self {
            port,
            ..self.clone()
        })
    }

    pub fn with_path(&self, path: &str) -> Self {
        Self {
            path: encode_path(path),
            ..self.clone()
        }
    }

    pub fn with_query(&self, query: &str) -> Self {
        Self {
            query: encode_query(query.trim_start_matches('?')),
            ..self.clone()
        }
    }

    pub fn with_fragment(&self, fragment: &str) -> Self {
        Self {
            fragment: encode_fragment(fragment.trim_start_matches('#')),
            ..self.clone()
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }

        let authority = self.authority();
        if !authority.is_empty() {
            write!(f, "//{}", authority)?;
        }

        if !self.path.is_empty() {
            if !authority.is_empty() {
                if !self.path.starts_with('/') {
                    f.write_str("/")?;
                }
                f.write_str(&self.path)?;
            } else if self.path.starts_with('/') {
                // `//x` without an authority would re-parse as a host
                write!(f, "/{}", self.path.trim_start_matches('/'))?;
            } else {
                f.write_str(&self.path)?;
            }
        }

        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uri::parse(s)
    }
}

impl TryFrom<&str> for Uri {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Uri::parse(s)
    }
}
