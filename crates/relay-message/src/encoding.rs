//! Percent-encoding for URI components and form data
//!
//! Each URI component has its own set of bytes that may appear literally.
//! Existing `%XX` triplets are kept as-is so encoding an already encoded
//! value is a no-op.

/// Characters allowed literally in a URI component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Path,
    Query,
    Fragment,
    UserInfo,
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn is_sub_delim(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
    )
}

impl Component {
    fn allows(self, b: u8) -> bool {
        if is_unreserved(b) || is_sub_delim(b) {
            return true;
        }
        match self {
            Component::Path => matches!(b, b':' | b'@' | b'/'),
            Component::Query | Component::Fragment => matches!(b, b':' | b'@' | b'/' | b'?'),
            Component::UserInfo => b == b':',
        }
    }
}

fn is_triplet(bytes: &[u8], i: usize) -> bool {
    bytes.len() > i + 2 && bytes[i + 1].is_ascii_hexdigit() && bytes[i + 2].is_ascii_hexdigit()
}

fn push_escaped(out: &mut String, b: u8) {
    out.push('%');
    out.push(HEX[(b >> 4) as usize] as char);
    out.push(HEX[(b & 0x0f) as usize] as char);
}

fn encode(value: &str, component: Component) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(bytes.len());

    for (i, &b) in bytes.iter().enumerate() {
        if b == b'%' && is_triplet(bytes, i) {
            out.push('%');
        } else if b.is_ascii() && component.allows(b) {
            out.push(b as char);
        } else {
            push_escaped(&mut out, b);
        }
    }
    out
}

/// Encode a URI path
pub fn encode_path(value: &str) -> String {
    encode(value, Component::Path)
}

/// Encode a URI query string
pub fn encode_query(value: &str) -> String {
    encode(value, Component::Query)
}

/// Encode a URI fragment
pub fn encode_fragment(value: &str) -> String {
    encode(value, Component::Fragment)
}

/// Encode URI user info (`user` or `user:password`)
pub fn encode_user_info(value: &str) -> String {
    encode(value, Component::UserInfo)
}

/// Encode a value for `application/x-www-form-urlencoded` (space as `+`)
pub fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else if b == b' ' {
            out.push('+');
        } else {
            push_escaped(&mut out, b);
        }
    }
    out
}

/// Decode a form-encoded value (`+` as space, `%XX` escapes)
///
/// Invalid escapes are kept literally; invalid UTF-8 is replaced.
pub fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if is_triplet(bytes, i) => {
                let hex = &value[i + 1..i + 3];
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => out.push(byte),
                    Err(_) => out.extend_from_slice(&bytes[i..i + 3]),
                }
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("/a b/c"), "/a%20b/c");
        assert_eq!(encode_path("/a%20b"), "/a%20b");
        assert_eq!(encode_path("/100%"), "/100%25");
        assert_eq!(encode_path("/q?x#y"), "/q%3Fx%23y");
        assert_eq!(encode_path("/ü"), "/%C3%BC");
    }

    #[test]
    fn test_encode_query_and_fragment() {
        assert_eq!(encode_query("a=1&b=c d"), "a=1&b=c%20d");
        assert_eq!(encode_query("next=/x?y"), "next=/x?y");
        assert_eq!(encode_fragment("top#more"), "top%23more");
    }

    #[test]
    fn test_encode_user_info() {
        assert_eq!(encode_user_info("user:p@ss"), "user:p%40ss");
    }

    #[test]
    fn test_encoding_is_idempotent() {
        for input in ["/a b", "100%", "%zz", "é", "x=%2"] {
            let once = encode_query(input);
            assert_eq!(encode_query(&once), once);
        }
    }

    #[test]
    fn test_url_encode_decode() {
        assert_eq!(url_encode("a b&c"), "a+b%26c");
        assert_eq!(url_decode("qux%20quux"), "qux quux");
        assert_eq!(url_decode("a+b"), "a b");
        assert_eq!(url_decode("100%"), "100%");
        assert_eq!(url_decode("%C3%BC"), "ü");
        assert_eq!(url_decode(&url_encode("ünïcode & more")), "ünïcode & more");
    }
}
