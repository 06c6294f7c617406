//! `application/x-www-form-urlencoded` codec
//!
//! Field names may carry bracket paths (`user[name]`, `tags[]`), which
//! decode into nested objects. Objects keyed exactly `0..n` become arrays.

use relay_message::encoding::{url_decode, url_encode};
use relay_message::{Body, MAX_FIELD_NESTING};
use serde_json::{Map, Value};

/// Content type of bodies produced by [`form_encoded_body`]
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Whether a `Content-Type` line names a urlencoded body
pub fn is_form_urlencoded(content_type: &str) -> bool {
    media_type_is(content_type, FORM_URLENCODED)
}

pub(crate) fn media_type_is(content_type: &str, media_type: &str) -> bool {
    content_type == media_type
        || content_type
            .strip_prefix(media_type)
            .is_some_and(|rest| rest.starts_with(';'))
}

/// Split a field name into its bracket path
///
/// `a[b][]` yields `["a", "b", ""]`. An empty base name, or more than
/// [`MAX_FIELD_NESTING`] bracket levels, yields nothing.
pub fn split_field_name(name: &str) -> Vec<String> {
    let mut parts = name.split('[');
    let base = parts.next().unwrap_or_default();
    if base.is_empty() {
        return Vec::new();
    }
    let mut path = vec![base.to_string()];
    for part in parts {
        if path.len() > MAX_FIELD_NESTING {
            return Vec::new();
        }
        path.push(part.trim_end_matches(']').to_string());
    }
    path
}

fn next_index(map: &Map<String, Value>) -> String {
    map.keys()
        .filter_map(|k| k.parse::<usize>().ok())
        .max()
        .map_or(0, |max| max + 1)
        .to_string()
}

/// Store `value` at a bracket path, creating intermediate objects
///
/// Empty segments append. A scalar in the way is replaced by an object.
pub fn insert_value(target: &mut Value, path: &[String], value: Value) {
    let mut slot = target;
    for head in path {
        if !slot.is_object() {
            *slot = match std::mem::take(slot) {
                Value::Array(items) => Value::Object(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect(),
                ),
                _ => Value::Object(Map::new()),
            };
        }
        let current = slot;
        slot = match current {
            Value::Object(map) => {
                let key = if head.is_empty() { next_index(map) } else { head.clone() };
                map.entry(key).or_insert(Value::Null)
            }
            _ => return,
        };
    }
    *slot = value;
}

/// Turn objects keyed exactly `0..n` into arrays, below the root
///
/// Levels below [`MAX_FIELD_NESTING`] are left as they are.
pub fn normalize(value: &mut Value) {
    if let Value::Object(map) = value {
        map.values_mut().for_each(|v| normalize_nested(v, 1));
    }
}

fn normalize_nested(value: &mut Value, depth: usize) {
    if depth > MAX_FIELD_NESTING {
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(|v| normalize_nested(v, depth + 1)),
        Value::Object(map) => {
            map.values_mut().for_each(|v| normalize_nested(v, depth + 1));
            let sequential =
                !map.is_empty() && (0..map.len()).all(|i| map.contains_key(&i.to_string()));
            if sequential {
                let mut items: Vec<_> = std::mem::take(map)
                    .into_iter()
                    .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
                    .collect();
                items.sort_by_key(|(i, _)| *i);
                *value = Value::Array(items.into_iter().map(|(_, v)| v).collect());
            }
        }
        _ => {}
    }
}

/// Decode a query string or urlencoded body into a field tree
///
/// The root is always an object. Later fields overwrite earlier ones with
/// the same name, except `name[]` which appends.
pub fn parse_query(input: &str) -> Value {
    let mut fields = Value::Object(Map::new());
    let input = input.strip_prefix('?').unwrap_or(input);

    for pair in input.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let path = split_field_name(&url_decode(name));
        if path.is_empty() {
            continue;
        }
        insert_value(&mut fields, &path, Value::String(url_decode(value)));
    }
    normalize(&mut fields);
    fields
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn encode_into(out: &mut Vec<String>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                encode_into(out, &format!("{prefix}[{key}]"), child);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                encode_into(out, &format!("{prefix}[{i}]"), child);
            }
        }
        scalar => {
            if let Some(text) = scalar_text(scalar) {
                out.push(format!("{}={}", url_encode(prefix), url_encode(&text)));
            }
        }
    }
}

/// Encode a field tree as a urlencoded string
///
/// Nested values use bracket names, booleans become `1`/`0` and nulls are
/// skipped. A scalar root encodes to an empty string.
pub fn encode_form(fields: &Value) -> String {
    let mut out = Vec::new();
    match fields {
        Value::Object(map) => {
            for (key, child) in map {
                encode_into(&mut out, key, child);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                encode_into(&mut out, &i.to_string(), child);
            }
        }
        _ => {}
    }
    out.join("&")
}

/// Body stream holding the urlencoded form of `fields`
///
/// Send it with a `Content-Type` of [`FORM_URLENCODED`].
pub fn form_encoded_body(fields: &Value) -> Body {
    Body::from(encode_form(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat() {
        let fields = parse_query("a=1&b=two+words&c=%C3%BC&d");
        assert_eq!(fields, json!({"a": "1", "b": "two words", "c": "ü", "d": ""}));
        assert_eq!(parse_query(""), json!({}));
        assert_eq!(parse_query("?x=1"), json!({"x": "1"}));
    }

    #[test]
    fn test_parse_brackets() {
        let fields = parse_query("user[name]=ann&user[roles][]=admin&user[roles][]=dev");
        assert_eq!(
            fields,
            json!({"user": {"name": "ann", "roles": ["admin", "dev"]}})
        );

        let fields = parse_query("m[0]=a&m[2]=b");
        assert_eq!(fields, json!({"m": {"0": "a", "2": "b"}}));

        let fields = parse_query("tags%5B%5D=x&tags%5B%5D=y");
        assert_eq!(fields, json!({"tags": ["x", "y"]}));
    }

    #[test]
    fn test_parse_overwrites() {
        assert_eq!(parse_query("a=1&a=2"), json!({"a": "2"}));
        assert_eq!(parse_query("a=1&a[b]=2"), json!({"a": {"b": "2"}}));
        assert_eq!(parse_query("=skipped&[x]=skipped"), json!({}));
    }

    #[test]
    fn test_split_field_name() {
        assert_eq!(split_field_name("a[b][]"), vec!["a", "b", ""]);
        assert_eq!(split_field_name("plain"), vec!["plain"]);
        assert!(split_field_name("[x]").is_empty());
    }

    #[test]
    fn test_nesting_cap() {
        let deep = format!("a{}=1", "[x]".repeat(20_000));
        assert_eq!(parse_query(&deep), json!({}));
        assert_eq!(parse_query(&format!("{deep}&b=2")), json!({"b": "2"}));

        let name = format!("a{}", "[x]".repeat(MAX_FIELD_NESTING));
        assert_eq!(split_field_name(&name).len(), MAX_FIELD_NESTING + 1);
        let mut fields = parse_query(&format!("{name}=1"));
        for _ in 0..=MAX_FIELD_NESTING {
            let key = if fields.get("a").is_some() { "a" } else { "x" };
            fields = fields[key].take();
        }
        assert_eq!(fields, json!("1"));

        let over = format!("a{}", "[x]".repeat(MAX_FIELD_NESTING + 1));
        assert!(split_field_name(&over).is_empty());
    }

    #[test]
    fn test_encode_form() {
        let fields = json!({
            "name": "a b",
            "list": ["x", "y"],
            "nested": {"k": true},
            "skip": null,
            "n": 3
        });
        assert_eq!(
            encode_form(&fields),
            "list%5B0%5D=x&list%5B1%5D=y&n=3&name=a+b&nested%5Bk%5D=1"
        );
        assert_eq!(encode_form(&json!("scalar")), "");
    }

    #[test]
    fn test_encode_then_parse() {
        let fields = json!({"a": {"b": ["1", "2"]}, "c": "&="});
        assert_eq!(parse_query(&encode_form(&fields)), fields);
    }

    #[test]
    fn test_form_encoded_body() {
        let body = form_encoded_body(&json!({"q": "rust lang"}));
        assert_eq!(body.contents().unwrap().as_ref(), b"q=rust+lang");
        assert!(is_form_urlencoded("application/x-www-form-urlencoded; charset=UTF-8"));
        assert!(!is_form_urlencoded("application/x-www-form-urlencodedx"));
    }
}
