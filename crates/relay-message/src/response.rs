//! HTTP Response types

use crate::{Body, Error, HeaderBag, HttpMessage, Message, Result, Status, Stream};
use serde_json::Value;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const JSON_DISPOSITION: &str = "attachment; filename=\"data.json\"";

/// HTTP Response
#[derive(Debug, Clone, Default)]
pub struct Response {
    message: Message,
    status: Status,
    reason: Option<String>,
}

impl Response {
    /// Create a response with no headers and an empty body
    pub fn new(status: Status) -> Self {
        Self {
            message: Message::default(),
            status,
            reason: None,
        }
    }

    pub fn from_parts(status: Status, headers: HeaderBag, body: Body) -> Self {
        Self {
            message: Message::new(headers, body),
            status,
            reason: None,
        }
    }

    /// 200 response with a text body
    pub fn text(body: impl Into<String>) -> Self {
        let mut headers = HeaderBag::new();
        let _ = headers.set("Content-Type", ["text/plain; charset=utf-8"]);
        Self::from_parts(Status::Ok, headers, Body::from(body.into()))
    }

    /// HTML response
    pub fn html(status: Status, body: impl Into<String>) -> Self {
        let mut headers = HeaderBag::new();
        let _ = headers.set("Content-Type", ["text/html; charset=utf-8"]);
        Self::from_parts(status, headers, Body::from(body.into()))
    }

    /// JSON download response; `null` and empty containers serialize as `{}`
    pub fn json(status: Status, value: &Value) -> Result<Self> {
        let mut headers = HeaderBag::new();
        headers.set("Content-Type", [JSON_CONTENT_TYPE])?;
        headers.set("Content-Disposition", [JSON_DISPOSITION])?;
        let body = encode_json(value)?;
        Ok(Self::from_parts(status, headers, Body::from(body)))
    }

    /// JSONP response wrapping the JSON document in `callback(...);`
    pub fn jsonp(status: Status, callback: &str, value: &Value) -> Result<Self> {
        if callback.is_empty() {
            return Self::json(status, value);
        }
        let mut headers = HeaderBag::new();
        headers.set("Content-Type", ["application/javascript; charset=utf-8"])?;
        let body = format!("{}({});", callback, encode_json(value)?);
        Ok(Self::from_parts(status, headers, Body::from(body)))
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.code()
    }

    /// Override phrase, or the canonical one for the status
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }

    /// Copy with another status; any reason override is dropped
    pub fn with_status(&self, status: Status) -> Self {
        let mut new = self.clone();
        new.status = status;
        new.reason = None;
        new
    }

    /// Copy with a status looked up by code and an optional phrase override
    ///
    /// An empty `reason` means the canonical phrase.
    pub fn with_status_code(&self, code: u16, reason: &str) -> Result<Self> {
        let mut new = self.with_status(Status::from_code(code)?);
        if !reason.is_empty() {
            new.reason = Some(reason.to_string());
        }
        Ok(new)
    }

    /// Decode the body as a JSON document
    pub fn parsed_json(&self) -> Result<Value> {
        let bytes = self.body().contents()?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Validation(format!("response body is not valid JSON: {}", e)))
    }
}

fn encode_json(value: &Value) -> Result<String> {
    let empty = match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Ok("{}".to_string());
    }
    serde_json::to_string(value).map_err(|e| Error::Validation(e.to_string()))
}

impl HttpMessage for Response {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}

impl From<Status> for Response {
    fn from(status: Status) -> Self {
        Response::new(status)
    }
}

impl From<Stream> for Response {
    fn from(stream: Stream) -> Self {
        Response::from_parts(Status::Ok, HeaderBag::new(), Body::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_response() {
        let res = Response::default();
        assert_eq!(res.status(), Status::Ok);
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.reason_phrase(), "OK");
        assert_eq!(res.protocol_version(), "1.1");
    }

    #[test]
    fn test_with_status_code_and_reason() {
        let res = Response::default().with_status_code(404, "Gone Fishing").unwrap();
        assert_eq!(res.status(), Status::NotFound);
        assert_eq!(res.reason_phrase(), "Gone Fishing");

        let canonical = res.with_status_code(404, "").unwrap();
        assert_eq!(canonical.reason_phrase(), "Not Found");

        assert!(matches!(
            Response::default().with_status_code(299, ""),
            Err(Error::InvalidStatus(299))
        ));
    }

    #[test]
    fn test_with_status_clears_reason() {
        let res = Response::default()
            .with_status_code(500, "Oops")
            .unwrap()
            .with_status(Status::Created);
        assert_eq!(res.reason_phrase(), "Created");
    }

    #[test]
    fn test_json_response() {
        let res = Response::json(Status::Ok, &json!({"id": 7})).unwrap();
        assert_eq!(res.header_line("content-type"), JSON_CONTENT_TYPE);
        assert_eq!(res.header_line("content-disposition"), JSON_DISPOSITION);
        assert_eq!(res.body().to_string(), r#"{"id":7}"#);
        assert_eq!(res.parsed_json().unwrap(), json!({"id": 7}));

        let empty = Response::json(Status::Ok, &json!([])).unwrap();
        assert_eq!(empty.body().to_string(), "{}");
    }

    #[test]
    fn test_jsonp_response() {
        let res = Response::jsonp(Status::Ok, "cb", &json!([1, 2])).unwrap();
        assert_eq!(res.body().to_string(), "cb([1,2]);");
        assert!(res.header_line("content-type").starts_with("application/javascript"));
        assert!(!res.has_header("content-disposition"));
    }

    #[test]
    fn test_html_and_text() {
        let res = Response::html(Status::NotFound, "<h1>missing</h1>");
        assert_eq!(res.status_code(), 404);
        assert_eq!(res.header_line("Content-Type"), "text/html; charset=utf-8");
        assert_eq!(Response::text("plain").body().to_string(), "plain");
        assert!(Response::text("x").parsed_json().unwrap_err().is_validation());
    }
}
