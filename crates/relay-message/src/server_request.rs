//! Requests as received by a server
//!
//! On top of the request line a [`ServerRequest`] carries snapshots of the
//! server environment. The snapshots are reference counted, so copies made
//! by `with_*` share them until one is replaced.

use crate::message::ImplicitHeaders;
use crate::request::{host_header, RequestLine};
use crate::{
    Body, Error, HeaderBag, HttpMessage, HttpRequest, Message, Method, Result, Stream, Uri,
    UploadedFileTree,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flat string parameters (server variables, cookies)
pub type Params = BTreeMap<String, String>;

/// HTTP request with server-side context
#[derive(Debug, Clone)]
pub struct ServerRequest {
    message: Message,
    line: RequestLine,
    server_params: Arc<Params>,
    cookie_params: Arc<Params>,
    query_params: Arc<Value>,
    uploaded_files: Arc<UploadedFileTree>,
    parsed_body: Arc<Value>,
    attributes: Arc<Map<String, Value>>,
}

impl ServerRequest {
    /// Create a server request with an empty read-only body
    pub fn new(method: Method, uri: Uri, server_params: Params) -> Self {
        Self::from_parts(
            method,
            uri,
            HeaderBag::new(),
            Body::new(Stream::read_only(Vec::new())),
            server_params,
        )
    }

    pub fn from_parts(
        method: Method,
        uri: Uri,
        headers: HeaderBag,
        body: Body,
        server_params: Params,
    ) -> Self {
        Self {
            message: Message::new(headers, body),
            line: RequestLine::new(method, uri),
            server_params: Arc::new(server_params),
            cookie_params: Arc::default(),
            query_params: Arc::new(Value::Object(Map::new())),
            uploaded_files: Arc::default(),
            parsed_body: Arc::new(Value::Object(Map::new())),
            attributes: Arc::default(),
        }
    }

    pub fn server_params(&self) -> &Params {
        &self.server_params
    }

    pub fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    pub fn cookie_params(&self) -> &Params {
        &self.cookie_params
    }

    pub fn with_cookie_params(&self, cookies: Params) -> Self {
        let mut new = self.clone();
        new.cookie_params = Arc::new(cookies);
        new
    }

    pub fn query_params(&self) -> &Value {
        &self.query_params
    }

    pub fn with_query_params(&self, query: Value) -> Self {
        let mut new = self.clone();
        new.query_params = Arc::new(query);
        new
    }

    pub fn uploaded_files(&self) -> &UploadedFileTree {
        &self.uploaded_files
    }

    /// Copy with another file tree; its root must be a map or a list
    pub fn with_uploaded_files(&self, files: UploadedFileTree) -> Result<Self> {
        if !files.is_container() {
            return Err(Error::Validation("invalid uploaded files tree".to_string()));
        }
        let mut new = self.clone();
        new.uploaded_files = Arc::new(files);
        Ok(new)
    }

    pub fn parsed_body(&self) -> &Value {
        &self.parsed_body
    }

    /// Copy with another parsed body; it must be an object or an array
    pub fn with_parsed_body(&self, body: Value) -> Result<Self> {
        if !(body.is_object() || body.is_array()) {
            return Err(Error::Validation(
                "parsed body must be an object or an array".to_string(),
            ));
        }
        let mut new = self.clone();
        new.parsed_body = Arc::new(body);
        Ok(new)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn with_attribute(&self, name: &str, value: impl Into<Value>) -> Self {
        let mut new = self.clone();
        Arc::make_mut(&mut new.attributes).insert(name.to_string(), value.into());
        new
    }

    pub fn without_attribute(&self, name: &str) -> Self {
        if !self.attributes.contains_key(name) {
            return self.clone();
        }
        let mut new = self.clone();
        Arc::make_mut(&mut new.attributes).remove(name);
        new
    }

    /// Whether two requests share the same environment snapshots
    pub fn shares_snapshots(&self, other: &ServerRequest) -> bool {
        Arc::ptr_eq(&self.server_params, &other.server_params)
            && Arc::ptr_eq(&self.cookie_params, &other.cookie_params)
            && Arc::ptr_eq(&self.query_params, &other.query_params)
            && Arc::ptr_eq(&self.uploaded_files, &other.uploaded_files)
            && Arc::ptr_eq(&self.parsed_body, &other.parsed_body)
    }
}

impl HttpMessage for ServerRequest {
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

impl HttpRequest for ServerRequest {
    fn request_line(&self) -> &RequestLine {
        &self.line
    }

    fn request_line_mut(&mut self) -> &mut RequestLine {
        &mut self.line
    }
}
