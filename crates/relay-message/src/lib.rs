//! relay-message: Immutable HTTP message values
//!
//! URIs, body streams, headers, requests and responses. Every message type
//! is a value: `with_*` methods return a modified copy and leave the
//! receiver untouched. Copies share their body stream.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod cookie;
pub mod encoding;
pub mod error;
pub mod headers;
pub mod message;
pub mod method;
pub mod request;
pub mod response;
pub mod server_request;
pub mod status;
pub mod stream;
pub mod uploaded_file;
pub mod uri;

// Re-exports
pub use cookie::{Cookie, CookieJar, SameSite};
pub use error::{Error, ErrorKind, Result};
pub use headers::HeaderBag;
pub use message::{HttpMessage, Message};
pub use method::Method;
pub use request::{HttpRequest, Request, RequestBuilder, RequestLine};
pub use response::Response;
pub use server_request::{Params, ServerRequest};
pub use status::Status;
pub use stream::{Body, Capabilities, Mode, Resource, Stream, StreamMetadata, StreamState};
pub use uploaded_file::{UploadError, UploadedFile, UploadedFileTree, MAX_FIELD_NESTING};
pub use uri::Uri;
