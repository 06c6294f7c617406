//! relay-core: Middleware dispatch over relay-message values
//!
//! A [`Pipeline`] runs a queue of middleware entries against a
//! [`ServerRequest`], with before/error/after hooks around each step.
//! Around it sit the adapters a host needs: building server requests from
//! a CGI-style environment, form and multipart codecs, and the transport
//! boundary for outgoing requests.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod form;
pub mod logging;
pub mod middleware;
pub mod multipart;
pub mod server;

pub use relay_message;

// Re-exports
pub use error::{Error, Result};
pub use relay_message::{
    Body, HttpMessage, HttpRequest, Method, Request, Response, ServerRequest, Status, Uri,
};

// Middleware re-exports
pub use middleware::{
    AfterHooks, Callable, Entry, ErrorContext, ErrorHook, Handler, Hook, HookHandle, LoggerAware,
    Middleware, Pipeline, PipelineConfig, PipelineState,
};

// Adapter re-exports
pub use client::{Transport, TransportConfig, TransportError};
pub use form::{encode_form, form_encoded_body, parse_query};
pub use multipart::{boundary_from_content_type, MultipartBody, MultipartConfig, MultipartData};
pub use server::{Environment, ServerRequestFactory};
