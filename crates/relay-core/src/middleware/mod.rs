//! Middleware dispatch
//!
//! A [`Pipeline`] owns a queue of entries and three hook lists. Each
//! dispatch step runs the before hooks, pops one entry and invokes it with
//! the pipeline as its continuation; the entry either returns a response
//! or calls [`Handler::next`] to run the following step.

mod hooks;

pub use hooks::{ErrorContext, ErrorHook, Hook, HookHandle};

use crate::{Error, Result};
use relay_message::{Response, ServerRequest, Status};
use std::collections::VecDeque;
use tracing::Dispatch;

/// Continuation interface shared by the pipeline and [`HookHandle`]
pub trait Handler {
    /// Continue the chain with a new request/response pair
    fn next(&mut self, request: ServerRequest, response: Response) -> Result<Response>;

    /// Continue the chain with a new request and the current response
    fn handle(&mut self, request: ServerRequest) -> Result<Response>;

    /// Add entries to the end of the queue
    fn append(&mut self, entries: Vec<Entry>);

    /// Add entries to the front of the queue, keeping their order
    fn prepend(&mut self, entries: Vec<Entry>);

    /// Queued entries, counting the one currently running
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receives the pipeline's logger before being invoked
pub trait LoggerAware {
    fn set_logger(&mut self, logger: Dispatch);
}

/// Middleware trait - process a request, optionally delegating to the handler
pub trait Middleware: Send {
    fn process(&mut self, request: ServerRequest, handler: &mut dyn Handler) -> Result<Response>;

    /// Logger-aware middleware return themselves here
    fn logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
        None
    }
}

/// Plain callable entry: `(request, response, handler) -> response`
pub type Callable =
    Box<dyn FnMut(ServerRequest, Response, &mut dyn Handler) -> Result<Response> + Send>;

/// Queue entry
pub enum Entry {
    Middleware(Box<dyn Middleware>),
    Callable(Callable),
}

impl Entry {
    pub fn middleware<M: Middleware + 'static>(middleware: M) -> Self {
        Entry::Middleware(Box::new(middleware))
    }

    pub fn callable<F>(callable: F) -> Self
    where
        F: FnMut(ServerRequest, Response, &mut dyn Handler) -> Result<Response> + Send + 'static,
    {
        Entry::Callable(Box::new(callable))
    }

    fn logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
        match self {
            Entry::Middleware(middleware) => middleware.logger_aware(),
            Entry::Callable(_) => None,
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Middleware(_) => f.write_str("Entry::Middleware"),
            Entry::Callable(_) => f.write_str("Entry::Callable"),
        }
    }
}

/// When after hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfterHooks {
    /// When a dispatch step finds the queue empty
    #[default]
    OnDrain,
    /// Once per `run`/`handle`, after the outermost step returns a response
    OnComplete,
    /// Never
    Disabled,
}

/// Pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub after_hooks: AfterHooks,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after_hooks(mut self, policy: AfterHooks) -> Self {
        self.after_hooks = policy;
        self
    }
}

/// Dispatch progress, observable between and after steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    RunningBeforeHooks,
    DispatchingEntry,
    RunningErrorHooks,
    RunningAfterHooks,
    Terminal,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::RunningBeforeHooks => "before_hooks",
            PipelineState::DispatchingEntry => "dispatching",
            PipelineState::RunningErrorHooks => "error_hooks",
            PipelineState::RunningAfterHooks => "after_hooks",
            PipelineState::Terminal => "terminal",
        }
    }
}

/// Middleware pipeline
pub struct Pipeline {
    request: ServerRequest,
    response: Response,
    queue: VecDeque<Entry>,
    before: Vec<Hook>,
    errors: Vec<ErrorHook>,
    after: Vec<Hook>,
    config: PipelineConfig,
    logger: Option<Dispatch>,
    state: PipelineState,
    running: bool,
    depth: usize,
}

impl Pipeline {
    pub fn new(request: ServerRequest, response: Response) -> Self {
        Self::with_config(request, response, PipelineConfig::default())
    }

    pub fn with_config(request: ServerRequest, response: Response, config: PipelineConfig) -> Self {
        Self {
            request,
            response,
            queue: VecDeque::new(),
            before: Vec::new(),
            errors: Vec::new(),
            after: Vec::new(),
            config,
            logger: None,
            state: PipelineState::Idle,
            running: false,
            depth: 0,
        }
    }

    /// Register a before hook; the most recent registration runs first
    pub fn on_before<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(ServerRequest, Response, &mut HookHandle<'_>) -> Result<Response> + Send + 'static,
    {
        self.before.insert(0, Box::new(hook));
        self
    }

    /// Register an error hook; the most recent registration runs first
    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(ServerRequest, Response, &mut HookHandle<'_>, &mut ErrorContext) -> Result<Response>
            + Send
            + 'static,
    {
        self.errors.insert(0, Box::new(hook));
        self
    }

    /// Register an after hook; the most recent registration runs first
    pub fn on_after<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(ServerRequest, Response, &mut HookHandle<'_>) -> Result<Response> + Send + 'static,
    {
        self.after.insert(0, Box::new(hook));
        self
    }

    /// Logger handed to logger-aware middleware
    pub fn set_logger(&mut self, logger: Dispatch) -> &mut Self {
        self.logger = Some(logger);
        self
    }

    /// Drop every queued entry
    pub fn clear(&mut self) -> &mut Self {
        self.queue.clear();
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn request(&self) -> &ServerRequest {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Dispatch the current request, optionally replacing the current response
    pub fn run(&mut self, response: Option<Response>) -> Result<Response> {
        if let Some(response) = response {
            self.response = response;
        }
        self.dispatch()
    }

    fn set_state(&mut self, state: PipelineState) {
        tracing::trace!(state = state.as_str(), queued = self.queue.len(), "Pipeline state");
        self.state = state;
    }

    fn dispatch(&mut self) -> Result<Response> {
        self.depth += 1;
        let result = self.step();
        self.depth -= 1;

        match result {
            Ok(response)
                if self.depth == 0 && self.config.after_hooks == AfterHooks::OnComplete =>
            {
                let request = self.request.clone();
                let response = self.run_after_hooks(request, response);
                self.set_state(PipelineState::Terminal);
                Ok(response)
            }
            other => other,
        }
    }

    /// One dispatch step
    fn step(&mut self) -> Result<Response> {
        let mut request = self.request.clone();
        let mut response = self.response.clone();

        if !self.before.is_empty() {
            self.set_state(PipelineState::RunningBeforeHooks);
            if let Err(err) = self.run_before_hooks(&mut request, &mut response) {
                tracing::warn!(error = %err, "Before hook failed");
                self.set_state(PipelineState::Terminal);
                return Ok(response.with_status(Status::InternalServerError));
            }
        }

        let Some(mut entry) = self.queue.pop_front() else {
            let response = match self.config.after_hooks {
                AfterHooks::OnDrain => self.run_after_hooks(request, response),
                AfterHooks::OnComplete | AfterHooks::Disabled => response,
            };
            self.set_state(PipelineState::Terminal);
            return Ok(response);
        };

        if let (Some(logger), Some(aware)) = (&self.logger, entry.logger_aware()) {
            aware.set_logger(logger.clone());
        }

        self.set_state(PipelineState::DispatchingEntry);
        tracing::debug!(entry = ?entry, queued = self.queue.len(), "Dispatching entry");

        let was_running = std::mem::replace(&mut self.running, true);
        let result = match &mut entry {
            Entry::Middleware(middleware) => middleware.process(request.clone(), self),
            Entry::Callable(callable) => callable(request.clone(), response.clone(), self),
        };
        self.running = was_running;

        match result {
            Ok(response) => {
                self.set_state(PipelineState::Terminal);
                Ok(response)
            }
            Err(err) => self.recover(err, request, response),
        }
    }

    /// Run error hooks for a failed entry
    fn recover(
        &mut self,
        err: Error,
        mut request: ServerRequest,
        mut response: Response,
    ) -> Result<Response> {
        // already went through the hooks of an inner step
        if err.is_unhandled() {
            self.set_state(PipelineState::Terminal);
            return Err(err);
        }
        if self.errors.is_empty() {
            tracing::error!(error = %err, "Unhandled middleware error");
            self.set_state(PipelineState::Terminal);
            return Err(Error::Unhandled(Box::new(err)));
        }

        self.set_state(PipelineState::RunningErrorHooks);
        let mut ctx = ErrorContext::new(err);
        if let Err(hook_err) = self.run_error_hooks(&mut request, &mut response, &mut ctx) {
            tracing::warn!(error = %hook_err, "Error hook failed");
            ctx.set_handled(false);
        }

        if ctx.is_handled() {
            tracing::debug!(error = %ctx.error(), "Error handled, resuming dispatch");
            self.request = request;
            self.response = response;
            return self.step();
        }

        let err = ctx.into_error();
        tracing::error!(error = %err, "Unhandled middleware error");
        self.set_state(PipelineState::Terminal);
        Err(Error::Unhandled(Box::new(err)))
    }

    fn run_before_hooks(&mut self, request: &mut ServerRequest, response: &mut Response) -> Result<()> {
        let Pipeline {
            queue,
            before,
            running,
            ..
        } = self;
        let mut handle = HookHandle::new(queue, *running, response.clone());
        for hook in before.iter_mut() {
            thread_hook(&mut handle, request, response, |req, res, handle| hook(req, res, handle))?;
        }
        self.request = request.clone();
        self.response = response.clone();
        Ok(())
    }

    fn run_error_hooks(
        &mut self,
        request: &mut ServerRequest,
        response: &mut Response,
        ctx: &mut ErrorContext,
    ) -> Result<()> {
        let Pipeline {
            queue,
            errors,
            running,
            ..
        } = self;
        let mut handle = HookHandle::new(queue, *running, response.clone());
        for hook in errors.iter_mut() {
            thread_hook(&mut handle, request, response, |req, res, handle| {
                hook(req, res, handle, &mut *ctx)
            })?;
            if ctx.is_handled() {
                break;
            }
        }
        self.request = request.clone();
        self.response = response.clone();
        Ok(())
    }

    /// After hooks never fail the dispatch: a failing hook degrades the response
    fn run_after_hooks(&mut self, mut request: ServerRequest, mut response: Response) -> Response {
        if self.after.is_empty() {
            return response;
        }
        self.set_state(PipelineState::RunningAfterHooks);

        let Pipeline {
            queue,
            after,
            running,
            ..
        } = self;
        let mut handle = HookHandle::new(queue, *running, response.clone());
        for hook in after.iter_mut() {
            let result = thread_hook(&mut handle, &mut request, &mut response, |req, res, handle| {
                hook(req, res, handle)
            });
            if let Err(err) = result {
                tracing::warn!(error = %err, "After hook failed");
                response = response.with_status(Status::InternalServerError);
                break;
            }
        }
        self.request = request;
        self.response = response.clone();
        response
    }
}

/// Invoke one hook, threading the request/response pair through it
fn thread_hook<F>(
    handle: &mut HookHandle<'_>,
    request: &mut ServerRequest,
    response: &mut Response,
    call: F,
) -> Result<()>
where
    F: FnOnce(ServerRequest, Response, &mut HookHandle<'_>) -> Result<Response>,
{
    handle.set_response(response.clone());
    let result = call(request.clone(), response.clone(), &mut *handle);
    let staged = handle.take_staged();
    *response = result?;
    if let Some(staged) = staged {
        *request = staged;
    }
    Ok(())
}

impl Handler for Pipeline {
    fn next(&mut self, request: ServerRequest, response: Response) -> Result<Response> {
        self.request = request;
        self.response = response;
        self.dispatch()
    }

    fn handle(&mut self, request: ServerRequest) -> Result<Response> {
        self.request = request;
        self.dispatch()
    }

    fn append(&mut self, entries: Vec<Entry>) {
        self.queue.extend(entries);
    }

    fn prepend(&mut self, entries: Vec<Entry>) {
        for entry in entries.into_iter().rev() {
            self.queue.push_front(entry);
        }
    }

    fn len(&self) -> usize {
        self.queue.len() + usize::from(self.running)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("queued", &self.queue.len())
            .field("before", &self.before.len())
            .field("errors", &self.errors.len())
            .field("after", &self.after.len())
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}
