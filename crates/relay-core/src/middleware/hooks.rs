//! Hook callbacks and the continuation handed to them

use super::{Entry, Handler};
use crate::{Error, Result};
use relay_message::{Response, ServerRequest};
use std::collections::VecDeque;

/// Before/after hook: `(request, response, handle) -> response`
pub type Hook =
    Box<dyn FnMut(ServerRequest, Response, &mut HookHandle<'_>) -> Result<Response> + Send>;

/// Error hook, additionally given the failure being recovered from
pub type ErrorHook = Box<
    dyn FnMut(ServerRequest, Response, &mut HookHandle<'_>, &mut ErrorContext) -> Result<Response>
        + Send,
>;

/// Failure raised by a pipeline entry, as seen by error hooks
#[derive(Debug)]
pub struct ErrorContext {
    error: Error,
    handled: bool,
}

impl ErrorContext {
    pub(crate) fn new(error: Error) -> Self {
        Self {
            error,
            handled: false,
        }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Mark the failure as recovered; dispatch resumes with the next entry
    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    pub(crate) fn into_error(self) -> Error {
        self.error
    }
}

/// Continuation passed to hooks
///
/// Hooks run outside of dispatch, so `next`/`handle` never advance the
/// chain. They stage a request instead: once the hook returns, the most
/// recently staged request becomes the pipeline's current request.
/// `append`/`prepend` edit the pipeline queue directly.
pub struct HookHandle<'a> {
    queue: &'a mut VecDeque<Entry>,
    running: bool,
    response: Response,
    staged: Vec<ServerRequest>,
}

impl<'a> HookHandle<'a> {
    pub(crate) fn new(queue: &'a mut VecDeque<Entry>, running: bool, response: Response) -> Self {
        Self {
            queue,
            running,
            response,
            staged: Vec::new(),
        }
    }

    /// Most recent staged request; earlier ones are dropped
    pub(crate) fn take_staged(&mut self) -> Option<ServerRequest> {
        let last = self.staged.pop();
        self.staged.clear();
        last
    }

    pub(crate) fn set_response(&mut self, response: Response) {
        self.response = response;
    }

    /// Number of requests staged by the running hook
    pub fn staged(&self) -> usize {
        self.staged.len()
    }
}

impl Handler for HookHandle<'_> {
    fn next(&mut self, request: ServerRequest, response: Response) -> Result<Response> {
        self.staged.push(request);
        Ok(response)
    }

    fn handle(&mut self, request: ServerRequest) -> Result<Response> {
        self.staged.push(request);
        Ok(self.response.clone())
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

#[cfg(test)]
mod tests {
    use super::*;
    use relay_message::{HttpRequest, Method, Params, Status, Uri};

    fn request(path: &str) -> ServerRequest {
        ServerRequest::new(Method::Get, Uri::parse(path).unwrap(), Params::new())
    }

    #[test]
    fn test_next_stages_instead_of_dispatching() {
        let mut queue = VecDeque::new();
        let mut handle = HookHandle::new(&mut queue, false, Response::default());

        let res = handle
            .next(request("/a"), Response::new(Status::Accepted))
            .unwrap();
        assert_eq!(res.status(), Status::Accepted);
        handle.handle(request("/b")).unwrap();
        assert_eq!(handle.staged(), 2);

        let staged = handle.take_staged().unwrap();
        assert_eq!(staged.uri().path(), "/b");
        assert!(handle.take_staged().is_none());
    }

    #[test]
    fn test_handle_edits_queue() {
        let mut queue = VecDeque::new();
        let mut handle = HookHandle::new(&mut queue, true, Response::default());
        handle.append(vec![Entry::callable(|_, res, _| Ok(res))]);
        handle.prepend(vec![
            Entry::callable(|_, res, _| Ok(res)),
            Entry::callable(|_, res, _| Ok(res)),
        ]);
        assert_eq!(handle.len(), 4);
        drop(handle);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_error_context() {
        let mut ctx = ErrorContext::new(Error::Middleware("boom".into()));
        assert!(!ctx.is_handled());
        ctx.set_handled(true);
        assert!(ctx.is_handled());
        assert!(matches!(ctx.into_error(), Error::Middleware(_)));
    }
}
