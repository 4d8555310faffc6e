use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::request::{Method, Request};
use crate::response::{IntoResponse, Response};

type BoxedHandler<S> = Box<dyn Fn(&mut S, &Request) -> Response + Send + Sync>;

/// Exact-match routing table over `(method, path)`.
///
/// Handlers run synchronously with exclusive access to the shared state
/// `S`, one request at a time.
pub struct Router<S> {
    routes: HashMap<String, Vec<(Method, BoxedHandler<S>)>>,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<S> Router<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration for the same method and
    /// path replaces the earlier one.
    pub fn route<F, R>(mut self, method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        let boxed: BoxedHandler<S> = Box::new(move |state, req| handler(state, req).into_response());
        let entries = self.routes.entry(path.into()).or_default();
        entries.retain(|(m, _)| *m != method);
        entries.push((method, boxed));
        self
    }

    pub fn get<F, R>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Method::Get, path, handler)
    }

    pub fn post<F, R>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Method::Post, path, handler)
    }

    pub fn contains(&self, method: &Method, path: &str) -> bool {
        self.routes
            .get(path)
            .is_some_and(|entries| entries.iter().any(|(m, _)| m == method))
    }

    /// Number of registered `(method, path)` pairs.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the matching handler. Unknown routes get a 404; a panicking
    /// handler gets a 500 and leaves the router usable.
    pub fn dispatch(&self, state: &mut S, request: &Request) -> Response {
        let handler = self.routes.get(&request.path).and_then(|entries| {
            entries
                .iter()
                .find(|(m, _)| *m == request.method)
                .map(|(_, h)| h)
        });
        let Some(handler) = handler else {
            return Response::not_found();
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(state, request))) {
            Ok(response) => response,
            Err(payload) => {
                error!(
                    method = %request.method,
                    path = %request.path,
                    panic = panic_message(payload.as_ref()),
                    "handler panicked"
                );
                Response::internal_error()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
