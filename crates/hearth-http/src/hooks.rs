use async_trait::async_trait;

use crate::request::Request;
use crate::status::StatusCode;

/// Observer around every dispatched request.
///
/// `before` runs once the request is fully read, `after` once the handler
/// has produced a response and before it is written.
#[async_trait]
pub trait DispatchHook: Send + Sync {
    async fn before(&self, request: &Request);
    async fn after(&self, request: &Request, status: StatusCode);
}

pub struct NoOpHook;

#[async_trait]
impl DispatchHook for NoOpHook {
    async fn before(&self, _request: &Request) {}

    async fn after(&self, _request: &Request, _status: StatusCode) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    #[tokio::test]
    async fn noop_hook_is_silent() {
        let hook = NoOpHook;
        let req = Request::new(Method::Get, "/health");
        hook.before(&req).await;
        hook.after(&req, StatusCode::OK).await;
    }
}
