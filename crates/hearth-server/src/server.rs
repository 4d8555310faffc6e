use std::future::Future;

use hearth_http::{HttpServer, Router};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::error::ServerResult;
use crate::router::build_router;

/// Hearth record server.
pub struct HearthServer {
    config: ServerConfig,
}

impl HearthServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> ServerResult<Router<AppContext>> {
        build_router(&self.config)
    }

    /// Open the data directory and assemble the HTTP server around it.
    pub fn prepare(&self) -> ServerResult<(HttpServer<AppContext>, AppContext)> {
        let ctx = AppContext::open(&self.config)?;
        let http = HttpServer::new(self.router()?, self.config.serve_options())
            .with_hook(ctx.heartbeat().clone());
        Ok((http, ctx))
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future) -> ServerResult<()> {
        let (http, mut ctx) = self.prepare()?;
        tracing::info!(
            addr = %listener.local_addr()?,
            data_dir = %self.config.data_dir.display(),
            "hearth server listening"
        );
        http.serve(listener, &mut ctx, shutdown).await?;
        Ok(())
    }
}
