use std::fs;
use std::io;

use hearth_http::{Request, Router};
use tracing::debug;

use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::error::{HandlerResult, ServerResult};
use crate::handler;

type CollectionHandler = fn(&mut AppContext, &Request, &str) -> HandlerResult;

fn for_collection(
    name: &str,
    handler: CollectionHandler,
) -> impl Fn(&mut AppContext, &Request) -> HandlerResult + Send + Sync + 'static {
    let name = name.to_string();
    move |ctx: &mut AppContext, req: &Request| handler(ctx, req, &name)
}

/// Build the routing table: fixed endpoints, five routes per configured
/// collection, and one route per file found in `static_dir`.
pub fn build_router(config: &ServerConfig) -> ServerResult<Router<AppContext>> {
    let mut router = Router::new()
        .get("/health", handler::health)
        .get("/info", handler::info)
        .get("/api/system/stats", handler::system_stats)
        .get("/api/system/cache", handler::cache_stats)
        .post("/api/system/cache/flush", handler::cache_flush)
        .get("/api/settings", handler::get_settings)
        .post("/api/settings", handler::post_settings);

    for name in &config.collections {
        let base = format!("/api/{name}");
        router = router
            .get(base.clone(), for_collection(name, handler::list))
            .post(base.clone(), for_collection(name, handler::create))
            .get(format!("{base}/get"), for_collection(name, handler::get))
            .post(format!("{base}/update"), for_collection(name, handler::update))
            .post(format!("{base}/delete"), for_collection(name, handler::delete));
    }

    let index = config.static_dir.join("index.html");
    router = router.get("/", move |_: &mut AppContext, _: &Request| handler::static_file(&index));

    match fs::read_dir(&config.static_dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let Some(file_name) = entry.file_name().to_str().map(String::from) else {
                    continue;
                };
                let path = entry.path();
                router = router.get(format!("/static/{file_name}"), move |_: &mut AppContext, _: &Request| {
                    handler::static_file(&path)
                });
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %config.static_dir.display(), "no static directory");
        }
        Err(e) => return Err(e.into()),
    }

    debug!(routes = router.len(), "router built");
    Ok(router)
}
