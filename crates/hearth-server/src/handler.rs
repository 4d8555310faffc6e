//! Route handlers. Each runs with exclusive access to the [`AppContext`].

use std::path::Path;

use hearth_http::url::unquote;
use hearth_http::{Request, Response, StatusCode};
use hearth_store::{record_id, PageRequest, Record, ID_FIELD};
use serde_json::{json, Map, Value};

use crate::context::AppContext;
use crate::error::{HandlerError, HandlerResult};

const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 10;

pub fn health(ctx: &mut AppContext, _req: &Request) -> HandlerResult {
    let hb = ctx.heartbeat();
    Ok(Response::json(&json!({
        "status": "ok",
        "uptime_secs": hb.uptime().as_secs(),
        "requests": hb.served(),
        "failures": hb.failed(),
    })))
}

pub fn info(ctx: &mut AppContext, _req: &Request) -> HandlerResult {
    let names: Vec<&str> = ctx.collections().map(|c| c.name()).collect();
    Ok(Response::json(&json!({
        "name": "hearth",
        "version": env!("CARGO_PKG_VERSION"),
        "collections": names,
    })))
}

fn numeric_arg(req: &Request, name: &str, default: usize) -> Result<usize, HandlerError> {
    match req.arg(name).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| HandlerError::bad_request(format!("invalid {name}: {raw:?}"))),
    }
}

fn json_object(req: &Request) -> Result<Map<String, Value>, HandlerError> {
    match req.json() {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(HandlerError::bad_request("expected a JSON object")),
        Err(_) => Err(HandlerError::bad_request("invalid JSON body")),
    }
}

fn lookup<'a>(
    ctx: &'a mut AppContext,
    name: &str,
) -> Result<(&'a hearth_store::Collection, &'a mut hearth_cache::Cache), HandlerError> {
    ctx.collection_and_cache(name)
        .ok_or_else(|| HandlerError::not_found(format!("unknown collection {name:?}")))
}

/// `GET /api/<c>?page=&limit=&q=`, newest first.
pub fn list(ctx: &mut AppContext, req: &Request, name: &str) -> HandlerResult {
    let page = numeric_arg(req, "page", DEFAULT_PAGE)?;
    let limit = numeric_arg(req, "limit", DEFAULT_LIMIT)?;
    let mut request = PageRequest::new(page, limit).with_reverse(true);
    if let Some(q) = req.arg("q") {
        request = request.with_search(unquote(q));
    }

    let (collection, _) = lookup(ctx, name)?;
    let result = collection.fetch_page(&request)?;
    Ok(Response::json(&json!({
        "items": result.records,
        "total": result.total,
        "page": page,
        "limit": limit,
    })))
}

/// `GET /api/<c>/get?id=`
pub fn get(ctx: &mut AppContext, req: &Request, name: &str) -> HandlerResult {
    let id = req
        .arg("id")
        .and_then(|raw| raw.parse::<u64>().ok())
        .ok_or_else(|| HandlerError::bad_request("missing or invalid id"))?;
    let (collection, _) = lookup(ctx, name)?;
    match collection.get_by_id(id)? {
        Some(record) => Ok(Response::json(&Value::Object(record))),
        None => Err(HandlerError::not_found("record not found")),
    }
}

/// `POST /api/<c>`: assign the next id and append.
pub fn create(ctx: &mut AppContext, req: &Request, name: &str) -> HandlerResult {
    let mut fields = json_object(req)?;
    fields.shift_remove(ID_FIELD);

    let (collection, cache) = lookup(ctx, name)?;
    let id = collection.get_max_id(cache)? + 1;
    let mut record = Record::new();
    record.insert(ID_FIELD.to_string(), Value::from(id));
    record.extend(fields);
    collection.append(cache, &record)?;

    Ok(Response::json(&Value::Object(record)).with_status(StatusCode::CREATED))
}

fn target_id(body: &Map<String, Value>) -> Result<u64, HandlerError> {
    record_id(body).ok_or_else(|| HandlerError::bad_request("missing or invalid id"))
}

/// `POST /api/<c>/update` with `{"id": k, ...fields}`.
pub fn update(ctx: &mut AppContext, req: &Request, name: &str) -> HandlerResult {
    let mut fields = json_object(req)?;
    let id = target_id(&fields)?;
    fields.shift_remove(ID_FIELD);

    let (collection, _) = lookup(ctx, name)?;
    let found = collection.update(id, |record| {
        for (key, value) in &fields {
            record.insert(key.clone(), value.clone());
        }
    })?;
    if !found {
        return Err(HandlerError::not_found("record not found"));
    }
    Ok(Response::json(&json!({ "success": true, "id": id })))
}

/// `POST /api/<c>/delete` with `{"id": k}`.
pub fn delete(ctx: &mut AppContext, req: &Request, name: &str) -> HandlerResult {
    let id = target_id(&json_object(req)?)?;
    let (collection, cache) = lookup(ctx, name)?;
    if !collection.delete(cache, id)? {
        return Err(HandlerError::not_found("record not found"));
    }
    Ok(Response::json(&json!({ "success": true, "id": id })))
}

/// `GET /api/system/stats`: record count per collection.
pub fn system_stats(ctx: &mut AppContext, _req: &Request) -> HandlerResult {
    let counts = ctx.record_counts()?;
    Ok(Response::json(&json!({ "collections": counts })))
}

/// `GET /api/system/cache`
pub fn cache_stats(ctx: &mut AppContext, _req: &Request) -> HandlerResult {
    Response::to_json(&ctx.cache.stats()).map_err(|e| HandlerError::Internal(e.to_string()))
}

/// `POST /api/system/cache/flush`: empty every non-constant slot.
pub fn cache_flush(ctx: &mut AppContext, _req: &Request) -> HandlerResult {
    ctx.cache.flush_all();
    Ok(Response::json(&json!({ "success": true })))
}

pub fn get_settings(ctx: &mut AppContext, _req: &Request) -> HandlerResult {
    let settings = ctx.settings()?;
    Ok(Response::json(&Value::Object(settings)))
}

/// `POST /api/settings`: merge the posted fields into the stored settings.
pub fn post_settings(ctx: &mut AppContext, req: &Request) -> HandlerResult {
    let changes = json_object(req)?;
    let settings = ctx.update_settings(changes)?;
    Ok(Response::json(&Value::Object(settings)))
}

pub fn static_file(path: &Path) -> HandlerResult {
    Ok(Response::file(path))
}
