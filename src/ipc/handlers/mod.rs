pub mod analytics;
pub mod backup_exchange;
pub mod core;
pub mod grading;
pub mod history;
pub mod roster;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::Store;

/// Every data method needs an open workspace first.
pub(crate) fn require_store<'a>(
    state: &'a mut AppState,
    id: &str,
) -> Result<&'a mut Store, serde_json::Value> {
    match state.store.as_mut() {
        Some(store) => Ok(store),
        None => Err(err(id, "no_workspace", "open a workspace first", None)),
    }
}

pub(crate) fn str_param(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) => Ok(v.to_string()),
        None => Err(err(
            &req.id,
            "bad_params",
            format!("missing {}", key),
            None,
        )),
    }
}

pub(crate) fn opt_str_param(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
