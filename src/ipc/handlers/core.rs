use serde_json::json;
use std::path::PathBuf;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ping" => Some(ok(
            &req.id,
            json!({ "ok": true, "version": env!("CARGO_PKG_VERSION") }),
        )),
        "workspace.open" => Some(open_workspace(state, req)),
        _ => None,
    }
}

fn open_workspace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = req.params.get("path").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing path", None);
    };
    let workspace = PathBuf::from(path);

    // Replacing an open workspace drops the previous connection (and its
    // in-memory undo log) first.
    state.store = None;
    match Store::open(&workspace) {
        Ok(store) => {
            state.store = Some(store);
            state.workspace = Some(workspace);
            ok(&req.id, json!({ "ok": true, "dbFile": crate::db::DB_FILE }))
        }
        Err(e) => err(&req.id, "db_failed", e.to_string(), None),
    }
}
