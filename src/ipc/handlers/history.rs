use serde_json::json;

use super::require_store;
use crate::ipc::error::{ok, store_err};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "undo.last" => Some(undo_last(state, req)),
        "undo.status" => Some(undo_status(state, req)),
        _ => None,
    }
}

fn undo_last(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let description = store.describe_last();
    match store.undo_last() {
        Ok(undone) => ok(
            &req.id,
            json!({
                "undone": undone,
                "description": if undone { description } else { None },
            }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn undo_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "canUndo": store.can_undo(),
            "description": store.describe_last(),
        }),
    )
}
