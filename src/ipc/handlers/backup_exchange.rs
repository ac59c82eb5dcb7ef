use serde_json::json;
use std::path::PathBuf;

use super::str_param;
use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(export_bundle(state, req)),
        "backup.import" => Some(import_bundle(state, req)),
        _ => None,
    }
}

fn export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match str_param(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "open a workspace first", None);
    };
    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => err(&req.id, "db_failed", e.to_string(), None),
    }
}

fn import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match str_param(req, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "open a workspace first", None);
    };

    // The open connection must go before the database file is replaced.
    // The in-memory undo log goes with it; imported history is not undoable.
    state.store = None;
    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => {
            // Try to come back up on the old database before reporting.
            state.store = Store::open(&workspace).ok();
            return err(&req.id, "db_failed", e.to_string(), None);
        }
    };
    match Store::open(&workspace) {
        Ok(store) => {
            state.store = Some(store);
            ok(
                &req.id,
                json!({ "bundleFormatDetected": summary.bundle_format_detected }),
            )
        }
        Err(e) => err(&req.id, "db_failed", e.to_string(), None),
    }
}
