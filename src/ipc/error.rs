use serde_json::json;

use crate::store::StoreError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Map the store taxonomy onto wire error codes.
pub fn store_err(id: &str, e: &StoreError) -> serde_json::Value {
    let code = match e {
        StoreError::NotFound(_) => "not_found",
        StoreError::Constraint(_) => "constraint_violation",
        StoreError::Validation(_) => "validation",
        StoreError::Storage(_) => "db_failed",
    };
    err(id, code, e.to_string(), None)
}
